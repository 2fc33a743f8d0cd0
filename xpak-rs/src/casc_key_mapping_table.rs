//! CASC key mapping tables (`.idx` files), which map encoding keys to the
//! data file, offset and size of the stored entry.
//!
//! Each table declares the byte widths of its record fields in its header;
//! records are decoded with those widths rather than fixed offsets.

use crate::encoding_key::{EncodingKey, MAX_ENCODING_KEY_SIZE};
use crate::error::XpakError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Represents the header of a CASC key mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascKeyMappingTable {
    pub version: u16,
    pub bucket_index: u8,
    pub extra_byte: u8,
    /// The length in bytes of the encoded size field.
    pub encoded_size_length: u8,
    /// The length in bytes of the packed archive index and offset field.
    pub storage_offset_length: u8,
    /// The length in bytes of the stored encoding key prefix.
    pub encoding_key_length: u8,
    /// The number of low bits of the packed field holding the offset.
    pub file_offset_bits: u8,
    /// The total data size the table's segment may address.
    pub segment_size: u64,
}

/// Represents a single entry in a CASC key mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascKeyMappingTableEntry {
    pub encoding_key: EncodingKey,
    /// The offset of the entry within its data file.
    pub offset: u64,
    /// The size of the entry, span header included.
    pub size: u32,
    /// The number of the `data.NNN` file holding the entry.
    pub archive_index: u32,
}

impl CascKeyMappingTable {
    /// Parses the table at `file_name`, inserting its records into `entries`.
    pub(crate) fn load<P: AsRef<Path>>(
        file_name: P,
        entries: &mut HashMap<EncodingKey, CascKeyMappingTableEntry>,
    ) -> Result<Self, XpakError> {
        let mut file = BufReader::new(File::open(file_name)?);
        Self::read(&mut file, entries)
    }

    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        entries: &mut HashMap<EncodingKey, CascKeyMappingTableEntry>,
    ) -> Result<Self, XpakError> {
        let _header_size = reader.read_u32::<LittleEndian>()?;
        let _header_hash = reader.read_u32::<LittleEndian>()?;

        let table = CascKeyMappingTable {
            version: reader.read_u16::<LittleEndian>()?,
            bucket_index: reader.read_u8()?,
            extra_byte: reader.read_u8()?,
            encoded_size_length: reader.read_u8()?,
            storage_offset_length: reader.read_u8()?,
            encoding_key_length: reader.read_u8()?,
            file_offset_bits: reader.read_u8()?,
            segment_size: reader.read_u64::<LittleEndian>()?,
        };
        table.validate()?;

        // Align to next 0x10 boundary after adding 0x17
        let pos = reader.stream_position()?;
        reader.seek(SeekFrom::Start((pos + 0x17) & !0xF))?;

        let data_size = reader.read_u32::<LittleEndian>()? as usize;
        let _data_hash = reader.read_u32::<LittleEndian>()?;

        let entry_size = table.entry_size();
        let mut entry_buffer = vec![0u8; entry_size];
        for _ in 0..data_size / entry_size {
            reader.read_exact(&mut entry_buffer)?;
            let entry = table.parse_entry(&entry_buffer);
            entries.insert(entry.encoding_key, entry);
        }

        Ok(table)
    }

    fn validate(&self) -> Result<(), XpakError> {
        let widths_valid = (1..=MAX_ENCODING_KEY_SIZE as u8).contains(&self.encoding_key_length)
            && (1..=8).contains(&self.storage_offset_length)
            && (1..=4).contains(&self.encoded_size_length)
            && (self.file_offset_bits as u32) < (self.storage_offset_length as u32) * 8;
        if widths_valid {
            Ok(())
        } else {
            Err(XpakError::CorruptContainer(format!(
                "Invalid Data Sizes in Key Mapping Table: key {}, offset {}, size {}, offset bits {}",
                self.encoding_key_length,
                self.storage_offset_length,
                self.encoded_size_length,
                self.file_offset_bits
            )))
        }
    }

    pub fn entry_size(&self) -> usize {
        (self.encoded_size_length + self.storage_offset_length + self.encoding_key_length) as usize
    }

    fn parse_entry(&self, buffer: &[u8]) -> CascKeyMappingTableEntry {
        let key_end = self.encoding_key_length as usize;
        let offset_end = key_end + self.storage_offset_length as usize;

        let packed_offset_and_index = buffer[key_end..offset_end]
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
        let size = buffer[offset_end..self.entry_size()]
            .iter()
            .rev()
            .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
        let file_offset_mask = (1u64 << self.file_offset_bits) - 1;

        CascKeyMappingTableEntry {
            encoding_key: EncodingKey::from_slice(&buffer[..key_end]),
            offset: packed_offset_and_index & file_offset_mask,
            size,
            archive_index: (packed_offset_and_index >> self.file_offset_bits) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds an index with the given widths holding one record.
    fn idx_bytes(
        key: &[u8],
        offset_len: u8,
        size_len: u8,
        offset_bits: u8,
        record_tail: &[u8],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, size_len, offset_len, key.len() as u8, offset_bits]);
        bytes.extend_from_slice(&0x4000_0000u64.to_le_bytes());
        bytes.resize(32, 0);
        let record_len = key.len() + record_tail.len();
        bytes.extend_from_slice(&(record_len as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(record_tail);
        bytes
    }

    #[test]
    fn decodes_standard_widths() {
        let key = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        // archive 3, offset 0x1234 with 30 offset bits; size 0x56 little-endian
        let packed: u64 = (3 << 30) | 0x1234;
        let mut tail = packed.to_be_bytes()[3..].to_vec();
        tail.extend_from_slice(&0x56u32.to_le_bytes());

        let mut entries = HashMap::new();
        let table = CascKeyMappingTable::read(&mut Cursor::new(idx_bytes(&key, 5, 4, 30, &tail)), &mut entries)
            .unwrap();
        assert_eq!(table.entry_size(), 18);

        let entry = entries[&EncodingKey::from_slice(&key)];
        assert_eq!(entry.archive_index, 3);
        assert_eq!(entry.offset, 0x1234);
        assert_eq!(entry.size, 0x56);
    }

    #[test]
    fn decodes_declared_non_standard_widths() {
        let key = [0xAA; 7];
        // 4-byte packed field with 24 offset bits, 3-byte size
        let tail = [0x02, 0x00, 0x10, 0x00, 0x30, 0x20, 0x10];

        let mut entries = HashMap::new();
        CascKeyMappingTable::read(&mut Cursor::new(idx_bytes(&key, 4, 3, 24, &tail)), &mut entries)
            .unwrap();
        let entry = entries[&EncodingKey::from_slice(&key)];
        assert_eq!(entry.archive_index, 2);
        assert_eq!(entry.offset, 0x1000);
        assert_eq!(entry.size, 0x102030);
    }

    #[test]
    fn rejects_impossible_widths() {
        let bytes = idx_bytes(&[1; 9], 0, 4, 30, &[]);
        let err = CascKeyMappingTable::read(&mut Cursor::new(bytes), &mut HashMap::new()).unwrap_err();
        assert!(matches!(err, XpakError::CorruptContainer(_)));
    }
}
