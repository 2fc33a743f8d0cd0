use super::{check_object_range, read_table, stream_len, ArchiveIndexLoader, Backing, ParsedArchive, KAPI_MAGIC};
use crate::archive_profile::ProfileQuirks;
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::ext::io_ext::SeekExt;
use crate::package_cache_object::PackageCacheObject;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

/// Header version whose layout inserts 288 bytes after the first 24.
pub const EXTENDED_HEADER_VERSION: u16 = 0xD;

const HASH_ENTRY_SIZE: u64 = 24;
const SIZE_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// The header of an `.xpak` package.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XpakHeader {
    pub magic: u32,
    pub unk1: u16,
    pub version: u16,
    pub unk2: u64,
    pub size: u64,
    pub file_count: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub hash_count: u64,
    pub hash_offset: u64,
    pub hash_size: u64,
    pub unk3: u64,
    pub unk_offset: u64,
    pub unk4: u64,
    pub index_count: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

impl XpakHeader {
    /// Size of the header fields, excluding the extended header's gap.
    pub const SIZE: usize = 120;

    /// Reads the header from the start of the stream.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, XpakError> {
        let mut raw = [0u8; Self::SIZE];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut raw[..24])?;

        let version = u16::from_le_bytes([raw[6], raw[7]]);
        if version == EXTENDED_HEADER_VERSION {
            reader.skip(288u64)?;
        }
        reader.read_exact(&mut raw[24..])?;

        let mut fields = Cursor::new(&raw[..]);
        Ok(Self {
            magic: fields.read_u32::<LittleEndian>()?,
            unk1: fields.read_u16::<LittleEndian>()?,
            version: fields.read_u16::<LittleEndian>()?,
            unk2: fields.read_u64::<LittleEndian>()?,
            size: fields.read_u64::<LittleEndian>()?,
            file_count: fields.read_u64::<LittleEndian>()?,
            data_offset: fields.read_u64::<LittleEndian>()?,
            data_size: fields.read_u64::<LittleEndian>()?,
            hash_count: fields.read_u64::<LittleEndian>()?,
            hash_offset: fields.read_u64::<LittleEndian>()?,
            hash_size: fields.read_u64::<LittleEndian>()?,
            unk3: fields.read_u64::<LittleEndian>()?,
            unk_offset: fields.read_u64::<LittleEndian>()?,
            unk4: fields.read_u64::<LittleEndian>()?,
            index_count: fields.read_u64::<LittleEndian>()?,
            index_offset: fields.read_u64::<LittleEndian>()?,
            index_size: fields.read_u64::<LittleEndian>()?,
        })
    }
}

/// Loads `.xpak` packages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XpakLoader {
    pub quirks: ProfileQuirks,
}

impl ArchiveIndexLoader for XpakLoader {
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError> {
        let file_len = stream_len(reader)?;
        let header = XpakHeader::read(reader)?;

        if header.magic != KAPI_MAGIC {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: invalid XPAK magic {:#010x}",
                header.magic
            )));
        }
        if header.hash_offset >= file_len {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: hash table offset {:#x} is past the end of the file",
                header.hash_offset
            )));
        }

        let table = read_table(reader, header.hash_offset, header.hash_count, HASH_ENTRY_SIZE, file_len)?;
        let mut hashes = Cursor::new(table);
        let mut entries = Vec::with_capacity(header.hash_count as usize);
        for _ in 0..header.hash_count {
            let key = ContentKey(hashes.read_u64::<LittleEndian>()?);
            let relative = hashes.read_u64::<LittleEndian>()?;
            let offset = header.data_offset.checked_add(relative).ok_or_else(|| {
                XpakError::CorruptContainer(format!("{path}: object {key} offset {relative:#x} overflows"))
            })?;
            let size = hashes.read_u64::<LittleEndian>()? & SIZE_MASK;
            check_object_range(path, key, offset, size, file_len)?;
            entries.push((
                key,
                PackageCacheObject {
                    offset,
                    compressed_size: size,
                    uncompressed_size: 0,
                    archive_index: 0,
                },
            ));
        }

        if self.quirks.contains(ProfileQuirks::INDEX_PROPERTIES) {
            apply_index_properties(reader, &header, file_len, &mut entries)?;
        }

        debug!(path, version = header.version, objects = entries.len(), "parsed XPAK index");
        Ok(ParsedArchive {
            entries,
            backing: Backing::File(path.to_string()),
        })
    }
}

/// Fills `uncompressed_size` from the `size0` property of each index record.
fn apply_index_properties<R: Read + Seek>(
    reader: &mut R,
    header: &XpakHeader,
    file_len: u64,
    entries: &mut [(ContentKey, PackageCacheObject)],
) -> Result<(), XpakError> {
    let positions: HashMap<ContentKey, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (*key, i))
        .collect();

    reader.seek(SeekFrom::Start(header.index_offset))?;
    for _ in 0..header.index_count {
        let key = ContentKey(reader.read_u64::<LittleEndian>()?);
        let len = reader.read_u64::<LittleEndian>()?;
        let position = reader.stream_position()?;
        if position.checked_add(len).map_or(true, |end| end > file_len) {
            return Err(XpakError::CorruptContainer(format!(
                "Index properties of {key} run past the end of the file"
            )));
        }

        let Some(&index) = positions.get(&key) else {
            reader.skip(len)?;
            continue;
        };

        let mut text = vec![0u8; len as usize];
        reader.read_exact(&mut text)?;
        if let Some(size) = property_size(&String::from_utf8_lossy(&text)) {
            entries[index].1.uncompressed_size = size;
        }
    }
    Ok(())
}

/// Extracts the `size0` value from newline separated `key:value` pairs.
pub(crate) fn property_size(properties: &str) -> Option<u64> {
    properties
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| *name == "size0")
        .and_then(|(_, value)| parse_integer(value.trim()))
}

fn parse_integer(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u16, fields: &[u64; 14]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&KAPI_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&version.to_le_bytes());
        for (i, field) in fields.iter().enumerate() {
            if i == 2 && version == EXTENDED_HEADER_VERSION {
                bytes.extend_from_slice(&[0xEE; 288]);
            }
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn extended_header_skips_inserted_block() {
        let mut fields = [0u64; 14];
        fields[3] = 0x400; // data_offset
        fields[5] = 7; // hash_count
        fields[13] = 0x99; // index_size
        let bytes = header_bytes(EXTENDED_HEADER_VERSION, &fields);
        assert_eq!(bytes.len(), XpakHeader::SIZE + 288);

        let header = XpakHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(header.version, EXTENDED_HEADER_VERSION);
        assert_eq!(header.data_offset, 0x400);
        assert_eq!(header.hash_count, 7);
        assert_eq!(header.index_size, 0x99);
    }

    #[test]
    fn size_property_accepts_hex_and_decimal() {
        assert_eq!(property_size("name:foo\nsize0:1024\n"), Some(1024));
        assert_eq!(property_size("size0:0x400\r\nsize1:3"), Some(0x400));
        assert_eq!(property_size("size1:3"), None);
    }

    #[test]
    fn masks_size_high_byte_and_adds_data_offset() {
        let mut fields = [0u64; 14];
        fields[3] = 0x1000; // data_offset
        fields[5] = 1; // hash_count
        fields[6] = XpakHeader::SIZE as u64; // hash_offset
        let mut bytes = header_bytes(1, &fields);
        bytes.extend_from_slice(&0xABCDu64.to_le_bytes());
        bytes.extend_from_slice(&0x20u64.to_le_bytes());
        bytes.extend_from_slice(&(0x8000_0000_0000_0100u64).to_le_bytes());
        bytes.resize(0x1120, 0);

        let parsed = XpakLoader::default()
            .load(&mut Cursor::new(bytes), "a.xpak")
            .unwrap();
        assert_eq!(parsed.backing, Backing::File("a.xpak".into()));
        assert_eq!(
            parsed.entries,
            vec![(
                ContentKey(0xABCD),
                PackageCacheObject {
                    offset: 0x1020,
                    compressed_size: 0x100,
                    uncompressed_size: 0,
                    archive_index: 0,
                }
            )]
        );
    }

    #[test]
    fn hash_offset_past_end_is_corrupt() {
        let mut fields = [0u64; 14];
        fields[6] = 0x10_0000;
        let bytes = header_bytes(1, &fields);
        let err = XpakLoader::default()
            .load(&mut Cursor::new(bytes), "a.xpak")
            .unwrap_err();
        assert!(matches!(err, XpakError::CorruptContainer(_)));
    }

    #[test]
    fn object_past_end_of_file_is_corrupt() {
        let mut fields = [0u64; 14];
        fields[3] = XpakHeader::SIZE as u64; // data_offset
        fields[5] = 1; // hash_count
        fields[6] = XpakHeader::SIZE as u64; // hash_offset
        let mut bytes = header_bytes(1, &fields);
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&SIZE_MASK.to_le_bytes());

        let err = XpakLoader::default()
            .load(&mut Cursor::new(bytes), "huge.xpak")
            .unwrap_err();
        assert!(matches!(err, XpakError::CorruptContainer(_)));
    }
}
