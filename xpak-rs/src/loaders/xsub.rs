use super::{check_object_range, read_table, stream_len, ArchiveIndexLoader, Backing, ParsedArchive, KAPI_MAGIC};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::ext::io_ext::SeekExt;
use crate::package_cache_object::PackageCacheObject;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

const HASH_ENTRY_SIZE: u64 = 16;
const RESERVED_SIZE: u64 = 1896;

/// Container type whose objects live in a `<path>data` companion file.
pub const TYPE_COMPANION_DATA: u64 = 1;
/// Container type whose objects live in the package itself.
pub const TYPE_INLINE_DATA: u64 = 3;

/// The 2024-byte header shared by `.xsub` packages and VG `.xpak` packages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XsubHeader {
    pub magic: u32,
    pub unk1: u16,
    pub version: u16,
    pub unk: u64,
    pub container_type: u64,
    pub size: u64,
    pub file_count: i64,
    pub data_offset: i64,
    pub data_size: i64,
    pub hash_count: i64,
    pub hash_offset: i64,
    pub hash_size: i64,
    pub unk3: i64,
    pub unk_offset: i64,
    pub unk4: i64,
    pub index_count: i64,
    pub index_offset: i64,
    pub index_size: i64,
}

impl XsubHeader {
    pub const SIZE: u64 = 2024;

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, XpakError> {
        reader.seek(SeekFrom::Start(0))?;
        let magic = reader.read_u32::<LittleEndian>()?;
        let unk1 = reader.read_u16::<LittleEndian>()?;
        let version = reader.read_u16::<LittleEndian>()?;
        let unk = reader.read_u64::<LittleEndian>()?;
        let container_type = reader.read_u64::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        reader.skip(RESERVED_SIZE)?;

        let mut tail = [0i64; 12];
        reader.read_i64_into::<LittleEndian>(&mut tail)?;
        let [file_count, data_offset, data_size, hash_count, hash_offset, hash_size, unk3, unk_offset, unk4, index_count, index_offset, index_size] = tail;

        Ok(Self {
            magic,
            unk1,
            version,
            unk,
            container_type,
            size,
            file_count,
            data_offset,
            data_size,
            hash_count,
            hash_offset,
            hash_size,
            unk3,
            unk_offset,
            unk4,
            index_count,
            index_offset,
            index_size,
        })
    }
}

/// Loads `.xsub` packages and, with `vg_xpak` set, VG `.xpak` packages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XsubLoader {
    pub vg_xpak: bool,
}

impl XsubLoader {
    /// Returns the file holding the objects, or `None` for metadata-only
    /// containers.
    fn data_path(&self, path: &str, container_type: u64) -> Option<String> {
        match (self.vg_xpak, container_type) {
            (_, TYPE_COMPANION_DATA) => Some(format!("{path}data")),
            (false, TYPE_INLINE_DATA) => Some(path.to_string()),
            _ => None,
        }
    }
}

impl ArchiveIndexLoader for XsubLoader {
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError> {
        let file_len = stream_len(reader)?;
        let header = XsubHeader::read(reader)?;

        if header.magic != KAPI_MAGIC {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: invalid XSUB magic {:#010x}",
                header.magic
            )));
        }

        let Some(data_path) = self.data_path(path, header.container_type) else {
            debug!(path, container_type = header.container_type, "skipping metadata-only package");
            return Ok(ParsedArchive::metadata_only());
        };

        let (Ok(hash_offset), Ok(hash_count)) =
            (u64::try_from(header.hash_offset), u64::try_from(header.hash_count))
        else {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: negative hash table bounds"
            )));
        };
        if hash_offset >= file_len {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: hash table offset {hash_offset:#x} is past the end of the file"
            )));
        }

        // Companion data files are range checked once the cache opens them.
        let inline = data_path == path;
        let table = read_table(reader, hash_offset, hash_count, HASH_ENTRY_SIZE, file_len)?;
        let mut hashes = Cursor::new(table);
        let mut entries = Vec::with_capacity(hash_count as usize);
        for _ in 0..hash_count {
            let key = ContentKey(hashes.read_u64::<LittleEndian>()?);
            let packed = hashes.read_u64::<LittleEndian>()?;
            let offset = (packed >> 32) << 7;
            let size = (packed >> 1) & 0x3FFF_FFFF;
            if inline {
                check_object_range(path, key, offset, size, file_len)?;
            }
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

        debug!(path, data_path = %data_path, objects = entries.len(), "parsed XSUB index");
        Ok(ParsedArchive {
            entries,
            backing: Backing::File(data_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xsub_bytes(container_type: u64, entries: &[(u64, u64)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&KAPI_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&container_type.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.resize(bytes.len() + RESERVED_SIZE as usize, 0);
        let tail = [0, 0, 0, entries.len() as i64, XsubHeader::SIZE as i64, 0, 0, 0, 0, 0, 0, 0];
        for field in tail {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        assert_eq!(bytes.len() as u64, XsubHeader::SIZE);
        for (key, packed) in entries {
            bytes.extend_from_slice(&key.to_le_bytes());
            bytes.extend_from_slice(&packed.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn unpacks_offset_and_size() {
        let packed = (3u64 << 32) | (0x1234 << 1) | 1;
        let mut bytes = xsub_bytes(TYPE_INLINE_DATA, &[(0x77, packed)]);
        bytes.resize((3 << 7) + 0x1234, 0);
        let parsed = XsubLoader::default()
            .load(&mut Cursor::new(bytes), "a.xsub")
            .unwrap();
        assert_eq!(parsed.backing, Backing::File("a.xsub".into()));
        assert_eq!(parsed.entries[0].0, ContentKey(0x77));
        assert_eq!(parsed.entries[0].1.offset, 3 << 7);
        assert_eq!(parsed.entries[0].1.compressed_size, 0x1234);
    }

    #[test]
    fn container_type_selects_data_file() {
        let bytes = xsub_bytes(TYPE_COMPANION_DATA, &[(1, 2)]);
        let parsed = XsubLoader::default()
            .load(&mut Cursor::new(bytes.clone()), "a.xsub")
            .unwrap();
        assert_eq!(parsed.backing, Backing::File("a.xsubdata".into()));

        let vg = XsubLoader { vg_xpak: true };
        let parsed = vg.load(&mut Cursor::new(bytes), "b.xpak").unwrap();
        assert_eq!(parsed.backing, Backing::File("b.xpakdata".into()));

        let inline = xsub_bytes(TYPE_INLINE_DATA, &[(1, 2)]);
        let parsed = vg.load(&mut Cursor::new(inline), "b.xpak").unwrap();
        assert_eq!(parsed, ParsedArchive::metadata_only());
    }

    #[test]
    fn inline_object_past_end_of_file_is_corrupt() {
        let packed = (0x100u64 << 32) | (0x100 << 1);
        let bytes = xsub_bytes(TYPE_INLINE_DATA, &[(0x77, packed)]);
        let err = XsubLoader::default()
            .load(&mut Cursor::new(bytes.clone()), "a.xsub")
            .unwrap_err();
        assert!(matches!(err, XpakError::CorruptContainer(_)));

        let mut padded = bytes;
        padded.resize(0x8100, 0);
        assert!(XsubLoader::default().load(&mut Cursor::new(padded), "a.xsub").is_ok());
    }
}
