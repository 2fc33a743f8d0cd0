use super::{check_object_range, read_table, stream_len, ArchiveIndexLoader, Backing, ParsedArchive, KAPI_MAGIC};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::package_cache_object::PackageCacheObject;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek};
use tracing::debug;

const SEGMENT_ENTRIES: u32 = 1;
const SEGMENT_DATA: u32 = 2;
const ENTRY_SIZE: u64 = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IpakHeader {
    pub magic: u32,
    pub version: u32,
    pub size: u32,
    pub segment_count: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IpakSegment {
    pub segment_type: u32,
    pub offset: u32,
    pub size: u32,
    pub entry_count: u32,
}

impl IpakSegment {
    fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        Ok(Self {
            segment_type: reader.read_u32::<LittleEndian>()?,
            offset: reader.read_u32::<LittleEndian>()?,
            size: reader.read_u32::<LittleEndian>()?,
            entry_count: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Loads `.ipak` packages.
///
/// Entry offsets are relative to the data segment, so each object stores the
/// data segment's base offset in its `uncompressed_size` field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IpakLoader;

impl ArchiveIndexLoader for IpakLoader {
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError> {
        let file_len = stream_len(reader)?;
        let header = IpakHeader {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            size: reader.read_u32::<LittleEndian>()?,
            segment_count: reader.read_u32::<LittleEndian>()?,
        };
        if header.magic != KAPI_MAGIC {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: invalid IPAK magic {:#010x}",
                header.magic
            )));
        }

        let mut entries_segment = None;
        let mut data_segment = IpakSegment::default();
        for _ in 0..header.segment_count {
            let segment = IpakSegment::read(reader)?;
            match segment.segment_type {
                SEGMENT_ENTRIES => entries_segment = Some(segment),
                SEGMENT_DATA => data_segment = segment,
                _ => {}
            }
        }

        let mut entries = Vec::new();
        if let Some(segment) = entries_segment {
            let table = read_table(
                reader,
                segment.offset as u64,
                segment.entry_count as u64,
                ENTRY_SIZE,
                file_len,
            )?;
            let mut records = Cursor::new(table);
            entries.reserve(segment.entry_count as usize);
            for _ in 0..segment.entry_count {
                let key = ContentKey(records.read_u64::<LittleEndian>()?);
                let offset = records.read_u32::<LittleEndian>()?;
                let size = records.read_u32::<LittleEndian>()?;
                let start = data_segment.offset as u64 + offset as u64;
                check_object_range(path, key, start, size as u64, file_len)?;
                entries.push((
                    key,
                    PackageCacheObject {
                        offset: offset as u64,
                        compressed_size: size as u64,
                        uncompressed_size: data_segment.offset as u64,
                        archive_index: 0,
                    },
                ));
            }
        } else {
            debug!(path, "IPAK package has no entries segment");
        }

        debug!(path, version = header.version, objects = entries.len(), "parsed IPAK index");
        Ok(ParsedArchive {
            entries,
            backing: Backing::File(path.to_string()),
        })
    }
}
