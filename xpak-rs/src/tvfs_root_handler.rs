use crate::encoding_key::{EncodingKey, MAX_ENCODING_KEY_SIZE};
use crate::entry::Entry;
use crate::error::XpakError;
use crate::ext::io_ext::{ReadExt, SeekExt};
use crate::path_table_node_flags::PathTableNodeFlags;
use crate::span_info::SpanInfo;
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// `TVFS` read as a big-endian `u32`.
pub const TVFS_SIGNATURE: u32 = 0x5456_4653;

const MAX_FOLDER_DEPTH: usize = 256;

/// Represents the header of a TVFS root structure in a CASC archive.
///
/// This header contains metadata about the TVFS tables and their locations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TVFSHeader {
    pub signature: u32,
    pub format_version: u8,
    pub header_size: u8,
    pub encoding_key_size: u8,
    pub patch_key_size: u8,
    pub flags: i32,
    pub path_table_offset: u32,
    pub path_table_size: u32,
    pub vfs_table_offset: u32,
    pub vfs_table_size: u32,
    pub cft_table_offset: u32,
    pub cft_table_size: u32,
    pub max_depth: u16,
}

impl TVFSHeader {
    pub const SIZE: usize = 38;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        let header = Self {
            signature: reader.read_u32::<BigEndian>()?,
            format_version: reader.read_u8()?,
            header_size: reader.read_u8()?,
            encoding_key_size: reader.read_u8()?,
            patch_key_size: reader.read_u8()?,
            flags: reader.read_i32::<BigEndian>()?,
            path_table_offset: reader.read_u32::<BigEndian>()?,
            path_table_size: reader.read_u32::<BigEndian>()?,
            vfs_table_offset: reader.read_u32::<BigEndian>()?,
            vfs_table_size: reader.read_u32::<BigEndian>()?,
            cft_table_offset: reader.read_u32::<BigEndian>()?,
            cft_table_size: reader.read_u32::<BigEndian>()?,
            max_depth: reader.read_u16::<BigEndian>()?,
        };

        if header.signature != TVFS_SIGNATURE {
            return Err(XpakError::InvalidData(format!(
                "Invalid VFS header {:#X}",
                header.signature
            )));
        }
        if header.format_version != 1 {
            return Err(XpakError::InvalidData(format!(
                "Unsupported TVFS version {}",
                header.format_version
            )));
        }
        if !(1..=MAX_ENCODING_KEY_SIZE as u8).contains(&header.encoding_key_size) {
            return Err(XpakError::InvalidData(format!(
                "Invalid TVFS encoding key size {}",
                header.encoding_key_size
            )));
        }
        Ok(header)
    }

    /// The on-disk width of a content file table offset.
    pub fn cft_offset_width(&self) -> usize {
        match self.cft_table_size {
            size if size > 0xFF_FFFF => 4,
            size if size > 0xFFFF => 3,
            size if size > 0xFF => 2,
            _ => 1,
        }
    }
}

/// Represents a node in the TVFS path table.
///
/// Each node may represent a directory or file path component.
#[derive(Debug, Default, Clone)]
pub struct PathTableNode {
    pub name: String,
    pub flags: PathTableNodeFlags,
    pub value: Option<u32>,
}

/// Decodes the TVFS root of a CASC storage into a map from path to spans.
///
/// Paths use `/` between components. Lookups also accept `\` and ignore
/// leading separators.
#[derive(Debug, Default)]
pub struct TVFSRootHandler {
    pub header: TVFSHeader,
    pub file_entries: HashMap<String, Entry>,
}

struct TableReader<'a> {
    header: &'a TVFSHeader,
    path_table: Cursor<&'a [u8]>,
    vfs_table: &'a [u8],
    cft_table: &'a [u8],
    file_entries: HashMap<String, Entry>,
}

impl TVFSRootHandler {
    pub fn parse(data: &[u8]) -> Result<Self, XpakError> {
        let header = TVFSHeader::read(&mut Cursor::new(data))?;

        let path_table = table(data, header.path_table_offset, header.path_table_size, "path")?;
        let vfs_table = table(data, header.vfs_table_offset, header.vfs_table_size, "VFS")?;
        let cft_table = table(data, header.cft_table_offset, header.cft_table_size, "CFT")?;

        let mut reader = TableReader {
            header: &header,
            path_table: Cursor::new(path_table),
            vfs_table,
            cft_table,
            file_entries: HashMap::new(),
        };
        reader.parse(path_table.len() as u64, String::with_capacity(255), 0)?;
        let file_entries = reader.file_entries;

        Ok(TVFSRootHandler {
            header,
            file_entries,
        })
    }

    /// Finds a file by path.
    pub fn lookup(&self, path: &str) -> Option<&Entry> {
        self.file_entries.get(&normalize_path(path))
    }

    pub fn cft_offset_width(&self) -> usize {
        self.header.cft_offset_width()
    }
}

/// Converts `\` separators to `/` and strips leading separators.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

fn table<'a>(data: &'a [u8], offset: u32, size: u32, name: &str) -> Result<&'a [u8], XpakError> {
    let start = offset as usize;
    data.get(start..start + size as usize).ok_or_else(|| {
        XpakError::CorruptContainer(format!(
            "TVFS {name} table at {offset:#x} ({size} bytes) lies outside the {} byte root",
            data.len()
        ))
    })
}

impl TableReader<'_> {
    fn parse_path_node(&mut self) -> Result<PathTableNode, XpakError> {
        let mut entry = PathTableNode::default();

        let mut buf = self.path_table.peek_byte()?;

        if buf == 0 {
            entry.flags |= PathTableNodeFlags::PATH_SEPARATOR_PRE;
            self.path_table.skip(1u8)?;
            buf = self.path_table.peek_byte()?;
        }

        if buf < 0x7F && buf != 0xFF {
            self.path_table.skip(1u8)?;
            entry.name = self.path_table.read_string(buf as usize)?;
            buf = self.path_table.peek_byte()?;
        }

        if buf == 0 {
            entry.flags |= PathTableNodeFlags::PATH_SEPARATOR_POST;
            self.path_table.skip(1u8)?;
            buf = self.path_table.peek_byte()?;
        }

        if buf == 0xFF {
            self.path_table.skip(1u8)?;
            entry.value = Some(self.path_table.read_u32::<BigEndian>()?);
            entry.flags |= PathTableNodeFlags::IS_NODE_VALUE;
        } else {
            entry.flags |= PathTableNodeFlags::PATH_SEPARATOR_POST;
        }

        Ok(entry)
    }

    fn add_entry(&mut self, name: String, vfs_info_pos: u32) -> Result<(), XpakError> {
        let mut vfs = Cursor::new(self.vfs_table);
        vfs.set_position(vfs_info_pos as u64);

        let cft_width = self.header.cft_offset_width();
        let key_size = self.header.encoding_key_size as usize;
        let span_count = vfs.read_u8()?;
        let mut spans = Vec::with_capacity(span_count as usize);
        for _ in 0..span_count {
            let ref_offset = vfs.read_u32::<BigEndian>()?;
            let span_size = vfs.read_u32::<BigEndian>()?;
            let cft_offset = vfs.read_uint_be(cft_width)? as u32;

            let start = cft_offset as usize;
            let key = self.cft_table.get(start..start + key_size).ok_or_else(|| {
                XpakError::CorruptContainer(format!(
                    "CFT offset {cft_offset:#x} of {name} is outside the table"
                ))
            })?;
            spans.push(SpanInfo {
                ref_offset,
                span_size,
                cft_offset,
                encoding_key: EncodingKey::from_slice(key),
            });
        }

        self.file_entries
            .insert(name.clone(), Entry::new_with_spans(name, spans));
        Ok(())
    }

    fn parse(&mut self, end: u64, mut builder: String, depth: usize) -> Result<(), XpakError> {
        if depth > MAX_FOLDER_DEPTH {
            return Err(XpakError::CorruptContainer(
                "TVFS path table nests too deeply".into(),
            ));
        }
        let current_size = builder.len();

        while self.path_table.position() < end {
            let node_start = self.path_table.position();
            let entry = self.parse_path_node()?;
            if self.path_table.position() == node_start {
                return Err(XpakError::CorruptContainer(format!(
                    "Unreadable TVFS path node at {node_start:#x}"
                )));
            }

            // Build name with flags
            if entry.flags.contains(PathTableNodeFlags::PATH_SEPARATOR_PRE) {
                builder.push('/');
            }
            builder.push_str(&entry.name);
            if entry.flags.contains(PathTableNodeFlags::PATH_SEPARATOR_POST) {
                builder.push('/');
            }

            if let Some(value) = entry.value {
                if value & 0x8000_0000 != 0 {
                    let folder_size = (value & 0x7FFF_FFFF) as u64;
                    let folder_start = self.path_table.position();
                    let folder_end = (folder_start + folder_size)
                        .checked_sub(4)
                        .filter(|folder_end| *folder_end <= end)
                        .ok_or_else(|| {
                            XpakError::CorruptContainer(format!(
                                "TVFS folder at {folder_start:#x} overruns its parent"
                            ))
                        })?;
                    self.parse(folder_end, builder.clone(), depth + 1)?;
                } else {
                    self.add_entry(normalize_path(&builder), value)?;
                }
                // Reset builder to original
                builder.truncate(current_size);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serialises a TVFS root from its three tables.
    pub(crate) fn tvfs_bytes(path_table: &[u8], vfs_table: &[u8], cft_table: &[u8], key_size: u8) -> Vec<u8> {
        let path_offset = TVFSHeader::SIZE as u32;
        let vfs_offset = path_offset + path_table.len() as u32;
        let cft_offset = vfs_offset + vfs_table.len() as u32;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TVFS_SIGNATURE.to_be_bytes());
        bytes.extend_from_slice(&[1, TVFSHeader::SIZE as u8, key_size, key_size]);
        bytes.extend_from_slice(&0i32.to_be_bytes());
        for field in [
            path_offset,
            path_table.len() as u32,
            vfs_offset,
            vfs_table.len() as u32,
            cft_offset,
            cft_table.len() as u32,
        ] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(path_table);
        bytes.extend_from_slice(vfs_table);
        bytes.extend_from_slice(cft_table);
        bytes
    }

    fn named(bytes: &mut Vec<u8>, pre_separator: bool, name: &str, value: u32) {
        if pre_separator {
            bytes.push(0);
        }
        bytes.push(name.len() as u8);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0xFF);
        bytes.extend_from_slice(&value.to_be_bytes());
    }

    #[test]
    fn resolves_file_two_folders_deep() {
        // root/ holds dir/ (10 bytes) which holds file (11 bytes)
        let mut path_table = Vec::new();
        named(&mut path_table, false, "root", 0x8000_0000 | (4 + 10 + 11));
        named(&mut path_table, true, "dir", 0x8000_0000 | (4 + 11));
        named(&mut path_table, true, "file", 0);

        let key = [0x5A; 9];
        let mut cft_table = vec![0u8; 0x120];
        cft_table[0x110..0x119].copy_from_slice(&key);

        let mut vfs_table = vec![1];
        vfs_table.extend_from_slice(&0u32.to_be_bytes());
        vfs_table.extend_from_slice(&0x400u32.to_be_bytes());
        vfs_table.extend_from_slice(&0x110u16.to_be_bytes());

        let root = TVFSRootHandler::parse(&tvfs_bytes(&path_table, &vfs_table, &cft_table, 9)).unwrap();
        assert_eq!(root.cft_offset_width(), 2);
        assert_eq!(root.file_entries.len(), 1);

        let entry = root.lookup("root/dir/file").unwrap();
        assert_eq!(entry.name, "root/dir/file");
        assert_eq!(
            entry.spans,
            vec![SpanInfo {
                ref_offset: 0,
                span_size: 0x400,
                cft_offset: 0x110,
                encoding_key: EncodingKey::from_slice(&key),
            }]
        );
        assert!(root.lookup(r"\root\dir\file").is_some());
        assert!(root.lookup("root/dir").is_none());
    }

    #[test]
    fn offset_width_follows_table_size() {
        let mut header = TVFSHeader::read(&mut Cursor::new(tvfs_bytes(&[], &[], &[], 9))).unwrap();
        for (size, width) in [(0xFF, 1), (0x100, 2), (0x1_0000, 3), (0x100_0000, 4)] {
            header.cft_table_size = size;
            assert_eq!(header.cft_offset_width(), width);
        }
    }

    #[test]
    fn rejects_bad_signature_and_version() {
        let mut bytes = tvfs_bytes(&[], &[], &[], 9);
        bytes[4] = 2;
        assert!(TVFSRootHandler::parse(&bytes).is_err());
        bytes[4] = 1;
        bytes[0] = b'X';
        assert!(TVFSRootHandler::parse(&bytes).is_err());
    }
}
