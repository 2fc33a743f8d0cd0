use super::{read_table, stream_len, ArchiveIndexLoader, Backing, ParsedArchive};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::package_cache_object::PackageCacheObject;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek};
use tracing::debug;

/// Magic of an `xpakfile.toc` table ("S2ffi300").
pub const XPTOC_MAGIC: u64 = 0x3030_3369_6666_3253;

/// Name of the table file inside a package directory.
pub const XPTOC_FILE_NAME: &str = "xpakfile.toc";

const HEADER_SIZE: u64 = 16;
const ENTRY_SIZE: u64 = 30;

/// Loads an `xpakfile.toc` table.
///
/// The table stores binary hashes; the lookup key of an object is the XXH64
/// of the lowercase hex rendering of its hash.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XptocLoader;

impl ArchiveIndexLoader for XptocLoader {
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError> {
        let file_len = stream_len(reader)?;
        let magic = reader.read_u64::<LittleEndian>()?;
        let version = reader.read_u32::<LittleEndian>()?;
        let count = reader.read_u32::<LittleEndian>()?;
        if magic != XPTOC_MAGIC {
            return Err(XpakError::CorruptContainer(format!(
                "{path}: invalid XPTOC magic {magic:#018x}"
            )));
        }

        let table = read_table(reader, HEADER_SIZE, count as u64, ENTRY_SIZE, file_len)?;
        let mut records = Cursor::new(table);
        let mut entries = Vec::with_capacity(count as usize);
        let mut package_count = 0u32;
        for _ in 0..count {
            let mut hash = [0u8; 16];
            records.read_exact(&mut hash)?;
            let offset = records.read_u64::<LittleEndian>()?;
            let size = records.read_u32::<LittleEndian>()?;
            let package_index = records.read_u16::<LittleEndian>()?;

            package_count = package_count.max(package_index as u32 + 1);
            entries.push((
                ContentKey::from_xxhash(&hex::encode(hash)),
                PackageCacheObject {
                    offset,
                    compressed_size: size as u64,
                    uncompressed_size: size as u64,
                    archive_index: package_index as u32,
                },
            ));
        }

        let packages = (0..package_count)
            .map(|n| sibling_path(path, &format!("xpakfile{n}.pak")))
            .collect();

        debug!(path, version, objects = entries.len(), package_count, "parsed XPTOC table");
        Ok(ParsedArchive {
            entries,
            backing: Backing::Numbered(packages),
        })
    }
}

/// Replaces the file name of `path`, accepting either separator.
fn sibling_path(path: &str, file_name: &str) -> String {
    match path.rfind(|c: char| c == '/' || c == '\\') {
        Some(split) => format!("{}{file_name}", &path[..=split]),
        None => file_name.to_string(),
    }
}
