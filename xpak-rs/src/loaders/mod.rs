//! Index loaders, one per container family.
//!
//! A loader reads only the header and hash tables of a single package and
//! returns the objects it found. Loaders never share state, so packages can
//! be parsed on any number of threads and merged afterwards.

pub mod ipak;
pub mod xpak;
pub mod xptoc;
pub mod xsub;

use crate::archive_profile::{ArchiveFormat, ArchiveProfile};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::package_cache_object::PackageCacheObject;
use std::io::{Read, Seek, SeekFrom};

/// The `KAPI` magic shared by XPAK, XSUB and IPAK headers.
pub const KAPI_MAGIC: u32 = 0x4950_414B;

/// Where the objects of a parsed package are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// Every object lives in this file. The objects' `archive_index` is
    /// assigned when the package is merged into a cache.
    File(String),
    /// Objects live in numbered sibling packages; `archive_index` is the
    /// package number and `paths[n]` the path of package `n`.
    Numbered(Vec<String>),
    /// The package only carries metadata and contributes no objects.
    MetadataOnly,
}

/// The result of loading one package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArchive {
    pub entries: Vec<(ContentKey, PackageCacheObject)>,
    pub backing: Backing,
}

impl ParsedArchive {
    pub fn metadata_only() -> Self {
        Self {
            entries: Vec::new(),
            backing: Backing::MetadataOnly,
        }
    }
}

/// Parses the index of one package file.
pub trait ArchiveIndexLoader {
    /// Reads the package behind `reader`. `path` is the name the package was
    /// opened under and is used to derive companion file names.
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError>;
}

/// Selects the loader for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLoader {
    Xpak(xpak::XpakLoader),
    Xsub(xsub::XsubLoader),
    Ipak(ipak::IpakLoader),
    Xptoc(xptoc::XptocLoader),
}

impl IndexLoader {
    pub fn for_profile(profile: &ArchiveProfile) -> Self {
        match profile.format {
            ArchiveFormat::Xpak => IndexLoader::Xpak(xpak::XpakLoader {
                quirks: profile.quirks,
            }),
            ArchiveFormat::VgXpak => IndexLoader::Xsub(xsub::XsubLoader { vg_xpak: true }),
            ArchiveFormat::Xsub => IndexLoader::Xsub(xsub::XsubLoader { vg_xpak: false }),
            ArchiveFormat::Ipak => IndexLoader::Ipak(ipak::IpakLoader),
            ArchiveFormat::Xptoc => IndexLoader::Xptoc(xptoc::XptocLoader),
        }
    }
}

impl ArchiveIndexLoader for IndexLoader {
    fn load<R: Read + Seek>(&self, reader: &mut R, path: &str) -> Result<ParsedArchive, XpakError> {
        match self {
            IndexLoader::Xpak(loader) => loader.load(reader, path),
            IndexLoader::Xsub(loader) => loader.load(reader, path),
            IndexLoader::Ipak(loader) => loader.load(reader, path),
            IndexLoader::Xptoc(loader) => loader.load(reader, path),
        }
    }
}

/// Rejects an object whose stored bytes `start..start + size` do not lie
/// within a data file of `data_len` bytes.
pub(crate) fn check_object_range(
    path: &str,
    key: ContentKey,
    start: u64,
    size: u64,
    data_len: u64,
) -> Result<(), XpakError> {
    if start.checked_add(size).is_some_and(|end| end <= data_len) {
        return Ok(());
    }
    Err(XpakError::CorruptContainer(format!(
        "{path}: object {key} at {start:#x} with {size} bytes runs past the {data_len} byte data file"
    )))
}

/// Returns the length of the stream, leaving the position at the start.
pub(crate) fn stream_len<R: Seek>(reader: &mut R) -> Result<u64, XpakError> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Reads a table of `count` records of `record_size` bytes at `offset`,
/// rejecting tables that would not fit in a file of `file_len` bytes.
pub(crate) fn read_table<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    count: u64,
    record_size: u64,
    file_len: u64,
) -> Result<Vec<u8>, XpakError> {
    let size = count
        .checked_mul(record_size)
        .filter(|size| offset.checked_add(*size).is_some_and(|end| end <= file_len))
        .ok_or_else(|| {
            XpakError::CorruptContainer(format!(
                "Table of {count} entries at {offset:#x} does not fit in {file_len} bytes"
            ))
        })?;
    reader.seek(SeekFrom::Start(offset))?;
    let mut table = vec![0u8; size as usize];
    reader.read_exact(&mut table)?;
    Ok(table)
}
