use crate::archive_profile::ArchiveFormat;
use crate::casc_file::CascFile;
use crate::casc_storage::CascStorage;
use crate::error::XpakError;
use crate::handle_pool::PooledHandle;
use crate::loaders::xptoc::XPTOC_FILE_NAME;
use glob::{glob, Pattern};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the packages of a cache are stored: a plain directory, or the
/// virtual file system of a CASC storage.
#[derive(Debug)]
pub enum ArchiveSource {
    Directory(PathBuf),
    Casc(CascStorage),
}

impl ArchiveSource {
    /// Opens `base` as a CASC storage when it holds a `.build.info`, and as a
    /// plain directory otherwise.
    pub fn open<P: AsRef<Path>>(base: P, max_handles: usize) -> Result<Self, XpakError> {
        let base = base.as_ref();
        if base.join(".build.info").is_file() {
            debug!(path = %base.display(), "package directory is a CASC storage");
            return Ok(ArchiveSource::Casc(CascStorage::open_with_handles(base, max_handles)?));
        }
        if !base.is_dir() {
            return Err(XpakError::FileNotFound(format!(
                "Package directory {} does not exist",
                base.display()
            )));
        }
        Ok(ArchiveSource::Directory(base.to_path_buf()))
    }

    /// The directory the packages live in.
    pub fn path(&self) -> &Path {
        match self {
            ArchiveSource::Directory(path) => path,
            ArchiveSource::Casc(storage) => storage.storage_path(),
        }
    }

    /// Lists the package files of `format`, sorted by name.
    ///
    /// Directory packages are named by their full path, CASC packages by
    /// their TVFS path.
    pub fn list(&self, format: ArchiveFormat) -> Result<Vec<String>, XpakError> {
        let mut names = match self {
            ArchiveSource::Directory(path) if format == ArchiveFormat::Xptoc => {
                let toc = path.join(XPTOC_FILE_NAME);
                if toc.is_file() {
                    vec![toc.to_string_lossy().into_owned()]
                } else {
                    Vec::new()
                }
            }
            ArchiveSource::Directory(path) => {
                let pattern = format!(
                    "{}/*.{}",
                    Pattern::escape(&path.to_string_lossy()),
                    format.extension()
                );
                let mut names = Vec::new();
                for entry in glob(&pattern).map_err(|err| XpakError::InvalidData(format!("{pattern}: {err}")))? {
                    let entry = entry.map_err(|err| XpakError::Io(io::Error::from(err)))?;
                    if entry.is_file() {
                        names.push(entry.to_string_lossy().into_owned());
                    }
                }
                names
            }
            ArchiveSource::Casc(storage) => storage
                .files()
                .iter()
                .filter(|file| file.is_local())
                .map(|file| file.file_name())
                .filter(|name| matches_format(name, format))
                .map(str::to_string)
                .collect(),
        };
        names.sort();
        Ok(names)
    }

    /// Opens a package listed by [`ArchiveSource::list`], or a companion file
    /// named after one.
    pub fn open_reader(&self, name: &str) -> Result<ArchiveReader<'static>, XpakError> {
        match self {
            ArchiveSource::Directory(_) => Ok(ArchiveReader::File(BufReader::new(File::open(name)?))),
            ArchiveSource::Casc(storage) => Ok(ArchiveReader::Virtual(storage.open_file(name)?)),
        }
    }
}

fn matches_format(name: &str, format: ArchiveFormat) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if format == ArchiveFormat::Xptoc {
        return file_name.eq_ignore_ascii_case(XPTOC_FILE_NAME);
    }
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(format.extension()))
}

/// A readable, seekable package, whichever source it comes from.
#[derive(Debug)]
pub enum ArchiveReader<'a> {
    File(BufReader<File>),
    Pooled(PooledHandle<'a>),
    Virtual(CascFile),
}

impl Read for ArchiveReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArchiveReader::File(reader) => reader.read(buf),
            ArchiveReader::Pooled(reader) => reader.read(buf),
            ArchiveReader::Virtual(reader) => reader.read(buf),
        }
    }
}

impl Seek for ArchiveReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ArchiveReader::File(reader) => reader.seek(pos),
            ArchiveReader::Pooled(reader) => reader.seek(pos),
            ArchiveReader::Virtual(reader) => reader.seek(pos),
        }
    }
}
