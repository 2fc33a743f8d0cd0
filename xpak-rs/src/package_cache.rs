//! The package cache: a content-key index over every package of one title,
//! and extraction of the objects it names.

use crate::archive_profile::{ArchiveFormat, ArchiveProfile};
use crate::archive_source::{ArchiveReader, ArchiveSource};
use crate::casc_file::CascFile;
use crate::chunk_stream_reader::read_chunk_stream;
use crate::chunked_object_reader::{object_start, read_object};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::handle_pool::HandlePool;
use crate::loaders::{check_object_range, ArchiveIndexLoader, Backing, IndexLoader, ParsedArchive};
use crate::package_cache_object::PackageCacheObject;
use crate::xsub_object_reader::read_xsub_object;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tunables for loading and reading a [`PackageCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageCacheOptions {
    /// Parse package indexes on the rayon thread pool.
    pub parallel_load: bool,
    /// Upper bound on open handles per package file.
    pub max_handles_per_archive: usize,
}

impl Default for PackageCacheOptions {
    fn default() -> Self {
        Self {
            parallel_load: true,
            max_handles_per_archive: 4,
        }
    }
}

/// An index of every object in a title's packages, keyed by content key.
///
/// The cache is built once by [`PackageCache::load`] and is read-only
/// afterwards; `extract`, `extract_raw` and `exists` take `&self` and may be
/// called from any number of threads.
///
/// ```no_run
/// use xpak_rs::archive_profile::{ArchiveFormat, ArchiveProfile};
/// use xpak_rs::content_key::ContentKey;
/// use xpak_rs::package_cache::PackageCache;
///
/// let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xpak));
/// cache.load("path/to/game").unwrap();
///
/// if let Some((bytes, size)) = cache.extract(ContentKey(0x1234), None).unwrap() {
///     println!("{size} bytes, first {:?}", bytes.first());
/// }
/// ```
#[derive(Debug)]
pub struct PackageCache {
    profile: ArchiveProfile,
    options: PackageCacheOptions,
    source: Option<ArchiveSource>,
    index: HashMap<ContentKey, PackageCacheObject>,
    /// Package paths, indexed by `PackageCacheObject::archive_index`.
    package_file_paths: Vec<String>,
    /// Frame tables of CASC packages, resolved once at load and indexed like
    /// `package_file_paths`. `None` for packages not stored locally.
    casc_files: Vec<Option<CascFile>>,
    packages_path: PathBuf,
    handles: HandlePool,
    loaded: bool,
}

impl PackageCache {
    pub fn new(profile: ArchiveProfile) -> Self {
        Self::with_options(profile, PackageCacheOptions::default())
    }

    pub fn with_options(profile: ArchiveProfile, options: PackageCacheOptions) -> Self {
        Self {
            profile,
            options,
            source: None,
            index: HashMap::new(),
            package_file_paths: Vec::new(),
            casc_files: Vec::new(),
            packages_path: PathBuf::new(),
            handles: HandlePool::new(Vec::new(), options.max_handles_per_archive),
            loaded: false,
        }
    }

    /// Hashes a package-relative asset id into its content key.
    pub fn hash_package_id(value: &str) -> ContentKey {
        ContentKey::from_xxhash(value)
    }

    /// Indexes every package of the cache's format under `base_path`.
    ///
    /// Any previous index is discarded first. Packages that fail to parse, or
    /// that index objects lying outside their data files, are logged and
    /// skipped; only a `base_path` that cannot be opened at all,
    /// such as a CASC storage without its build metadata, is an error. When
    /// two packages hold the same key, the one whose path sorts first wins.
    pub fn load<P: AsRef<Path>>(&mut self, base_path: P) -> Result<(), XpakError> {
        let base_path = base_path.as_ref();
        self.loaded = false;
        self.source = None;
        self.index.clear();
        self.package_file_paths.clear();
        self.casc_files.clear();
        self.handles = HandlePool::new(Vec::new(), self.options.max_handles_per_archive);
        self.packages_path = base_path.to_path_buf();

        let source = ArchiveSource::open(base_path, self.options.max_handles_per_archive)?;
        let names = source.list(self.profile.format)?;
        debug!(path = %base_path.display(), packages = names.len(), format = ?self.profile.format, "loading package cache");

        let loader = IndexLoader::for_profile(&self.profile);
        let parse = |name: &String| -> Result<ParsedArchive, XpakError> {
            let mut reader = source.open_reader(name)?;
            loader.load(&mut reader, name)
        };
        let results: Vec<_> = if self.options.parallel_load {
            names.par_iter().map(parse).collect()
        } else {
            names.iter().map(parse).collect()
        };

        let mut skipped = 0usize;
        let mut duplicates = 0usize;
        for (name, result) in names.iter().zip(results) {
            let resolved = match result.and_then(|parsed| resolve_package(&source, &self.profile, name, parsed)) {
                Ok(Some(resolved)) => resolved,
                Ok(None) => {
                    debug!(package = %name, "package holds no objects");
                    continue;
                }
                Err(err) => {
                    warn!(package = %name, error = %err, "skipping package");
                    skipped += 1;
                    continue;
                }
            };

            let base_index = self.package_file_paths.len() as u32;
            self.package_file_paths.extend(resolved.paths);
            self.casc_files.extend(resolved.files);

            for (key, mut object) in resolved.entries {
                object.archive_index += base_index;
                match self.index.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(object);
                    }
                    Entry::Occupied(_) => {
                        duplicates += 1;
                        debug!(key = %key, package = %name, "duplicate content key, keeping first");
                    }
                }
            }
        }

        if let ArchiveSource::Directory(_) = source {
            let paths = self
                .package_file_paths
                .iter()
                .map(|path| Some(PathBuf::from(path)))
                .collect();
            self.handles = HandlePool::new(paths, self.options.max_handles_per_archive);
        }
        self.source = Some(source);
        self.loaded = true;

        if duplicates > 0 {
            warn!(duplicates, "packages share content keys");
        }
        info!(
            path = %base_path.display(),
            packages = self.package_file_paths.len(),
            objects = self.index.len(),
            skipped,
            duplicates,
            "loaded package cache"
        );
        Ok(())
    }

    /// Extracts and decompresses the object stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is not in the cache, and the bytes with
    /// their length otherwise. `size_hint` overrides the decompressed size
    /// recorded in the index.
    pub fn extract(&self, key: ContentKey, size_hint: Option<u64>) -> Result<Option<(Vec<u8>, u32)>, XpakError> {
        let Some(loc) = self.get(key) else {
            return Ok(None);
        };
        if loc.compressed_size == 0 {
            return Ok(Some((Vec::new(), 0)));
        }

        let mut reader = self.reader(loc.archive_index)?;
        let mut data = match self.profile.format {
            ArchiveFormat::Xpak | ArchiveFormat::Ipak => read_object(&mut reader, loc, size_hint, &self.profile)?,
            ArchiveFormat::Xsub | ArchiveFormat::VgXpak => read_xsub_object(&mut reader, key, loc, &self.profile)?,
            ArchiveFormat::Xptoc => read_chunk_stream(&mut reader, loc.offset)?,
        };
        if let Some(hint) = size_hint {
            data.truncate(hint as usize);
        }

        let size = u32::try_from(data.len())
            .map_err(|_| XpakError::InvalidData(format!("Object {key} is larger than 4 GiB")))?;
        debug!(key = %key, archive = loc.archive_index, size, "extracted object");
        Ok(Some((data, size)))
    }

    /// Returns the stored bytes of the object under `key` without decoding them.
    pub fn extract_raw(&self, key: ContentKey) -> Result<Option<Vec<u8>>, XpakError> {
        let Some(loc) = self.get(key) else {
            return Ok(None);
        };
        let mut reader = self.reader(loc.archive_index)?;
        reader.seek(SeekFrom::Start(object_start(loc, &self.profile)))?;
        let mut data = Vec::new();
        reader.take(loc.compressed_size).read_to_end(&mut data)?;
        if (data.len() as u64) < loc.compressed_size {
            return Err(XpakError::Truncated(format!(
                "Object {key} holds {} of {} stored bytes",
                data.len(),
                loc.compressed_size
            )));
        }
        Ok(Some(data))
    }

    /// Whether `key` is in the index. Performs no I/O.
    pub fn exists(&self, key: ContentKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns the index entry of `key`.
    pub fn get(&self, key: ContentKey) -> Option<&PackageCacheObject> {
        if !self.loaded {
            return None;
        }
        self.index.get(&key)
    }

    /// The directory the cache was loaded from.
    pub fn packages_path(&self) -> &Path {
        &self.packages_path
    }

    /// Package paths, indexed by `PackageCacheObject::archive_index`.
    pub fn package_file_paths(&self) -> &[String] {
        &self.package_file_paths
    }

    pub fn profile(&self) -> &ArchiveProfile {
        &self.profile
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn reader(&self, archive_index: u32) -> Result<ArchiveReader<'_>, XpakError> {
        match &self.source {
            Some(ArchiveSource::Casc(storage)) => {
                if let Some(Some(file)) = self.casc_files.get(archive_index as usize) {
                    return Ok(ArchiveReader::Virtual(file.reopen()));
                }
                let name = self
                    .package_file_paths
                    .get(archive_index as usize)
                    .ok_or_else(|| XpakError::FileNotFound(format!("Archive index {archive_index} is out of range")))?;
                Ok(ArchiveReader::Virtual(storage.open_file(name)?))
            }
            _ => Ok(ArchiveReader::Pooled(self.handles.acquire(archive_index)?)),
        }
    }
}

/// A parsed package whose backing files have been located and checked.
struct ResolvedPackage {
    entries: Vec<(ContentKey, PackageCacheObject)>,
    paths: Vec<String>,
    files: Vec<Option<CascFile>>,
}

/// Opens the backing files of a parsed package and rejects it when an object
/// lies outside the file holding it. Returns `None` for metadata-only
/// packages.
///
/// Backing files that cannot be found are accepted unchecked; extracting
/// from them reports the missing file.
fn resolve_package(
    source: &ArchiveSource,
    profile: &ArchiveProfile,
    name: &str,
    parsed: ParsedArchive,
) -> Result<Option<ResolvedPackage>, XpakError> {
    let paths = match parsed.backing {
        Backing::MetadataOnly => return Ok(None),
        Backing::File(path) => vec![path],
        Backing::Numbered(paths) => paths,
    };

    let mut files = Vec::with_capacity(paths.len());
    let mut lengths = Vec::with_capacity(paths.len());
    for path in &paths {
        let (file, length) = match source {
            ArchiveSource::Directory(_) => (None, fs::metadata(path).ok().map(|meta| meta.len())),
            ArchiveSource::Casc(storage) => match storage.open_file(path) {
                Ok(file) => {
                    let length = file.size();
                    (Some(file), Some(length))
                }
                Err(err) => {
                    debug!(package = %name, path = %path, error = %err, "backing file is not available");
                    (None, None)
                }
            },
        };
        files.push(file);
        lengths.push(length);
    }

    for (key, object) in &parsed.entries {
        let index = object.archive_index as usize;
        let path = paths.get(index).ok_or_else(|| {
            XpakError::CorruptContainer(format!("{name}: object {key} names missing package {index}"))
        })?;
        if let Some(length) = lengths[index] {
            check_object_range(path, *key, object_start(object, profile), object.compressed_size, length)?;
        }
    }

    Ok(Some(ResolvedPackage {
        entries: parsed.entries,
        paths,
        files,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_before_load_find_nothing() {
        let cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xpak));
        assert!(!cache.is_loaded());
        assert!(!cache.exists(ContentKey(1)));
        assert!(cache.extract(ContentKey(1), None).unwrap().is_none());
        assert!(cache.extract_raw(ContentKey(1)).unwrap().is_none());
    }

    #[test]
    fn package_ids_hash_with_xxh64() {
        assert_eq!(
            PackageCache::hash_package_id("abc"),
            ContentKey::from_xxhash("abc")
        );
    }

    #[test]
    fn empty_directory_loads_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Ipak));
        cache.load(dir.path()).unwrap();
        assert!(cache.is_loaded());
        assert!(cache.is_empty());
        assert_eq!(cache.packages_path(), dir.path());
    }

    #[test]
    fn casc_storage_serves_xptoc_packages() {
        use crate::casc_storage::tests::CascFixture;
        use crate::loaders::xptoc::XPTOC_MAGIC;

        let object: Vec<u8> = b"streamed image mip ".repeat(12);
        let mut package = vec![0xAB; 8];
        package.extend_from_slice(&(object.len() as u64).to_le_bytes());
        package.extend_from_slice(&[0; 4]);
        let packed = lz4_flex::block::compress(&object);
        package.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        package.extend_from_slice(&(object.len() as u32).to_le_bytes());
        package.extend_from_slice(&packed);

        let hash = [0x42u8; 16];
        let mut toc = XPTOC_MAGIC.to_le_bytes().to_vec();
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&hash);
        toc.extend_from_slice(&8u64.to_le_bytes());
        toc.extend_from_slice(&(package.len() as u32 - 8).to_le_bytes());
        toc.extend_from_slice(&0u16.to_le_bytes());

        let mut fixture = CascFixture::default();
        fixture.add_raw_file("xpakfile.toc", &toc);
        fixture.add_raw_file("xpakfile0.pak", &package);
        let dir = tempfile::tempdir().unwrap();
        fixture.write(dir.path());

        let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xptoc));
        cache.load(dir.path()).unwrap();
        assert_eq!(cache.package_file_paths(), ["xpakfile0.pak"]);

        let key = ContentKey::from_xxhash(&hex::encode(hash));
        assert!(cache.exists(key));
        let (bytes, size) = cache.extract(key, None).unwrap().unwrap();
        assert_eq!(bytes, object);
        assert_eq!(size as usize, object.len());
        assert_eq!(cache.extract_raw(key).unwrap().unwrap(), package[8..]);
    }

    #[test]
    fn casc_frame_tables_are_read_once_at_load() {
        use crate::casc_storage::tests::CascFixture;
        use crate::loaders::xptoc::XPTOC_MAGIC;

        let object = b"stored object".to_vec();
        let mut package = vec![0xCD; 8];
        package.extend_from_slice(&object);

        let hash = [0x17u8; 16];
        let mut toc = XPTOC_MAGIC.to_le_bytes().to_vec();
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&hash);
        toc.extend_from_slice(&8u64.to_le_bytes());
        toc.extend_from_slice(&(object.len() as u32).to_le_bytes());
        toc.extend_from_slice(&0u16.to_le_bytes());

        let mut fixture = CascFixture::default();
        fixture.add_raw_file("xpakfile.toc", &toc);
        fixture.add_raw_file("xpakfile0.pak", &package);
        let dir = tempfile::tempdir().unwrap();
        fixture.write(dir.path());

        let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xptoc));
        cache.load(dir.path()).unwrap();

        // Break every BLTE signature; reading a frame table now fails.
        let data_path = dir.path().join("Data").join("data").join("data.000");
        let mut data = std::fs::read(&data_path).unwrap();
        for at in 0..data.len().saturating_sub(3) {
            if &data[at..at + 4] == b"BLTE" {
                data[at] = b'X';
            }
        }
        std::fs::write(&data_path, data).unwrap();

        let key = ContentKey::from_xxhash(&hex::encode(hash));
        assert_eq!(cache.extract_raw(key).unwrap().unwrap(), object);
        assert_eq!(cache.extract_raw(key).unwrap().unwrap(), object);
    }

    #[test]
    fn casc_package_with_object_past_its_data_is_skipped() {
        use crate::casc_storage::tests::CascFixture;
        use crate::loaders::xptoc::XPTOC_MAGIC;

        let package = vec![0xCD; 64];
        let mut toc = XPTOC_MAGIC.to_le_bytes().to_vec();
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&1u32.to_le_bytes());
        toc.extend_from_slice(&[0x18u8; 16]);
        toc.extend_from_slice(&8u64.to_le_bytes());
        toc.extend_from_slice(&0x1000u32.to_le_bytes());
        toc.extend_from_slice(&0u16.to_le_bytes());

        let mut fixture = CascFixture::default();
        fixture.add_raw_file("xpakfile.toc", &toc);
        fixture.add_raw_file("xpakfile0.pak", &package);
        let dir = tempfile::tempdir().unwrap();
        fixture.write(dir.path());

        let mut cache = PackageCache::new(ArchiveProfile::new(ArchiveFormat::Xptoc));
        cache.load(dir.path()).unwrap();
        assert!(cache.is_empty());
        assert!(cache.package_file_paths().is_empty());
    }
}
