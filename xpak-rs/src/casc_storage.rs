use crate::{
    block_table::{block_table_entry::BlockTableEntry, block_table_header::BlockTableHeader},
    casc_build_info::CascBuildInfo,
    casc_config::CascConfig,
    casc_file::{decode_frame, CascFile},
    casc_file_frame::CascFileFrame,
    casc_file_info::CascFileInfo,
    casc_file_span::CascFileSpan,
    casc_key_mapping_table::{CascKeyMappingTable, CascKeyMappingTableEntry},
    casc_span_header::CascSpanHeader,
    encoding_key::EncodingKey,
    entry::Entry,
    error::XpakError,
    handle_pool::HandlePool,
    tvfs_root_handler::TVFSRootHandler,
};
use glob::glob;
use std::{
    collections::HashMap,
    fs,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, trace, warn};

/// Default number of open handles kept per `data.NNN` file.
pub const DEFAULT_HANDLES_PER_DATA_FILE: usize = 4;

const BUILD_INFO_FILE_NAME: &str = ".build.info";

/// The stages a storage passes through while opening, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Uninitialized,
    BuildInfoLoaded,
    ConfigLoaded,
    DataFilesLoaded,
    IndexFilesLoaded,
    RootResolved,
    Ready,
}

/// Represents an open CASC storage directory, providing access to files and metadata.
///
/// `CascStorage` is the main entry point for interacting with CASC archives.
/// Opening a storage reads `.build.info`, the build configuration, the key
/// mapping tables (`.idx`) and the TVFS root; a failure at any stage aborts
/// the open. Files are then listed with [`CascStorage::files`] and read with
/// [`CascStorage::open_file`].
///
/// ```no_run
/// use std::io::Read;
/// use xpak_rs::casc_storage::CascStorage;
///
/// let storage = CascStorage::open("path/to/casc/storage").unwrap();
///
/// for file_info in storage.files() {
///     println!("File: {} ({} bytes)", file_info.file_name(), file_info.file_size());
/// }
///
/// let mut file = storage.open_file("some/file/in/storage.txt").unwrap();
/// let mut contents = Vec::new();
/// file.read_to_end(&mut contents).unwrap();
/// ```
///
/// # Thread Safety
///
/// Data files are read through a shared [`HandlePool`]. Every positioned read
/// holds its handle for the whole seek and read, so one storage can serve
/// any number of [`CascFile`]s on different threads.
#[derive(Debug)]
pub struct CascStorage {
    stage: LoadStage,
    /// Key mapping table entries, keyed by truncated encoding key.
    entries: HashMap<EncodingKey, CascKeyMappingTableEntry>,
    /// The headers of all loaded key mapping tables.
    key_mapping_tables: Vec<CascKeyMappingTable>,
    /// The length of the keys in `entries`.
    key_length: usize,
    root_handler: TVFSRootHandler,
    build_info: CascBuildInfo,
    config: CascConfig,
    storage_path: PathBuf,
    data_files: Arc<HandlePool>,
    files: Vec<CascFileInfo>,
}

impl CascStorage {
    /// Opens the storage at `folder`.
    pub fn open<P: AsRef<Path>>(folder: P) -> Result<Self, XpakError> {
        Self::open_with_handles(folder, DEFAULT_HANDLES_PER_DATA_FILE)
    }

    /// Opens the storage at `folder`, keeping at most `max_handles` open
    /// handles per data file.
    pub fn open_with_handles<P: AsRef<Path>>(folder: P, max_handles: usize) -> Result<Self, XpakError> {
        let storage_path = folder.as_ref().to_path_buf();
        let data_path = storage_path.join("Data").join("data");
        let mut stage = LoadStage::Uninitialized;
        debug!(path = %storage_path.display(), "opening CASC storage");

        let build_info = Self::load_build_info(&storage_path)?;
        advance(&mut stage, LoadStage::BuildInfoLoaded);

        let config = Self::load_config_info(&build_info, &storage_path)?;
        advance(&mut stage, LoadStage::ConfigLoaded);

        let data_files = Arc::new(Self::load_data_files(&data_path, max_handles)?);
        advance(&mut stage, LoadStage::DataFilesLoaded);

        let (key_mapping_tables, entries) = Self::load_index_files(&data_path)?;
        let key_length = key_mapping_tables
            .first()
            .map_or(9, |table| table.encoding_key_length as usize);
        if key_mapping_tables
            .iter()
            .any(|table| table.encoding_key_length as usize != key_length)
        {
            return Err(XpakError::CorruptContainer(
                "Key mapping tables declare different key lengths".into(),
            ));
        }
        advance(&mut stage, LoadStage::IndexFilesLoaded);

        let mut storage = CascStorage {
            stage,
            entries,
            key_mapping_tables,
            key_length,
            root_handler: TVFSRootHandler::default(),
            build_info,
            config,
            storage_path,
            data_files,
            files: Vec::new(),
        };

        storage.root_handler = storage.load_root_handler()?;
        advance(&mut storage.stage, LoadStage::RootResolved);

        storage.files = storage.load_files();
        advance(&mut storage.stage, LoadStage::Ready);

        info!(
            path = %storage.storage_path.display(),
            files = storage.files.len(),
            index_entries = storage.entries.len(),
            data_files = storage.data_files.len(),
            "opened CASC storage"
        );
        Ok(storage)
    }

    /// The last load stage the storage completed.
    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn build_info(&self) -> &CascBuildInfo {
        &self.build_info
    }

    pub fn config(&self) -> &CascConfig {
        &self.config
    }

    pub fn key_mapping_tables(&self) -> &[CascKeyMappingTable] {
        &self.key_mapping_tables
    }

    /// Every file named by the TVFS root, sorted by name.
    pub fn files(&self) -> &[CascFileInfo] {
        &self.files
    }

    /// Whether `name` is listed in the TVFS root.
    pub fn file_exists(&self, name: &str) -> bool {
        self.root_handler.lookup(name).is_some()
    }

    /// Returns the path of data file `index`, if present.
    pub fn data_file_path(&self, index: u32) -> Option<&Path> {
        self.data_files.path(index)
    }

    fn load_build_info(storage_path: &Path) -> Result<CascBuildInfo, XpakError> {
        let direct = storage_path.join(BUILD_INFO_FILE_NAME);
        let path = if direct.is_file() {
            Some(direct)
        } else {
            find_file(storage_path, BUILD_INFO_FILE_NAME)
        };

        if path.is_none() {
            warn!(path = %storage_path.display(), "storage has no build info");
        }
        let path = path.ok_or_else(|| {
            XpakError::MissingMetadata(format!(
                "Failed to locate Build Info in {}",
                storage_path.display()
            ))
        })?;
        let mut build_info = CascBuildInfo::new();
        build_info.load(&path).map_err(|err| match err {
            missing @ XpakError::MissingMetadata(_) => missing,
            other => XpakError::MissingMetadata(format!("{}: {other}", path.display())),
        })?;
        Ok(build_info)
    }

    fn load_config_info(build_info: &CascBuildInfo, storage_path: &Path) -> Result<CascConfig, XpakError> {
        let build_key = build_info
            .get("Build Key")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| XpakError::MissingMetadata("Build Key not in build info".into()))?;

        let direct = match (build_key.get(0..2), build_key.get(2..4)) {
            (Some(first), Some(second)) => Some(
                storage_path
                    .join("Data")
                    .join("config")
                    .join(first)
                    .join(second)
                    .join(build_key),
            ),
            _ => None,
        };
        let path = match direct {
            Some(path) if path.is_file() => Some(path),
            _ => find_file(storage_path, build_key),
        };

        let path = path.ok_or_else(|| {
            XpakError::MissingMetadata(format!("Failed to locate Config Info {build_key}"))
        })?;
        let mut config = CascConfig::new();
        config
            .load(&path)
            .map_err(|err| XpakError::MissingMetadata(format!("{}: {err}", path.display())))?;
        Ok(config)
    }

    fn load_data_files(data_path: &Path, max_handles: usize) -> Result<HandlePool, XpakError> {
        let pattern = data_path.join("data.*");
        let pattern = pattern.to_string_lossy();
        let mut indexed_files: Vec<(usize, PathBuf)> = Vec::new();

        let paths = glob(&pattern).map_err(|err| XpakError::InvalidData(format!("{pattern}: {err}")))?;
        for entry in paths {
            let path = entry.map_err(|err| XpakError::Io(io::Error::from(err)))?;
            if let Some(index) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| ext.parse::<usize>().ok())
            {
                indexed_files.push((index, path));
            }
        }

        let slot_count = indexed_files.iter().map(|(index, _)| index + 1).max().unwrap_or(0);
        let mut data_file_paths: Vec<Option<PathBuf>> = vec![None; slot_count];
        for (index, path) in indexed_files {
            data_file_paths[index] = Some(path);
        }
        let missing = data_file_paths.iter().filter(|path| path.is_none()).count();
        if missing > 0 {
            debug!(missing, "storage has gaps in its data file numbering");
        }

        Ok(HandlePool::new(data_file_paths, max_handles))
    }

    #[allow(clippy::type_complexity)]
    fn load_index_files(
        data_path: &Path,
    ) -> Result<(Vec<CascKeyMappingTable>, HashMap<EncodingKey, CascKeyMappingTableEntry>), XpakError> {
        let mut idx_files = fs::read_dir(data_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "idx"))
            .collect::<Vec<_>>();
        idx_files.sort();

        let mut entries = HashMap::new();
        let mut key_mapping_tables = Vec::with_capacity(idx_files.len());
        for idx_file in idx_files {
            let table = CascKeyMappingTable::load(&idx_file, &mut entries)?;
            trace!(path = %idx_file.display(), bucket = table.bucket_index, "loaded key mapping table");
            key_mapping_tables.push(table);
        }
        Ok((key_mapping_tables, entries))
    }

    fn load_root_handler(&self) -> Result<TVFSRootHandler, XpakError> {
        let root_key = self.config.vfs_root()?;
        let entry = self.index_entry(&root_key).ok_or_else(|| {
            XpakError::FileNotFound(format!("TVFS root {root_key} is not in the key mapping tables"))
        })?;

        let mut root = Vec::new();
        self.open_entry(&entry)?.read_to_end(&mut root)?;
        TVFSRootHandler::parse(&root)
    }

    fn load_files(&self) -> Vec<CascFileInfo> {
        let mut files: Vec<CascFileInfo> = self
            .root_handler
            .file_entries
            .values()
            .map(|entry| {
                let sizes = entry
                    .spans
                    .iter()
                    .map(|span| self.index_entry(&span.encoding_key).map(|e| e.size as u64))
                    .collect::<Option<Vec<_>>>();
                CascFileInfo {
                    file_name: entry.name.clone(),
                    file_size: sizes.as_ref().map_or(0, |sizes| sizes.iter().sum()),
                    is_local: sizes.is_some(),
                }
            })
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        files
    }

    fn index_entry(&self, key: &EncodingKey) -> Option<CascKeyMappingTableEntry> {
        self.entries.get(&key.truncated(self.key_length)).copied()
    }

    /// Opens a file from the CASC storage by name, returning a new, independent reader.
    ///
    /// Each call returns a fresh `CascFile` with its own position and cache.
    pub fn open_file(&self, name: &str) -> Result<CascFile, XpakError> {
        let entry = self
            .root_handler
            .lookup(name)
            .ok_or_else(|| XpakError::FileNotFound(format!("Entry not found: {name}")))?;
        self.open_tvfs_entry(entry)
    }

    fn open_tvfs_entry(&self, entry: &Entry) -> Result<CascFile, XpakError> {
        let mut spans = Vec::with_capacity(entry.spans.len());
        let mut virtual_offset = 0u64;
        for span in &entry.spans {
            let index_entry = self.index_entry(&span.encoding_key).ok_or_else(|| {
                XpakError::FileNotFound(format!(
                    "{}: span {} is not stored locally",
                    entry.name, span.encoding_key
                ))
            })?;
            let span = self.read_span(&index_entry, virtual_offset)?;
            virtual_offset = span.virtual_end_offset;
            spans.push(span);
        }
        Ok(CascFile::new(spans, Arc::clone(&self.data_files)))
    }

    /// Opens the data stored under a key mapping table entry.
    pub fn open_entry(&self, entry: &CascKeyMappingTableEntry) -> Result<CascFile, XpakError> {
        let span = self.read_span(entry, 0)?;
        Ok(CascFile::new(vec![span], Arc::clone(&self.data_files)))
    }

    /// Reads the span header and BLTE frame table of an entry.
    fn read_span(&self, entry: &CascKeyMappingTableEntry, virtual_start: u64) -> Result<CascFileSpan, XpakError> {
        let entry_end = entry.offset + entry.size as u64;
        let mut handle = self.data_files.acquire(entry.archive_index)?;
        handle.seek(SeekFrom::Start(entry.offset))?;

        let span_header = CascSpanHeader::read(&mut handle)?;
        let header = BlockTableHeader::read(&mut handle)?;
        trace!(key = %entry.encoding_key, size = span_header.size, flags = span_header.flags, "reading BLTE span");

        let mut frames = Vec::with_capacity(header.frame_count as usize);
        let mut virtual_offset = virtual_start;
        let data_start = entry.offset + CascSpanHeader::SIZE;

        if header.header_size == 0 {
            // A single frame covering the rest of the entry, sized by decoding it.
            let archive_offset = data_start + BlockTableHeader::PREFIX_SIZE;
            let encoded_size = entry_end.checked_sub(archive_offset).ok_or_else(|| {
                XpakError::CorruptContainer(format!("Entry {} is smaller than its headers", entry.encoding_key))
            })?;
            let mut encoded = vec![0u8; encoded_size as usize];
            handle.read_exact(&mut encoded)?;
            let content_size = decode_frame(&encoded, None)?.len() as u64;
            frames.push(CascFileFrame {
                virtual_start_offset: virtual_offset,
                virtual_end_offset: virtual_offset + content_size,
                archive_offset,
                encoded_size: encoded_size as u32,
                content_size: content_size as u32,
            });
            virtual_offset += content_size;
        } else {
            let mut archive_offset = data_start + header.header_size as u64;
            for _ in 0..header.frame_count {
                let frame = BlockTableEntry::read(&mut handle)?;
                frames.push(CascFileFrame {
                    virtual_start_offset: virtual_offset,
                    virtual_end_offset: virtual_offset + frame.content_size as u64,
                    archive_offset,
                    encoded_size: frame.encoded_size,
                    content_size: frame.content_size,
                });
                archive_offset += frame.encoded_size as u64;
                virtual_offset += frame.content_size as u64;
            }
            if archive_offset > entry_end {
                return Err(XpakError::CorruptContainer(format!(
                    "Frames of {} run {} bytes past the entry",
                    entry.encoding_key,
                    archive_offset - entry_end
                )));
            }
        }

        Ok(CascFileSpan {
            archive_index: entry.archive_index,
            virtual_start_offset: virtual_start,
            virtual_end_offset: virtual_offset,
            archive_offset: frames.first().map_or(data_start, |frame| frame.archive_offset),
            frames,
        })
    }
}

fn advance(stage: &mut LoadStage, next: LoadStage) {
    debug!(stage = ?next, "CASC load stage complete");
    *stage = next;
}

/// Searches `dir` recursively for a file named `file_name`.
fn find_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
    for entry in fs::read_dir(dir).ok()?.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_file() && path.file_name() == Some(file_name.as_ref()) {
            return Some(path);
        } else if path.is_dir() {
            if let Some(found) = find_file(&path, file_name) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tvfs_root_handler::tests::tvfs_bytes;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    const KEY_LENGTH: usize = 9;
    const BUILD_KEY: &str = "abcd0123456789abcdef0123456789ab";

    pub(crate) fn raw_frame(data: &[u8]) -> (Vec<u8>, u32) {
        let mut frame = vec![b'N'];
        frame.extend_from_slice(data);
        (frame, data.len() as u32)
    }

    pub(crate) fn zlib_frame(data: &[u8]) -> (Vec<u8>, u32) {
        let mut encoder = ZlibEncoder::new(vec![b'Z'], Compression::default());
        encoder.write_all(data).unwrap();
        (encoder.finish().unwrap(), data.len() as u32)
    }

    /// Builds a CASC storage on disk: two data files, one key mapping table,
    /// a TVFS root and the build metadata pointing at it.
    #[derive(Default)]
    pub(crate) struct CascFixture {
        data: [Vec<u8>; 2],
        index: Vec<([u8; KEY_LENGTH], u32, u64, u32)>,
        files: Vec<(String, Vec<([u8; KEY_LENGTH], u32)>)>,
        next_key: u8,
    }

    impl CascFixture {
        fn key(&mut self) -> [u8; KEY_LENGTH] {
            self.next_key += 1;
            [self.next_key; KEY_LENGTH]
        }

        /// Stores a BLTE entry with a frame table in `data_file`.
        pub(crate) fn add_entry(&mut self, data_file: usize, frames: &[(Vec<u8>, u32)]) -> ([u8; KEY_LENGTH], u32) {
            let mut blte = b"BLTE".to_vec();
            blte.extend_from_slice(&(12 + 24 * frames.len() as u32).to_be_bytes());
            blte.push(0x0F);
            blte.extend_from_slice(&(frames.len() as u32).to_be_bytes()[1..]);
            for (encoded, content_size) in frames {
                blte.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
                blte.extend_from_slice(&content_size.to_be_bytes());
                blte.extend_from_slice(&[0; 16]);
            }
            for (encoded, _) in frames {
                blte.extend_from_slice(encoded);
            }
            let key = self.key();
            self.store(key, data_file, blte);
            (key, frames.iter().map(|(_, size)| size).sum())
        }

        /// Stores a BLTE entry without a frame table.
        fn add_single_frame_entry(&mut self, data_file: usize, frame: Vec<u8>) -> [u8; KEY_LENGTH] {
            let mut blte = b"BLTE".to_vec();
            blte.extend_from_slice(&0u32.to_be_bytes());
            blte.extend_from_slice(&frame);
            let key = self.key();
            self.store(key, data_file, blte);
            key
        }

        fn store(&mut self, key: [u8; KEY_LENGTH], data_file: usize, blte: Vec<u8>) {
            let data = &mut self.data[data_file];
            let offset = data.len() as u64;
            let size = 30 + blte.len() as u32;
            let mut stored_key = [0u8; 16];
            stored_key[..KEY_LENGTH].copy_from_slice(&key);
            stored_key.reverse();
            data.extend_from_slice(&stored_key);
            data.extend_from_slice(&size.to_le_bytes());
            data.extend_from_slice(&[0; 10]);
            data.extend_from_slice(&blte);
            self.index.push((key, data_file as u32, offset, size));
        }

        /// A key with no stored data.
        pub(crate) fn absent_key(&mut self) -> ([u8; KEY_LENGTH], u32) {
            (self.key(), 0x10)
        }

        pub(crate) fn add_file(&mut self, name: &str, spans: Vec<([u8; KEY_LENGTH], u32)>) {
            self.files.push((name.to_string(), spans));
        }

        /// Adds a file of one raw frame in `data.000`.
        pub(crate) fn add_raw_file(&mut self, name: &str, data: &[u8]) {
            let span = self.add_entry(0, &[raw_frame(data)]);
            self.add_file(name, vec![span]);
        }

        fn root(&self) -> Vec<u8> {
            let cft_table: Vec<u8> = self
                .files
                .iter()
                .flat_map(|(_, spans)| spans.iter().flat_map(|(key, _)| key.to_vec()))
                .collect();
            let width = match cft_table.len() {
                len if len > 0xFF_FFFF => 4,
                len if len > 0xFFFF => 3,
                len if len > 0xFF => 2,
                _ => 1,
            };

            let mut path_table = Vec::new();
            let mut vfs_table = Vec::new();
            let mut cft_offset = 0u32;
            for (position, (name, spans)) in self.files.iter().enumerate() {
                let components: Vec<&str> = name.split('/').collect();
                path_table.extend(path_node(&components, position > 0, vfs_table.len() as u32));

                vfs_table.push(spans.len() as u8);
                let mut ref_offset = 0u32;
                for (_, span_size) in spans {
                    vfs_table.extend_from_slice(&ref_offset.to_be_bytes());
                    vfs_table.extend_from_slice(&span_size.to_be_bytes());
                    vfs_table.extend_from_slice(&cft_offset.to_be_bytes()[4 - width..]);
                    ref_offset += span_size;
                    cft_offset += KEY_LENGTH as u32;
                }
            }
            tvfs_bytes(&path_table, &vfs_table, &cft_table, KEY_LENGTH as u8)
        }

        fn index_file(&self) -> Vec<u8> {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&16u32.to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&7u16.to_le_bytes());
            bytes.extend_from_slice(&[0, 0, 4, 5, KEY_LENGTH as u8, 30]);
            bytes.extend_from_slice(&0x4000_0000u64.to_le_bytes());
            bytes.resize(32, 0);
            bytes.extend_from_slice(&((self.index.len() * 18) as u32).to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            for (key, data_file, offset, size) in &self.index {
                let packed = ((*data_file as u64) << 30) | offset;
                bytes.extend_from_slice(key);
                bytes.extend_from_slice(&packed.to_be_bytes()[3..]);
                bytes.extend_from_slice(&size.to_le_bytes());
            }
            bytes
        }

        /// Writes the storage into `dir`.
        pub(crate) fn write(mut self, dir: &Path) {
            let root = self.root();
            let root_key = self.add_single_frame_entry(0, raw_frame(&root).0);

            let data_dir = dir.join("Data").join("data");
            let config_dir = dir.join("Data").join("config").join("ab").join("cd");
            fs::create_dir_all(&data_dir).unwrap();
            fs::create_dir_all(&config_dir).unwrap();

            fs::write(
                dir.join(".build.info"),
                format!("Branch!STRING:0|Build Key!HEX:16\nus|{BUILD_KEY}\n"),
            )
            .unwrap();
            fs::write(
                config_dir.join(BUILD_KEY),
                format!("# Build Configuration\nvfs-root = 00 {}00000000000000\n", hex::encode(root_key)),
            )
            .unwrap();
            fs::write(data_dir.join("0000000001.idx"), self.index_file()).unwrap();
            for (number, data) in self.data.iter().enumerate() {
                fs::write(data_dir.join(format!("data.{number:03}")), data).unwrap();
            }
        }
    }

    /// Encodes `components` as a chain of nested folders ending in a file.
    fn path_node(components: &[&str], pre_separator: bool, vfs_offset: u32) -> Vec<u8> {
        let mut node = Vec::new();
        if pre_separator {
            node.push(0);
        }
        node.push(components[0].len() as u8);
        node.extend_from_slice(components[0].as_bytes());
        node.push(0xFF);
        if components.len() == 1 {
            node.extend_from_slice(&vfs_offset.to_be_bytes());
        } else {
            let children = path_node(&components[1..], true, vfs_offset);
            node.extend_from_slice(&(0x8000_0000 | (4 + children.len() as u32)).to_be_bytes());
            node.extend(children);
        }
        node
    }

    /// `root/dir/file` spans two data files: one raw frame in `data.000`, then
    /// a zlib and a raw frame in `data.001`. `locale/missing.txt` is not stored.
    fn split_storage() -> (tempfile::TempDir, CascStorage, Vec<u8>) {
        let content: Vec<u8> = (0..270u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut fixture = CascFixture::default();
        let first = fixture.add_entry(0, &[raw_frame(&content[..100])]);
        let second = fixture.add_entry(1, &[zlib_frame(&content[100..220]), raw_frame(&content[220..])]);
        fixture.add_file("root/dir/file", vec![first, second]);
        let absent = fixture.absent_key();
        fixture.add_file("locale/missing.txt", vec![absent]);

        let dir = tempfile::tempdir().unwrap();
        fixture.write(dir.path());
        let storage = CascStorage::open(dir.path()).unwrap();
        (dir, storage, content)
    }

    #[test]
    fn read_across_data_files() {
        let (_dir, storage, content) = split_storage();
        assert_eq!(storage.stage(), LoadStage::Ready);

        let mut file = storage.open_file("root/dir/file").unwrap();
        assert_eq!(file.size(), 270);
        file.seek(SeekFrom::Start(90)).unwrap();
        let mut buf = [0u8; 20];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(buf, content[90..110]);

        let mut whole = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut whole).unwrap();
        assert_eq!(whole, content);
    }

    #[test]
    fn frames_partition_the_file() {
        let (_dir, storage, _) = split_storage();
        let file = storage.open_file(r"\root\dir\file").unwrap();

        let mut frames: Vec<_> = file.spans().iter().flat_map(|span| span.frames.iter()).collect();
        frames.sort_by_key(|frame| frame.virtual_start_offset);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].virtual_start_offset, 0);
        for pair in frames.windows(2) {
            assert_eq!(pair[0].virtual_end_offset, pair[1].virtual_start_offset);
        }
        assert_eq!(frames[2].virtual_end_offset, file.size());
        assert_eq!(file.spans()[0].archive_index, 0);
        assert_eq!(file.spans()[1].archive_index, 1);
    }

    #[test]
    fn lists_local_and_missing_files() {
        let (_dir, storage, _) = split_storage();
        let files = storage.files();
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].file_name(), "locale/missing.txt");
        assert!(!files[0].is_local());
        assert_eq!(files[0].file_size(), 0);

        assert_eq!(files[1].file_name(), "root/dir/file");
        assert!(files[1].is_local());
        assert!(files[1].file_size() > 60);

        assert!(storage.file_exists("locale/missing.txt"));
        assert!(matches!(
            storage.open_file("locale/missing.txt"),
            Err(XpakError::FileNotFound(_))
        ));
        assert!(matches!(storage.open_file("nope"), Err(XpakError::FileNotFound(_))));
    }

    #[test]
    fn missing_build_info_is_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let err = CascStorage::open(dir.path()).unwrap_err();
        assert!(matches!(err, XpakError::MissingMetadata(_)));
    }

    #[test]
    fn missing_config_is_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixture = CascFixture::default();
        fixture.add_raw_file("a.txt", b"abc");
        fixture.write(dir.path());
        fs::remove_dir_all(dir.path().join("Data").join("config")).unwrap();

        let err = CascStorage::open(dir.path()).unwrap_err();
        assert!(matches!(err, XpakError::MissingMetadata(_)));
    }
}
