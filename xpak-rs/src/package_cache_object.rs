/// The location of one object inside a package file.
///
/// Values are produced by the index loaders and never modified afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackageCacheObject {
    /// Offset of the first block header within the package file.
    pub offset: u64,
    /// Number of bytes the object occupies on disk, headers and padding
    /// included.
    pub compressed_size: u64,
    /// Decompressed size when the package stores it, `0` when unknown.
    ///
    /// IPAK packages reuse this field for the base offset of their data
    /// segment, since object offsets there are relative to it.
    pub uncompressed_size: u64,
    /// Index into the owning cache's package file paths.
    pub archive_index: u32,
}

impl PackageCacheObject {
    /// Returns the decompressed size if the package recorded one.
    pub fn known_size(&self) -> Option<u64> {
        (self.uncompressed_size != 0).then_some(self.uncompressed_size)
    }
}
