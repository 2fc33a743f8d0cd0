/// Represents information about a file in the CASC storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascFileInfo {
    /// The name of the file.
    pub(crate) file_name: String,
    /// The summed encoded size of the file's spans, 0 when not local.
    pub(crate) file_size: u64,
    /// Whether every span of the file is present in the local data files.
    pub(crate) is_local: bool,
}

impl CascFileInfo {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }
}
