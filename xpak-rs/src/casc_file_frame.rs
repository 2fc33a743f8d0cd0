/// Represents a frame within a CASC file, describing a segment of file data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CascFileFrame {
    /// The virtual start offset of the frame within the file.
    pub(crate) virtual_start_offset: u64,
    /// The virtual end offset of the frame within the file.
    pub(crate) virtual_end_offset: u64,
    /// The offset of the frame within the data file.
    pub(crate) archive_offset: u64,
    /// The encoded size of the frame, including its codec tag.
    pub(crate) encoded_size: u32,
    /// The decoded size of the frame.
    pub(crate) content_size: u32,
}

impl CascFileFrame {
    pub(crate) fn contains(&self, position: u64) -> bool {
        position >= self.virtual_start_offset && position < self.virtual_end_offset
    }
}
