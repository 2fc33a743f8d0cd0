use crate::casc_file_frame::CascFileFrame;

/// Represents a span in a CASC file: the frames decoded from one index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CascFileSpan {
    /// The data file holding the span.
    pub(crate) archive_index: u32,
    /// The virtual start offset of the span.
    pub(crate) virtual_start_offset: u64,
    /// The virtual end offset of the span.
    pub(crate) virtual_end_offset: u64,
    /// The offset of the span's first frame within the data file.
    pub(crate) archive_offset: u64,
    /// The file frames within this span.
    pub(crate) frames: Vec<CascFileFrame>,
}

impl CascFileSpan {
    pub(crate) fn contains(&self, position: u64) -> bool {
        position >= self.virtual_start_offset && position < self.virtual_end_offset
    }
}
