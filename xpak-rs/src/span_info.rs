use crate::encoding_key::EncodingKey;

/// One span of a TVFS file: a range of the logical file backed by the data
/// stored under `encoding_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanInfo {
    /// Offset of the span within the logical file.
    pub ref_offset: u32,
    /// Content size of the span.
    pub span_size: u32,
    /// Offset of the span's key in the content file table.
    pub cft_offset: u32,
    pub encoding_key: EncodingKey,
}
