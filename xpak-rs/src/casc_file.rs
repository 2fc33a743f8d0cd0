use crate::block_table::block_table_encoder_type::BlockTableEncoderType;
use crate::casc_file_span::CascFileSpan;
use crate::error::XpakError;
use crate::handle_pool::HandlePool;
use flate2::read::ZlibDecoder;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::trace;

/// A readable, seekable view of one file in a CASC storage.
///
/// Frames are decoded on demand; the most recently decoded frame is cached so
/// sequential reads decode each frame once. Every `CascFile` has its own
/// position and cache, and shares only the storage's handle pool, so any
/// number of files can be read on different threads.
#[derive(Debug)]
pub struct CascFile {
    /// The spans that make up the file.
    spans: Vec<CascFileSpan>,
    data_files: Arc<HandlePool>,
    /// The total size of the file.
    size: u64,
    /// The current read position within the file.
    position: u64,
    /// The decoded bytes of the frame at `cache_start..cache_end`.
    cache: Option<Vec<u8>>,
    cache_start: u64,
    cache_end: u64,
}

impl CascFile {
    pub(crate) fn new(spans: Vec<CascFileSpan>, data_files: Arc<HandlePool>) -> Self {
        let size = spans.last().map_or(0, |span| span.virtual_end_offset);
        CascFile {
            spans,
            data_files,
            size,
            position: 0,
            cache: None,
            cache_start: 0,
            cache_end: 0,
        }
    }

    /// Returns the total size of the file.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn spans(&self) -> &[CascFileSpan] {
        &self.spans
    }

    /// Returns a new reader over the same frames, positioned at the start.
    /// The frame table is not read again.
    pub fn reopen(&self) -> CascFile {
        CascFile::new(self.spans.clone(), Arc::clone(&self.data_files))
    }

    /// Decodes the frame holding `position` into the cache.
    fn load_frame(&mut self, position: u64) -> Result<(), XpakError> {
        let span = self
            .spans
            .iter()
            .find(|span| span.contains(position))
            .ok_or_else(|| XpakError::InvalidData(format!("No span holds offset {position}")))?;
        let frame = span
            .frames
            .iter()
            .find(|frame| frame.contains(position))
            .ok_or_else(|| XpakError::InvalidData(format!("No frame holds offset {position}")))?;

        let mut encoded = vec![0u8; frame.encoded_size as usize];
        self.data_files
            .read_exact_at(span.archive_index, frame.archive_offset, &mut encoded)?;
        trace!(
            archive = span.archive_index,
            offset = frame.archive_offset,
            encoded = frame.encoded_size,
            "decoding BLTE frame"
        );

        let decoded = decode_frame(&encoded, Some(frame.content_size as usize))?;
        self.cache_start = frame.virtual_start_offset;
        self.cache_end = frame.virtual_end_offset;
        self.cache = Some(decoded);
        Ok(())
    }
}

/// Decodes one BLTE frame: a codec tag followed by the payload. When
/// `content_size` is known the decoded length must match it.
pub(crate) fn decode_frame(encoded: &[u8], content_size: Option<usize>) -> Result<Vec<u8>, XpakError> {
    let (&tag, payload) = encoded
        .split_first()
        .ok_or_else(|| XpakError::Truncated("Empty BLTE frame".into()))?;

    let decoded = match BlockTableEncoderType::from(tag) {
        BlockTableEncoderType::Raw => payload.to_vec(),
        BlockTableEncoderType::ZLib => {
            let mut decoded = Vec::with_capacity(content_size.unwrap_or(payload.len()));
            ZlibDecoder::new(payload)
                .read_to_end(&mut decoded)
                .map_err(|err| XpakError::DecodeFailure(format!("zlib: {err}")))?;
            decoded
        }
        BlockTableEncoderType::Encrypted => {
            return Err(XpakError::UnsupportedCodec("encrypted BLTE frame".into()))
        }
        BlockTableEncoderType::Unknown(tag) => {
            return Err(XpakError::DecodeFailure(format!(
                "Unsupported Block Table Type {tag:#04x}"
            )))
        }
    };

    if let Some(expected) = content_size.filter(|expected| *expected != decoded.len()) {
        return Err(XpakError::DecodeFailure(format!(
            "BLTE frame decoded to {} bytes, expected {expected}",
            decoded.len()
        )));
    }
    Ok(decoded)
}

impl Read for CascFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut consumed = 0;

        while consumed < buf.len() && self.position < self.size {
            let cached = self.cache.is_some()
                && self.cache_start <= self.position
                && self.position < self.cache_end;
            if !cached {
                self.load_frame(self.position)?;
            }

            if let Some(cache) = &self.cache {
                let start = (self.position - self.cache_start) as usize;
                let n = (buf.len() - consumed).min(cache.len() - start);
                buf[consumed..consumed + n].copy_from_slice(&cache[start..start + n]);
                consumed += n;
                self.position += n as u64;
            }
        }
        Ok(consumed)
    }
}

impl Seek for CascFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => self.size.checked_add_signed(offset),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek to a negative position")
        })?;
        Ok(self.position)
    }
}
