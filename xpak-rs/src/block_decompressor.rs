//! Decoders for the compressed segments referenced by block header commands.

use crate::archive_profile::BlockMethod;
use crate::error::XpakError;
use tracing::trace;

/// The most an Oodle chunk without a size prefix decodes to.
pub const OODLE_CHUNK_CAP: usize = 262_112;

/// Output bound used when an object does not record its decompressed size.
pub const MAX_UNSIZED_OUTPUT: usize = 0x0240_0000;

/// Upper bound on how many bytes one byte of an LZ4 block can expand to.
const LZ4_MAX_RATIO: usize = 255;

/// Decompresses one segment into a new buffer.
///
/// `expected_len` bounds the output of LZ4 segments and the output of chunked
/// Oodle segments (which decode `min(expected_len, OODLE_CHUNK_CAP)` bytes).
/// Raw segments are copied whole. Size-prefixed Oodle segments carry their own
/// length, which may not exceed `expected_len`. Padding tags produce an empty
/// buffer.
pub fn decompress(method: BlockMethod, input: &[u8], expected_len: usize) -> Result<Vec<u8>, XpakError> {
    let mut out = Vec::new();
    decompress_into(method, input, expected_len, &mut out)?;
    Ok(out)
}

/// Decompresses one segment, appending its output to `out`.
///
/// Returns the number of bytes appended. On failure `out` is restored to its
/// previous length so no partial output is ever left behind.
pub fn decompress_into(
    method: BlockMethod,
    input: &[u8],
    expected_len: usize,
    out: &mut Vec<u8>,
) -> Result<usize, XpakError> {
    let start = out.len();
    let capacity = match method {
        BlockMethod::Raw => input.len(),
        BlockMethod::Lz4 => expected_len.min(input.len().saturating_mul(LZ4_MAX_RATIO)),
        BlockMethod::OodleChunked => expected_len.min(OODLE_CHUNK_CAP),
        BlockMethod::OodleSizePrefixed => {
            let size = size_prefix(input)? as usize;
            if size > expected_len {
                return Err(XpakError::DecodeFailure(format!(
                    "Oodle segment declares {size} bytes but only {expected_len} remain"
                )));
            }
            size
        }
        BlockMethod::Lzo1x => return Err(XpakError::UnsupportedCodec("lzo1x".into())),
        BlockMethod::Padding(tag) => {
            trace!(tag, len = input.len(), "skipping padding segment");
            return Ok(0);
        }
    };

    out.resize(start + capacity, 0);
    match decode_block(method, input, &mut out[start..]) {
        Ok(written) => {
            out.truncate(start + written);
            Ok(written)
        }
        Err(err) => {
            out.truncate(start);
            Err(err)
        }
    }
}

/// Decodes one segment into `target`, returning the number of bytes written.
///
/// Chunked Oodle segments always fill `target` completely; callers size the
/// slice to the chunk they expect.
pub fn decode_block(method: BlockMethod, input: &[u8], target: &mut [u8]) -> Result<usize, XpakError> {
    match method {
        BlockMethod::Raw => {
            let target_len = target.len();
            let dest = target.get_mut(..input.len()).ok_or_else(|| {
                XpakError::DecodeFailure(format!(
                    "Raw segment of {} bytes does not fit in {target_len} bytes",
                    input.len()
                ))
            })?;
            dest.copy_from_slice(input);
            Ok(input.len())
        }
        BlockMethod::Lz4 => lz4_flex::block::decompress_into(input, target)
            .map_err(|e| XpakError::DecodeFailure(format!("LZ4: {e}"))),
        BlockMethod::OodleChunked => {
            oodle_decode(input, target)?;
            Ok(target.len())
        }
        BlockMethod::OodleSizePrefixed => {
            let size = size_prefix(input)? as usize;
            let target_len = target.len();
            let dest = target.get_mut(..size).ok_or_else(|| {
                XpakError::DecodeFailure(format!(
                    "Oodle segment declares {size} bytes but only {target_len} fit"
                ))
            })?;
            oodle_decode(&input[4..], dest)?;
            Ok(size)
        }
        BlockMethod::Lzo1x => Err(XpakError::UnsupportedCodec("lzo1x".into())),
        BlockMethod::Padding(_) => Ok(0),
    }
}

fn size_prefix(input: &[u8]) -> Result<u32, XpakError> {
    let prefix: [u8; 4] = input
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            XpakError::DecodeFailure(format!(
                "Oodle segment of {} bytes is missing its size prefix",
                input.len()
            ))
        })?;
    Ok(u32::from_le_bytes(prefix))
}

fn oodle_decode(input: &[u8], target: &mut [u8]) -> Result<(), XpakError> {
    if target.is_empty() {
        return Ok(());
    }
    let mut extractor = oozextract::Extractor::new();
    extractor
        .read_from_slice(input, target)
        .map_err(|e| XpakError::DecodeFailure(format!("Oodle: {e:?}")))?;
    Ok(())
}
