//! Reconstructs objects stored as a chain of block headers.
//!
//! Each physical chunk is a [`BlockHeader`] followed by the payloads of its
//! commands, stored back to back. After the last payload the stream is padded
//! to the next 0x80-byte boundary, where the next header begins.

use crate::archive_profile::{ArchiveFormat, ArchiveProfile, BlockMethod};
use crate::block_decompressor::{decompress_into, MAX_UNSIZED_OUTPUT};
use crate::block_header::{align_up, BlockHeader, BLOCK_ALIGNMENT, BLOCK_HEADER_SIZE};
use crate::error::XpakError;
use crate::package_cache_object::PackageCacheObject;
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

/// Returns the archive offset where an object's first block header lives.
///
/// IPAK object offsets are relative to the data segment, whose base offset is
/// stored in `uncompressed_size`.
pub fn object_start(loc: &PackageCacheObject, profile: &ArchiveProfile) -> u64 {
    match profile.format {
        ArchiveFormat::Ipak => loc.offset + loc.uncompressed_size,
        _ => loc.offset,
    }
}

/// Reads and decompresses one object.
///
/// `requested_size` overrides the decompressed size recorded in the index.
/// When neither is known the output is bounded by [`MAX_UNSIZED_OUTPUT`].
pub fn read_object<R: Read + Seek>(
    reader: &mut R,
    loc: &PackageCacheObject,
    requested_size: Option<u64>,
    profile: &ArchiveProfile,
) -> Result<Vec<u8>, XpakError> {
    let declared = match profile.format {
        ArchiveFormat::Ipak => None,
        _ => loc.known_size(),
    };
    let expected = requested_size.or(declared);
    let mut remaining = expected
        .map(|size| size as usize)
        .unwrap_or(MAX_UNSIZED_OUTPUT);

    let mut output = Vec::with_capacity(remaining.min(MAX_UNSIZED_OUTPUT));
    let mut payload = Vec::new();
    let mut data_read = 0u64;
    let mut position = reader.seek(SeekFrom::Start(object_start(loc, profile)))?;

    while data_read < loc.compressed_size {
        if data_read + BLOCK_HEADER_SIZE > loc.compressed_size {
            return Err(XpakError::Truncated(format!(
                "Block header at {position:#x} runs past the end of a {} byte object",
                loc.compressed_size
            )));
        }

        let header = BlockHeader::read(reader, profile.format)?;
        data_read += BLOCK_HEADER_SIZE;
        position += BLOCK_HEADER_SIZE;

        let count = header.commands.len();
        for (i, command) in header.commands.iter().enumerate() {
            let size = command.size as u64;
            let method = profile.block_method(command.method);

            if !matches!(method, BlockMethod::Padding(_)) {
                payload.resize(command.size as usize, 0);
                reader.read_exact(&mut payload)?;
                let written = decompress_into(method, &payload, remaining, &mut output)?;
                remaining = remaining.saturating_sub(written);
                trace!(?method, size, written, "decoded command");
            }

            let stride = profile.command_stride(size);
            let next = if i + 1 < count {
                position + stride
            } else {
                align_up(position + stride, BLOCK_ALIGNMENT)
            };
            data_read += next - position;
            position = reader.seek(SeekFrom::Start(next))?;
        }
    }

    Ok(output)
}
