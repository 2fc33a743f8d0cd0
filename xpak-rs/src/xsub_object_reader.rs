//! Reconstructs objects stored in XSUB streaming blocks.
//!
//! A block starts with a small header naming the key of the object it belongs
//! to, followed by a table of descriptors. Each descriptor places one decoded
//! payload at an explicit offset in the output, so payloads may arrive in any
//! order.

use crate::archive_profile::{ArchiveProfile, BlockMethod};
use crate::block_decompressor::{decode_block, MAX_UNSIZED_OUTPUT};
use crate::block_header::{align_up, BLOCK_ALIGNMENT};
use crate::content_key::ContentKey;
use crate::error::XpakError;
use crate::ext::io_ext::SeekExt;
use crate::package_cache_object::PackageCacheObject;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

/// Magic value opening every XSUB block.
pub const XSUB_BLOCK_MAGIC: u16 = 0xF01D;

/// Size in bytes of one block descriptor.
pub const XSUB_DESCRIPTOR_SIZE: usize = 21;

/// Describes one payload inside an XSUB block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XsubBlockDescriptor {
    pub method: u8,
    pub compressed_size: u32,
    pub decompressed_size: u32,
    /// Offset of the payload relative to the start of its block.
    pub block_offset: u32,
    /// Offset of the decoded payload within the object.
    pub decompressed_offset: u32,
}

impl XsubBlockDescriptor {
    fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        let descriptor = Self {
            method: reader.read_u8()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            decompressed_size: reader.read_u32::<LittleEndian>()?,
            block_offset: reader.read_u32::<LittleEndian>()?,
            decompressed_offset: reader.read_u32::<LittleEndian>()?,
        };
        let _reserved = reader.read_u32::<LittleEndian>()?;
        Ok(descriptor)
    }
}

/// Reads the blocks of `key` starting at `loc.offset`.
///
/// A block with no descriptors carries nothing but is still stepped over.
/// Fails with [`XpakError::KeyMismatch`] as soon as a block names a different
/// object, since the index entry then points at the wrong data.
pub fn read_xsub_object<R: Read + Seek>(
    reader: &mut R,
    key: ContentKey,
    loc: &PackageCacheObject,
    profile: &ArchiveProfile,
) -> Result<Vec<u8>, XpakError> {
    let end = loc.offset.saturating_add(loc.compressed_size);
    let mut block_pos = loc.offset;
    let mut output = Vec::with_capacity((loc.uncompressed_size as usize).min(MAX_UNSIZED_OUTPUT));
    let mut written = 0usize;
    let mut payload = Vec::new();

    while block_pos < end {
        reader.seek(SeekFrom::Start(block_pos))?;

        let magic = reader.read_u16::<LittleEndian>()?;
        if magic != XSUB_BLOCK_MAGIC {
            return Err(XpakError::CorruptContainer(format!(
                "Invalid XSUB block magic {magic:#06x} at {block_pos:#x}"
            )));
        }
        let found = ContentKey(reader.read_u64::<LittleEndian>()?);
        if found != key {
            return Err(XpakError::KeyMismatch {
                expected: key,
                found,
            });
        }
        reader.skip(12u64)?;

        let count = reader.read_u8()?;
        let descriptors = (0..count)
            .map(|_| XsubBlockDescriptor::read(reader))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cursor = reader.stream_position()?;
        for descriptor in &descriptors {
            let payload_pos = block_pos + descriptor.block_offset as u64;
            cursor = payload_pos + descriptor.compressed_size as u64;
            if cursor > end {
                return Err(XpakError::Truncated(format!(
                    "XSUB payload at {payload_pos:#x} runs {} bytes past object {key}",
                    cursor - end
                )));
            }

            let method = profile.block_method(descriptor.method);
            let out_len = match method {
                BlockMethod::Raw => descriptor.compressed_size,
                BlockMethod::Lz4 | BlockMethod::OodleChunked => descriptor.decompressed_size,
                _ => {
                    trace!(method = descriptor.method, "skipping XSUB payload");
                    continue;
                }
            } as usize;

            let out_start = descriptor.decompressed_offset as usize;
            let out_end = out_start + out_len;
            if out_end > MAX_UNSIZED_OUTPUT {
                return Err(XpakError::CorruptContainer(format!(
                    "XSUB payload for {key} ends at {out_end:#x}, beyond the output limit"
                )));
            }
            if output.len() < out_end {
                output.resize(out_end, 0);
            }

            reader.seek(SeekFrom::Start(payload_pos))?;
            payload.resize(descriptor.compressed_size as usize, 0);
            reader.read_exact(&mut payload)?;
            decode_block(method, &payload, &mut output[out_start..out_end])?;
            written = written.max(out_end);
        }

        let next = align_up(cursor, BLOCK_ALIGNMENT);
        if next <= block_pos {
            return Err(XpakError::CorruptContainer(format!(
                "XSUB block at {block_pos:#x} does not advance"
            )));
        }
        block_pos = next;
    }

    output.truncate(written);
    Ok(output)
}
