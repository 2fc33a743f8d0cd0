use crate::block_decompressor::{decode_block, MAX_UNSIZED_OUTPUT};
use crate::archive_profile::BlockMethod;
use crate::block_header::align_up;
use crate::error::XpakError;
use crate::ext::io_ext::SeekExt;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Reads an object stored as a stream of LZ4 chunks, as used by the numbered
/// `xpakfileN.pak` packages behind an `xpakfile.toc`.
///
/// The object starts with its total decompressed size (`u64`) and 4 reserved
/// bytes, followed by `{compressed: u32, decompressed: u32, data}` chunks each
/// padded to 4 bytes.
pub fn read_chunk_stream<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Vec<u8>, XpakError> {
    reader.seek(SeekFrom::Start(offset))?;
    let total = reader.read_u64::<LittleEndian>()?;
    reader.skip(4u64)?;

    if total > MAX_UNSIZED_OUTPUT as u64 {
        return Err(XpakError::CorruptContainer(format!(
            "Chunk stream at {offset:#x} declares {total} bytes"
        )));
    }

    let total = total as usize;
    let mut output = vec![0u8; total];
    let mut produced = 0usize;
    let mut compressed = Vec::new();

    while produced < total {
        let compressed_size = reader.read_u32::<LittleEndian>()? as usize;
        let decompressed_size = reader.read_u32::<LittleEndian>()? as usize;
        if decompressed_size == 0 || produced + decompressed_size > total {
            return Err(XpakError::CorruptContainer(format!(
                "Chunk of {decompressed_size} bytes at {produced} does not fit a {total} byte object"
            )));
        }

        compressed.resize(compressed_size, 0);
        reader.read_exact(&mut compressed)?;
        let target = &mut output[produced..produced + decompressed_size];
        let written = decode_block(BlockMethod::Lz4, &compressed, target)?;
        if written != decompressed_size {
            return Err(XpakError::DecodeFailure(format!(
                "LZ4 chunk produced {written} of {decompressed_size} bytes"
            )));
        }
        produced += decompressed_size;

        let position = reader.stream_position()?;
        reader.seek(SeekFrom::Start(align_up(position, 4)))?;
    }

    Ok(output)
}
