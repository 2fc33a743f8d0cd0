use crate::archive_profile::ArchiveFormat;
use crate::error::XpakError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// Size in bytes of a block header on disk, for both header layouts.
pub const BLOCK_HEADER_SIZE: u64 = 128;

/// Block headers and the commands following them are padded to this boundary.
pub const BLOCK_ALIGNMENT: u64 = 0x80;

/// One compressed segment described by a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCommand {
    /// Size of the segment on disk (24 bits).
    pub size: u32,
    /// Raw method tag (8 bits).
    pub method: u8,
}

impl BlockCommand {
    pub fn from_packed(packed: u32) -> Self {
        Self {
            size: packed & 0x00FF_FFFF,
            method: (packed >> 24) as u8,
        }
    }
}

/// A block header: a table of commands whose payloads follow it back to back.
///
/// XPAK headers store `{count: u32, offset: u32, commands: [u32; 30]}`.
/// IPAK headers pack `{offset: 24, count: 8}` into the first word and hold
/// 31 commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub offset: u32,
    pub commands: Vec<BlockCommand>,
}

impl BlockHeader {
    /// Reads one header, always consuming [`BLOCK_HEADER_SIZE`] bytes.
    pub fn read<R: Read>(reader: &mut R, format: ArchiveFormat) -> Result<Self, XpakError> {
        let (count, offset, slots) = match format {
            ArchiveFormat::Ipak => {
                let packed = reader.read_u32::<LittleEndian>()?;
                (packed >> 24, packed & 0x00FF_FFFF, 31)
            }
            _ => {
                let count = reader.read_u32::<LittleEndian>()?;
                let offset = reader.read_u32::<LittleEndian>()?;
                (count, offset, 30)
            }
        };

        let mut raw = [0u32; 31];
        reader.read_u32_into::<LittleEndian>(&mut raw[..slots])?;

        if count as usize > slots {
            return Err(XpakError::CorruptContainer(format!(
                "Block header declares {count} commands, at most {slots} fit"
            )));
        }

        Ok(Self {
            offset,
            commands: raw[..count as usize]
                .iter()
                .map(|&packed| BlockCommand::from_packed(packed))
                .collect(),
        })
    }
}

/// Rounds `position` up to the next multiple of `alignment`, a power of two.
pub fn align_up(position: u64, alignment: u64) -> u64 {
    (position + alignment - 1) & !(alignment - 1)
}
