use crate::error::XpakError;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Represents an entry in a BLTE frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockTableEntry {
    /// The encoded size of the frame, including its codec tag.
    pub(crate) encoded_size: u32,
    /// The decoded size of the frame.
    pub(crate) content_size: u32,
    /// MD5 of the encoded frame.
    pub(crate) hash: [u8; 16],
}

impl BlockTableEntry {
    pub(crate) const SIZE: u64 = 24;

    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        let encoded_size = reader.read_u32::<BigEndian>()?;
        let content_size = reader.read_u32::<BigEndian>()?;
        let mut hash = [0u8; 16];
        reader.read_exact(&mut hash)?;
        Ok(Self {
            encoded_size,
            content_size,
            hash,
        })
    }
}
