use crate::error::XpakError;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Read;

/// `BLTE` read as a little-endian `u32`.
pub(crate) const BLTE_SIGNATURE: u32 = 0x4554_4C42;

/// Represents the header of a BLTE block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockTableHeader {
    pub(crate) signature: u32,
    /// Size of the header and frame table; 0 when the entry is one frame.
    pub(crate) header_size: u32,
    pub(crate) table_format: u8,
    pub(crate) frame_count: u32,
}

impl BlockTableHeader {
    /// Size of the signature and header size fields.
    pub(crate) const PREFIX_SIZE: u64 = 8;

    /// Reads the header. The table format and frame count are only present
    /// when `header_size` is non-zero.
    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != BLTE_SIGNATURE {
            return Err(XpakError::InvalidData(format!(
                "Invalid Block Table Header signature: {signature:#X}"
            )));
        }
        let header_size = reader.read_u32::<BigEndian>()?;
        if header_size == 0 {
            return Ok(Self {
                signature,
                header_size,
                table_format: 0,
                frame_count: 1,
            });
        }
        Ok(Self {
            signature,
            header_size,
            table_format: reader.read_u8()?,
            frame_count: reader.read_u24::<BigEndian>()?,
        })
    }
}
