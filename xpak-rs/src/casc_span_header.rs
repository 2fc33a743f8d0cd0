use crate::error::XpakError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// The 30-byte header preceding every entry in a CASC data file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CascSpanHeader {
    /// The encoding key of the entry, stored byte-reversed on disk.
    pub(crate) encoding_key: [u8; 16],
    /// The size of the entry, header included.
    pub(crate) size: u32,
    pub(crate) flags: u16,
    pub(crate) jenkins_hash: u32,
    pub(crate) checksum: u32,
}

impl CascSpanHeader {
    pub(crate) const SIZE: u64 = 30;

    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self, XpakError> {
        let mut encoding_key = [0u8; 16];
        reader.read_exact(&mut encoding_key)?;
        encoding_key.reverse();
        Ok(Self {
            encoding_key,
            size: reader.read_u32::<LittleEndian>()?,
            flags: reader.read_u16::<LittleEndian>()?,
            jenkins_hash: reader.read_u32::<LittleEndian>()?,
            checksum: reader.read_u32::<LittleEndian>()?,
        })
    }
}
