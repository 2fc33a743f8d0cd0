/// Represents the codec tag opening every BLTE frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTableEncoderType {
    /// `N`: stored bytes.
    Raw,
    /// `Z`: a zlib stream.
    ZLib,
    /// `E`: encrypted data, which needs keys this crate does not carry.
    Encrypted,
    /// Unknown or unsupported tag, stores the raw byte value.
    Unknown(u8),
}

impl From<u8> for BlockTableEncoderType {
    fn from(byte: u8) -> Self {
        match byte {
            b'N' => BlockTableEncoderType::Raw,
            b'Z' => BlockTableEncoderType::ZLib,
            b'E' => BlockTableEncoderType::Encrypted,
            other => BlockTableEncoderType::Unknown(other),
        }
    }
}
