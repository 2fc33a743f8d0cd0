use crate::error::XpakError;
use std::fmt;

/// The longest encoding key CASC stores anywhere.
pub const MAX_ENCODING_KEY_SIZE: usize = 16;

/// A CASC encoding key of up to 16 bytes.
///
/// Index files and TVFS tables usually store a truncated prefix of the full
/// key (9 bytes for most titles), so keys carry their own length and compare
/// by exactly that many bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingKey {
    bytes: [u8; MAX_ENCODING_KEY_SIZE],
    len: u8,
}

impl EncodingKey {
    /// Creates a key from the given bytes, keeping at most 16 of them.
    pub fn from_slice(key: &[u8]) -> Self {
        let len = key.len().min(MAX_ENCODING_KEY_SIZE);
        let mut bytes = [0u8; MAX_ENCODING_KEY_SIZE];
        bytes[..len].copy_from_slice(&key[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// Parses a hex string such as the `vfs-root` value of a build config.
    pub fn from_hex(key: &str) -> Result<Self, XpakError> {
        let decoded = hex::decode(key.trim())
            .map_err(|e| XpakError::InvalidData(format!("Invalid hex key {key}: {e}")))?;
        Ok(Self::from_slice(&decoded))
    }

    /// Returns a copy limited to the first `len` bytes.
    pub fn truncated(&self, len: usize) -> Self {
        Self::from_slice(&self.as_bytes()[..len.min(self.len())])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for EncodingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for EncodingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodingKey({self})")
    }
}
