use crate::content_key::ContentKey;
use thiserror::Error;

/// Represents all possible errors that can occur while indexing or extracting
/// package objects.
///
/// A key that is simply absent from a cache is not an error: lookups return
/// `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum XpakError {
    /// The file is not a container of the expected family, or one of its
    /// header fields points outside the file.
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),
    /// A read returned fewer bytes than a header declared.
    #[error("Truncated data: {0}")]
    Truncated(String),
    /// An object block carried a different key than the one requested.
    #[error("Content key mismatch: expected {expected}, found {found}")]
    KeyMismatch {
        expected: ContentKey,
        found: ContentKey,
    },
    /// A block decoder rejected its input.
    #[error("Failed to decode block: {0}")]
    DecodeFailure(String),
    /// A block uses a codec that is recognised but not decodable here.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    /// CASC build info or build config is absent or unparseable.
    #[error("Missing storage metadata: {0}")]
    MissingMetadata(String),
    /// A named file or entry does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Data is structurally invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

/// Short reads surface as [`XpakError::Truncated`], everything else as
/// [`XpakError::Io`].
impl From<std::io::Error> for XpakError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            XpakError::Truncated(error.to_string())
        } else {
            XpakError::Io(error)
        }
    }
}

impl From<XpakError> for std::io::Error {
    fn from(error: XpakError) -> Self {
        match error {
            XpakError::Io(err) => err,
            XpakError::Truncated(msg) => std::io::Error::new(std::io::ErrorKind::UnexpectedEof, msg),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
