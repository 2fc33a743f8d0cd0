use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// A 64-bit identifier of an object stored in an XPAK, XSUB, IPAK or XPTOC
/// package.
///
/// Keys are supplied by the asset catalog of the caller; a cache only indexes
/// them and never generates new ones (with the exception of XPTOC tables,
/// which store binary hashes that must be rehashed with
/// [`ContentKey::from_xxhash`]).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey(pub u64);

impl ContentKey {
    /// Hashes a string into a key using XXH64 with a zero seed.
    pub fn from_xxhash(value: &str) -> Self {
        ContentKey(xxh64(value.as_bytes(), 0))
    }

    /// Returns the raw 64-bit value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for ContentKey {
    fn from(value: u64) -> Self {
        ContentKey(value)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
