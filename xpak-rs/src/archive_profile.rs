use bitflags::bitflags;

/// The container family a package cache reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// `.xpak` packages with a 120-byte `KAPI` header.
    Xpak,
    /// `.xpak` packages using the XSUB header layout with a companion data file.
    VgXpak,
    /// `.xsub` streaming packages.
    Xsub,
    /// `.ipak` segment-table packages.
    Ipak,
    /// A single `xpakfile.toc` table over numbered `xpakfileN.pak` packages.
    Xptoc,
}

impl ArchiveFormat {
    /// The file extension the format's packages use, without a dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Xpak | ArchiveFormat::VgXpak => "xpak",
            ArchiveFormat::Xsub => "xsub",
            ArchiveFormat::Ipak => "ipak",
            ArchiveFormat::Xptoc => "toc",
        }
    }
}

bitflags! {
    /// Behaviour that differs between titles sharing a container format.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProfileQuirks: u32 {
        /// Command sizes are rounded up to 4 bytes before advancing.
        const ALIGNED_COMMANDS = 0x0001;
        /// The XPAK index section carries `key:value` property text whose
        /// `size0` entry is the uncompressed size of the object.
        const INDEX_PROPERTIES = 0x0002;
    }
}

/// The block-method tags of a block header command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMethod {
    /// Stored bytes.
    Raw,
    /// An LZ4 block.
    Lz4,
    /// An Oodle stream whose output is capped per chunk.
    OodleChunked,
    /// An Oodle stream preceded by its little-endian decompressed size.
    OodleSizePrefixed,
    /// An LZO1X block, only produced by IPAK packages.
    Lzo1x,
    /// Any reserved tag; contributes no output.
    Padding(u8),
}

/// Identifies how a set of packages should be read.
///
/// Passed to every reader explicitly so two caches over different titles can
/// coexist in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveProfile {
    pub format: ArchiveFormat,
    pub quirks: ProfileQuirks,
}

impl ArchiveProfile {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            quirks: ProfileQuirks::empty(),
        }
    }

    pub fn with_quirks(mut self, quirks: ProfileQuirks) -> Self {
        self.quirks |= quirks;
        self
    }

    pub fn has_quirk(&self, quirk: ProfileQuirks) -> bool {
        self.quirks.contains(quirk)
    }

    /// Maps a raw command tag to the method it selects for this format.
    pub fn block_method(&self, tag: u8) -> BlockMethod {
        match tag {
            0 => BlockMethod::Raw,
            1 if self.format == ArchiveFormat::Ipak => BlockMethod::Lzo1x,
            3 => BlockMethod::Lz4,
            6 => BlockMethod::OodleChunked,
            8 => BlockMethod::OodleSizePrefixed,
            other => BlockMethod::Padding(other),
        }
    }

    /// Rounds a command size the way this profile advances between commands.
    pub fn command_stride(&self, size: u64) -> u64 {
        if self.has_quirk(ProfileQuirks::ALIGNED_COMMANDS) {
            (size + 3) & !3
        } else {
            size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_one_is_lzo_only_for_ipak() {
        let ipak = ArchiveProfile::new(ArchiveFormat::Ipak);
        let xpak = ArchiveProfile::new(ArchiveFormat::Xpak);
        assert_eq!(ipak.block_method(1), BlockMethod::Lzo1x);
        assert_eq!(xpak.block_method(1), BlockMethod::Padding(1));
        assert_eq!(xpak.block_method(8), BlockMethod::OodleSizePrefixed);
    }

    #[test]
    fn aligned_commands_round_to_four() {
        let plain = ArchiveProfile::new(ArchiveFormat::Xpak);
        let aligned = plain.with_quirks(ProfileQuirks::ALIGNED_COMMANDS);
        assert_eq!(plain.command_stride(13), 13);
        assert_eq!(aligned.command_stride(13), 16);
        assert_eq!(aligned.command_stride(16), 16);
    }
}
