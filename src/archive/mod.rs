//! Month containers: compressed tar archives holding one owner's month.
//!
//! The supported compressors are stream-only, so random access is provided by
//! an ordinal index built in one full scan (`ArchiveIndex::build`) and then
//! replayed from the start of the stream on every fetch.
//!
//! # Formats
//!
//! - `zst`, `gz`, `xz`: readable and writable
//! - `bz2`: legacy, readable only

mod codec;
mod index;
mod rotate;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use index::{ArchiveIndex, MemberLocation, MemberReader};
pub use rotate::{rotate, RotateOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zstd,
    Gzip,
    Xz,
    Bzip2,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 4] = [
        ArchiveFormat::Zstd,
        ArchiveFormat::Gzip,
        ArchiveFormat::Xz,
        ArchiveFormat::Bzip2,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zstd => "zst",
            ArchiveFormat::Gzip => "gz",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Bzip2 => "bz2",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.extension() == ext)
    }

    /// Infers the format from the last extension of `path`.
    pub fn detect(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Bzip2 is decode-only.
    pub fn is_writable(self) -> bool {
        !matches!(self, ArchiveFormat::Bzip2)
    }

    /// Parses a format name for use as a rotation target.
    ///
    /// Unknown and read-only formats are configuration errors.
    pub fn for_writing(name: &str) -> Result<Self> {
        let format: ArchiveFormat = name.parse()?;
        if !format.is_writable() {
            return Err(Error::Config(format!(
                "compression format {name} is read-only and cannot be used for new archives"
            )));
        }
        Ok(format)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| Error::Config(format!("unsupported compression format: {s}")))
    }
}
