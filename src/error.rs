use std::path::PathBuf;

use thiserror::Error;

use crate::layout::LayoutError;

/// Problems with a month container, scoped to the request that hit them.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("truncated archive {path}")]
    Truncated { path: PathBuf },
    #[error("index mismatch in {path}: expected {expected}, found {found}")]
    Integrity {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("{member} not found in {path}")]
    MissingMember { path: PathBuf, member: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("date out of range: {0}")]
    OutOfRange(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("rotation of {month} failed: {source}")]
    Rotation {
        month: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True when the caller should treat the failure as a missing entry
    /// rather than a server fault.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Archive(ArchiveError::MissingMember { .. }) => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<LayoutError> for Error {
    fn from(value: LayoutError) -> Self {
        Error::InvalidInput(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
