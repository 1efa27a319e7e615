//! Per-owner monthly log storage with compressed month archives.
//!
//! Uploads land as plain files under `root/<owner>/<YYYY-MM>/`. Months older
//! than the retention window are rotated into `root/<owner>/<YYYY-MM>.tar.<ext>`
//! and served from there transparently.

pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
#[cfg(feature = "server")]
pub mod http;
pub mod layout;
pub mod lifecycle;
pub mod month;
pub mod storage;

pub use archive::{ArchiveFormat, ArchiveIndex};
pub use config::ServerConfig;
pub use error::{ArchiveError, Error, Result};
pub use month::Month;
pub use storage::{LogReader, LogStore};
