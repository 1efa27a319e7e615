//! Server configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file (or no
//! file at all) yields a working configuration rooted at `./data`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::error::{Error, Result};
use crate::lifecycle::{RetentionWindow, RotationSchedule};

/// Configuration for the log server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory holding one subdirectory per owner.
    /// Default: `data`
    pub storage_root: PathBuf,

    /// Extension of newly written month containers (`zst`, `gz`, `xz`).
    /// Default: `zst`
    pub compression: String,

    /// Days a month stays live before rotation.
    /// Default: 93
    pub retention_days: u32,

    /// When the recurring rotation sweep runs (UTC).
    /// Default: day 15 at 03:00
    pub schedule: RotationSchedule,

    /// Listen address.
    /// Default: `0.0.0.0:8080`
    pub bind: String,

    /// Tab-separated credentials file.
    /// Default: `credentials.tsv`
    pub credentials: PathBuf,

    /// Largest accepted upload body.
    /// Default: 64 MB
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data"),
            compression: ArchiveFormat::Zstd.extension().to_string(),
            retention_days: 93,
            schedule: RotationSchedule::default(),
            bind: "0.0.0.0:8080".to_string(),
            credentials: PathBuf::from("credentials.tsv"),
            max_upload_bytes: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::from_toml(&text)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks every field that would otherwise fail at first use and returns
    /// the rotation format.
    pub fn validate(&self) -> Result<ArchiveFormat> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(Error::Config("storage_root must not be empty".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        self.schedule.validate()?;
        self.retention()?;
        ArchiveFormat::for_writing(&self.compression)
    }

    pub fn retention(&self) -> Result<RetentionWindow> {
        RetentionWindow::from_days(self.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.compression, "zst");
        assert_eq!(config.retention_days, 93);
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.schedule, RotationSchedule::default());
        assert_eq!(config.validate().expect("valid"), ArchiveFormat::Zstd);
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml(
            r#"
            storage_root = "/srv/logs"
            compression = "xz"

            [schedule]
            hour = 4
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage_root, PathBuf::from("/srv/logs"));
        assert_eq!(config.schedule.day, Some(15));
        assert_eq!(config.schedule.hour, 4);
        assert_eq!(config.retention_days, 93);
        assert_eq!(config.validate().expect("valid"), ArchiveFormat::Xz);
    }

    #[test]
    fn test_read_only_and_unknown_formats_rejected() {
        for compression in ["bz2", "lz4"] {
            let config = ServerConfig {
                compression: compression.to_string(),
                ..ServerConfig::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{compression}");
        }
    }

    #[test]
    fn test_bad_schedule_and_retention_rejected() {
        let config = ServerConfig {
            schedule: RotationSchedule {
                day: Some(30),
                ..RotationSchedule::default()
            },
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ServerConfig {
            retention_days: 10,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_daily_schedule_from_toml() {
        let config = ServerConfig::from_toml("[schedule]\nday = 0\nhour = 2\nminute = 30\n")
            .expect("parse");
        assert_eq!(config.schedule, RotationSchedule::daily(2, 30));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ServerConfig::from_toml("compresion = \"gz\"").is_err());
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let err = ServerConfig::from_path(Path::new("/nonexistent/logvault.toml"))
            .expect_err("missing");
        assert!(matches!(err, Error::Config(_)));
    }
}
