use std::fmt;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveFormat;
use crate::month::Month;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EmptyComponent { field: &'static str },
    InvalidComponent { field: &'static str, value: String },
    InvalidMonth { value: String },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::EmptyComponent { field } => {
                write!(f, "empty path component: {field}")
            }
            LayoutError::InvalidComponent { field, value } => {
                write!(f, "invalid path component for {field}: {value}")
            }
            LayoutError::InvalidMonth { value } => {
                write!(f, "invalid month format (expected YYYY-MM): {value}")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

type Result<T> = std::result::Result<T, LayoutError>;

/// Maps owners, months and filenames onto the storage root.
///
/// ```text
/// <root>/<owner>/<YYYY-MM>/<filename>      live storage
/// <root>/<owner>/<YYYY-MM>.tar.<ext>       month container
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owner_dir(&self, owner: &str) -> Result<PathBuf> {
        validate_component("owner", owner)?;
        Ok(self.root.join(owner))
    }

    pub fn month_dir(&self, owner: &str, month: Month) -> Result<PathBuf> {
        Ok(self.owner_dir(owner)?.join(month.to_string()))
    }

    pub fn live_path(&self, owner: &str, month: Month, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.month_dir(owner, month)?.join(filename))
    }

    pub fn container_path(
        &self,
        owner: &str,
        month: Month,
        format: ArchiveFormat,
    ) -> Result<PathBuf> {
        Ok(self
            .owner_dir(owner)?
            .join(container_file_name(month, format)))
    }
}

pub fn container_file_name(month: Month, format: ArchiveFormat) -> String {
    format!("{month}.tar.{}", format.extension())
}

/// Name of `filename` inside the container for `month`.
pub fn member_name(month: Month, filename: &str) -> String {
    format!("{month}/{filename}")
}

/// Strips the two trailing extensions of a container file name,
/// e.g. `2024-01.tar.zst` becomes `2024-01`.
pub fn container_stem(file_name: &str) -> &str {
    let mut stem = file_name;
    for _ in 0..2 {
        if let Some(idx) = stem.rfind('.') {
            stem = &stem[..idx];
        }
    }
    stem
}

pub fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LayoutError::EmptyComponent { field });
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    if value.contains('\0') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Filenames follow the component rules and may not be dot-prefixed;
/// dot-prefixed names are reserved for in-flight upload files.
pub fn validate_filename(value: &str) -> Result<()> {
    validate_component("filename", value)?;
    if value.starts_with('.') {
        return Err(LayoutError::InvalidComponent {
            field: "filename",
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(value: &str) -> Month {
        Month::parse(value).expect("month")
    }

    #[test]
    fn live_file_path() {
        let layout = StorageLayout::new("/srv/logs");
        let path = layout
            .live_path("alice", month("2024-01"), "app.log")
            .expect("live path");
        assert_eq!(path, PathBuf::from("/srv/logs/alice/2024-01/app.log"));
    }

    #[test]
    fn container_path_uses_format_extension() {
        let layout = StorageLayout::new("/srv/logs");
        let path = layout
            .container_path("alice", month("2024-01"), ArchiveFormat::Xz)
            .expect("container path");
        assert_eq!(path, PathBuf::from("/srv/logs/alice/2024-01.tar.xz"));
    }

    #[test]
    fn stem_strips_two_extensions() {
        assert_eq!(container_stem("2024-01.tar.zst"), "2024-01");
        assert_eq!(container_stem("2024-01.tar.zst.tmp"), "2024-01.tar");
        assert_eq!(container_stem("notes"), "notes");
    }

    #[test]
    fn reject_invalid_component() {
        let layout = StorageLayout::new("/srv/logs");
        let err = layout.owner_dir("bad/owner").unwrap_err();
        assert!(matches!(err, LayoutError::InvalidComponent { .. }));
        let err = layout.owner_dir("").unwrap_err();
        assert!(matches!(err, LayoutError::EmptyComponent { .. }));
    }

    #[test]
    fn reject_hidden_filename() {
        let layout = StorageLayout::new("/srv/logs");
        let err = layout
            .live_path("alice", month("2024-01"), ".upload-x")
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidComponent { .. }));
        assert!(layout.live_path("alice", month("2024-01"), "..").is_err());
    }
}
