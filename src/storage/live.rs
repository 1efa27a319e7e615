//! Plain per-file storage for recent months.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::error::Result;

const UPLOAD_PREFIX: &str = ".upload-";

/// Streams `payload` into `path` through a temp file in the same directory,
/// then renames it over the target. Concurrent writers to one path race only
/// on the rename; the last one wins.
pub fn write_atomic(path: &Path, payload: &mut impl Read) -> Result<u64> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(UPLOAD_PREFIX)
        .tempfile_in(dir)?;
    let written = io::copy(payload, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(written)
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort_unstable();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_creates_parents_and_replaces() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("alice/2024-01/app.log");

        let written = write_atomic(&path, &mut &b"first"[..]).expect("write");
        assert_eq!(written, 5);
        write_atomic(&path, &mut &b"second"[..]).expect("overwrite");
        assert_eq!(fs::read(&path).expect("read"), b"second");

        let names = list_files(path.parent().expect("parent")).expect("list");
        assert_eq!(names, vec!["app.log".to_string()]);
    }

    #[test]
    fn listing_skips_hidden_and_directories() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.log"), "b").expect("write");
        fs::write(dir.path().join("a.log"), "a").expect("write");
        fs::write(dir.path().join(".upload-123"), "partial").expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let names = list_files(dir.path()).expect("list");
        assert_eq!(names, vec!["a.log".to_string(), "b.log".to_string()]);
    }
}
