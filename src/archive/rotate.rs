use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tar::Builder;
use walkdir::{DirEntry, WalkDir};

use super::codec::ContainerEncoder;
use super::ArchiveFormat;
use crate::error::{Error, Result};
use crate::layout::container_file_name;
use crate::month::Month;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// A new container was written and the live month directory removed.
    Created { path: PathBuf, files: usize },
    /// The container already existed; nothing was written or removed.
    AlreadyArchived(PathBuf),
}

impl RotateOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RotateOutcome::Created { path, .. } => path,
            RotateOutcome::AlreadyArchived(path) => path,
        }
    }
}

/// Packs every regular file under `root/<month>` into
/// `root/<month>.tar.<ext>` and then removes the source directory.
///
/// Member names are relative to `root`, so they start with the month segment.
/// Dot-prefixed entries (in-flight or abandoned upload temp files) are left
/// out. The container is assembled under a dot-prefixed temporary name and
/// only linked into place after the tar writer, compressor and file have all
/// been finalized and synced. Any failure before that point leaves the source
/// directory untouched and discards the partial output.
pub fn rotate(root: &Path, month: Month, format: ArchiveFormat) -> Result<RotateOutcome> {
    rotate_with(root, month, format, write_container)
}

/// [`rotate`] with the packing step supplied by the caller.
fn rotate_with<F>(root: &Path, month: Month, format: ArchiveFormat, pack: F) -> Result<RotateOutcome>
where
    F: FnOnce(&Path, &Path, File, ArchiveFormat) -> Result<usize>,
{
    if !format.is_writable() {
        return Err(Error::Config(format!("{format} archives are read-only")));
    }

    let container = root.join(container_file_name(month, format));
    if container.try_exists()? {
        return Ok(RotateOutcome::AlreadyArchived(container));
    }

    let source = root.join(month.to_string());
    if !source.is_dir() {
        return Err(Error::NotFound(source.display().to_string()));
    }

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", container_file_name(month, format)))
        .tempfile_in(root)?;

    let files = pack(root, &source, temp.reopen()?, format)?;

    match temp.persist_noclobber(&container) {
        Ok(_) => {}
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(RotateOutcome::AlreadyArchived(container));
        }
        Err(err) => return Err(err.error.into()),
    }
    fsync_dir(root)?;

    fs::remove_dir_all(&source)?;
    log::info!(
        "compressed {} ({} files) into {}",
        source.display(),
        files,
        container.display()
    );
    Ok(RotateOutcome::Created {
        path: container,
        files,
    })
}

fn write_container(root: &Path, source: &Path, file: File, format: ArchiveFormat) -> Result<usize> {
    let mut builder = Builder::new(ContainerEncoder::new(file, format)?);
    let files = append_month(root, source, &mut builder)?;

    // Finalize inner to outer: tar trailer, compressor trailer, file.
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()?;
    Ok(files)
}

/// Appends every non-hidden regular file under `source`, named relative to
/// `root`. Returns the number of files written.
fn append_month<W: Write>(root: &Path, source: &Path, builder: &mut Builder<W>) -> Result<usize> {
    let mut files = 0;
    let walker = WalkDir::new(source)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.path().strip_prefix(root).map_err(|_| {
            Error::InvalidInput(format!(
                "{} is outside {}",
                entry.path().display(),
                root.display()
            ))
        })?;
        builder.append_path_with_name(entry.path(), name)?;
        files += 1;
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}
