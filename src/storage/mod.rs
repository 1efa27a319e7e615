//! Overlay of live per-file storage and month containers.
//!
//! Live storage is authoritative whenever it has the requested data; the
//! month container is consulted only as a fallback. Rotation keeps the two
//! mutually exclusive per month, so no merging is attempted.

mod cache;
pub mod live;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::archive::{self, ArchiveFormat, ArchiveIndex, MemberReader, RotateOutcome};
use crate::error::{Error, Result};
use crate::layout::{container_stem, member_name, validate_filename, StorageLayout};
use crate::month::{check_upload_window, Month};

pub use cache::{ArchiveCache, ArchiveKey};

/// Bytes of one log file, from whichever tier holds it.
pub enum LogReader {
    Live(File),
    Archived(MemberReader),
}

impl LogReader {
    pub fn is_archived(&self) -> bool {
        matches!(self, LogReader::Archived(_))
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            LogReader::Live(file) => file.read(buf),
            LogReader::Archived(member) => member.read(buf),
        }
    }
}

/// Storage engine for per-owner monthly logs.
#[derive(Debug)]
pub struct LogStore {
    layout: StorageLayout,
    format: ArchiveFormat,
    cache: ArchiveCache,
}

impl LogStore {
    /// `format` is the rotation target. Read-only formats are rejected here,
    /// before any request is served.
    pub fn new(root: impl Into<PathBuf>, format: ArchiveFormat) -> Result<Self> {
        if !format.is_writable() {
            return Err(Error::Config(format!(
                "compression format {format} is read-only and cannot be used for new archives"
            )));
        }
        Ok(Self {
            layout: StorageLayout::new(root),
            format,
            cache: ArchiveCache::new(),
        })
    }

    /// Path mapping for this store.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Directory holding one subdirectory per owner.
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Format used for new containers.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Indexes of containers read so far.
    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    /// Writes `payload` to live storage for `owner`/`month`/`filename`.
    pub fn upload(
        &self,
        owner: &str,
        month: Month,
        filename: &str,
        payload: &mut impl Read,
        now: OffsetDateTime,
    ) -> Result<u64> {
        check_upload_window(month, now)?;
        let path = self.layout.live_path(owner, month, filename)?;
        let written = live::write_atomic(&path, payload)?;
        log::info!("stored {owner}/{month}/{filename} ({written} bytes)");
        Ok(written)
    }

    /// Months with either a live directory or a container, oldest first.
    pub fn list_months(&self, owner: &str) -> Result<Vec<Month>> {
        let owner_dir = self.layout.owner_dir(owner)?;
        let entries = match fs::read_dir(&owner_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut months = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let candidate = if entry.file_type()?.is_dir() {
                name.as_str()
            } else {
                container_stem(&name)
            };
            if let Ok(month) = Month::parse(candidate) {
                months.insert(month);
            }
        }
        Ok(months.into_iter().collect())
    }

    /// Months that still have a live directory.
    pub fn live_months(&self, owner: &str) -> Result<Vec<Month>> {
        let owner_dir = self.layout.owner_dir(owner)?;
        let mut months = Vec::new();
        for entry in fs::read_dir(&owner_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(month) = Month::parse(&entry.file_name().to_string_lossy()) {
                months.push(month);
            }
        }
        months.sort_unstable();
        Ok(months)
    }

    /// Owner directories directly under the storage root.
    pub fn owners(&self) -> Result<Vec<String>> {
        let mut owners = Vec::new();
        for entry in fs::read_dir(self.root())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            owners.push(name);
        }
        owners.sort_unstable();
        Ok(owners)
    }

    /// File names for `owner`/`month`: the live directory if it exists,
    /// otherwise the container members with the month prefix removed.
    ///
    /// Only names that [`LogStore::open`] accepts are listed, so nested or
    /// dot-prefixed members stay hidden in either tier.
    pub fn list_files(&self, owner: &str, month: Month) -> Result<Vec<String>> {
        let month_dir = self.layout.month_dir(owner, month)?;
        if month_dir.is_dir() {
            return Ok(live::list_files(&month_dir)?);
        }

        let index = self.resolve_archive(owner, month)?;
        let prefix = format!("{month}/");
        let mut names: Vec<String> = index
            .member_names()
            .filter_map(|name| name.strip_prefix(&prefix))
            .filter(|name| validate_filename(name).is_ok())
            .map(str::to_string)
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Opens a log file, preferring live storage over the month container.
    pub fn open(&self, owner: &str, month: Month, filename: &str) -> Result<LogReader> {
        let live_path = self.layout.live_path(owner, month, filename)?;
        match open_regular(&live_path) {
            Ok(file) => return Ok(LogReader::Live(file)),
            Err(err) => log::debug!(
                "{} unavailable ({err}), trying archive",
                live_path.display()
            ),
        }

        let not_found = || Error::NotFound(format!("{owner}/{month}/{filename}"));
        let index = self.resolve_archive(owner, month).map_err(|err| {
            if err.is_not_found() {
                not_found()
            } else {
                err
            }
        })?;
        match index.fetch(&member_name(month, filename)) {
            Ok(member) => Ok(LogReader::Archived(member)),
            Err(err) if err.is_not_found() => Err(not_found()),
            Err(err) => Err(err),
        }
    }

    /// Reads a whole log file into memory.
    pub fn read(&self, owner: &str, month: Month, filename: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(owner, month, filename)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Index of the container for `owner`/`month`, built on first use.
    pub fn resolve_archive(&self, owner: &str, month: Month) -> Result<Arc<ArchiveIndex>> {
        let key = ArchiveKey::new(owner, month);
        self.cache.resolve_with(&key, || {
            let path = self
                .find_container(owner, month)?
                .ok_or_else(|| Error::NotFound(format!("no archive for {owner}/{month}")))?;
            ArchiveIndex::build(path)
        })
    }

    /// Looks for the month container, trying the configured format first and
    /// then every other known extension.
    pub fn find_container(&self, owner: &str, month: Month) -> Result<Option<PathBuf>> {
        let candidates = std::iter::once(self.format)
            .chain(ArchiveFormat::ALL.into_iter().filter(|f| *f != self.format));
        for format in candidates {
            let path = self.layout.container_path(owner, month, format)?;
            if path.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Rotates one live month of `owner` into a container.
    pub fn rotate_month(&self, owner: &str, month: Month) -> Result<RotateOutcome> {
        let owner_dir = self.layout.owner_dir(owner)?;
        archive::rotate(&owner_dir, month, self.format)
    }
}

fn open_regular(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a regular file", path.display()),
        ));
    }
    Ok(file)
}
