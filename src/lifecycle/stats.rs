//! Results of a rotation sweep.

use std::path::PathBuf;
use std::time::Duration;

/// Statistics from one sweep over all owners.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Eligible live months found.
    pub scanned_count: usize,

    /// Containers written during this sweep.
    pub created: Vec<PathBuf>,

    /// Files packed into the new containers.
    pub files_archived: usize,

    /// Months left live because their container already existed.
    pub skipped: Vec<PathBuf>,

    /// One message per month that failed to rotate.
    pub errors: Vec<String>,

    /// Time taken for the sweep.
    pub duration: Duration,
}

impl SweepReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a container written from `files` live files.
    pub fn record_created(&mut self, path: PathBuf, files: usize) {
        self.created.push(path);
        self.files_archived += files;
    }

    /// Record a month whose container already existed.
    pub fn record_skipped(&mut self, path: PathBuf) {
        self.skipped.push(path);
    }

    /// Record a month that failed to rotate.
    pub fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }

    /// True if any month failed.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One-line summary for the sweep log.
    pub fn summary(&self) -> String {
        format!(
            "Scanned: {}, Archived: {} ({} files), Skipped: {}, Errors: {}, Duration: {:?}",
            self.scanned_count,
            self.created.len(),
            self.files_archived,
            self.skipped.len(),
            self.errors.len(),
            self.duration
        )
    }
}
