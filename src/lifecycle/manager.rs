//! Rotation scheduler: moves stale live months into containers.

use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;

use crate::archive::RotateOutcome;
use crate::error::Error;
use crate::lifecycle::{RetentionWindow, RotationSchedule, SweepReport};
use crate::storage::LogStore;

/// Drives rotation for every owner's months older than the retention window.
///
/// The manager never touches the archive cache; new containers are indexed
/// lazily on first read.
pub struct RotationManager {
    store: Arc<LogStore>,
    retention: RetentionWindow,
    schedule: RotationSchedule,
}

impl RotationManager {
    pub fn new(store: Arc<LogStore>, retention: RetentionWindow, schedule: RotationSchedule) -> Self {
        Self {
            store,
            retention,
            schedule,
        }
    }

    pub fn retention(&self) -> RetentionWindow {
        self.retention
    }

    pub fn schedule(&self) -> RotationSchedule {
        self.schedule
    }

    /// Rotates every eligible (owner, month) once.
    ///
    /// Each month is attempted independently; a failure is logged and
    /// recorded, and the sweep moves on.
    pub fn sweep(&self, now: OffsetDateTime) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new();
        let cutoff = self.retention.cutoff(now);

        let owners = match self.store.owners() {
            Ok(owners) => owners,
            Err(err) => {
                log::error!("cannot list {}: {err}", self.store.root().display());
                report.record_error(format!("{}: {err}", self.store.root().display()));
                report.duration = start.elapsed();
                return report;
            }
        };

        for owner in owners {
            let months = match self.store.live_months(&owner) {
                Ok(months) => months,
                Err(err) => {
                    log::warn!("cannot list months for {owner}: {err}");
                    report.record_error(format!("{owner}: {err}"));
                    continue;
                }
            };

            for month in months.into_iter().filter(|month| *month < cutoff) {
                report.scanned_count += 1;
                match self.store.rotate_month(&owner, month) {
                    Ok(RotateOutcome::Created { path, files }) => {
                        report.record_created(path, files);
                    }
                    Ok(RotateOutcome::AlreadyArchived(path)) => {
                        log::warn!(
                            "{} already exists; leaving live {owner}/{month} in place",
                            path.display()
                        );
                        report.record_skipped(path);
                    }
                    Err(err) => {
                        let err = Error::Rotation {
                            month: format!("{owner}/{month}"),
                            source: Box::new(err),
                        };
                        log::warn!("{err}");
                        report.record_error(err.to_string());
                    }
                }
            }
        }

        report.duration = start.elapsed();
        report
    }

    /// Runs the recurring sweep on a background task for the life of the
    /// process. Sweeps themselves run on the blocking pool.
    #[cfg(feature = "server")]
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run_loop())
    }

    #[cfg(feature = "server")]
    async fn run_loop(self: Arc<Self>) {
        loop {
            let now = OffsetDateTime::now_utc();
            let next = match self.schedule.next_after(now) {
                Ok(next) => next,
                Err(err) => {
                    log::error!("rotation schedule stopped: {err}");
                    return;
                }
            };
            let wait = std::time::Duration::try_from(next - now).unwrap_or_default();
            log::info!("next rotation sweep at {next}");
            tokio::time::sleep(wait).await;

            let manager = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || manager.sweep(OffsetDateTime::now_utc())).await {
                Ok(report) => log::info!("rotation sweep finished: {}", report.summary()),
                Err(err) => log::error!("rotation sweep panicked: {err}"),
            }
        }
    }
}
