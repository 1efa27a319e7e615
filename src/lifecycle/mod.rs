//! Storage lifecycle management.
//!
//! Live month directories older than the retention window are rotated into
//! month containers:
//! - once at startup to clear any backlog
//! - then on a recurring wall-clock schedule
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logvault::lifecycle::{RetentionWindow, RotationManager, RotationSchedule};
//!
//! let manager = Arc::new(RotationManager::new(
//!     store,
//!     RetentionWindow::from_days(93)?,
//!     RotationSchedule::default(),
//! ));
//! let report = manager.sweep(time::OffsetDateTime::now_utc());
//! println!("{}", report.summary());
//! manager.spawn();
//! ```

mod manager;
mod policy;
mod stats;

pub use manager::RotationManager;
pub use policy::{RetentionWindow, RotationSchedule, MIN_RETENTION};
pub use stats::SweepReport;
