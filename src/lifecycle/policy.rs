//! When months become eligible for rotation, and when sweeps run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time, UtcOffset};

use crate::error::{Error, Result};
use crate::month::Month;

/// Shortest window that keeps every month still open for uploads live.
pub const MIN_RETENTION: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// How long months stay in live storage before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow(Duration);

impl RetentionWindow {
    pub fn new(window: Duration) -> Result<Self> {
        if window < MIN_RETENTION {
            return Err(Error::Config(format!(
                "retention window of {}s is shorter than the upload window ({}s)",
                window.as_secs(),
                MIN_RETENTION.as_secs()
            )));
        }
        Ok(Self(window))
    }

    pub fn from_days(days: u32) -> Result<Self> {
        Self::new(Duration::from_secs(u64::from(days) * 24 * 60 * 60))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Months strictly before this one are eligible at `now`.
    pub fn cutoff(&self, now: OffsetDateTime) -> Month {
        Month::containing(now - self.0)
    }

    pub fn is_eligible(&self, month: Month, now: OffsetDateTime) -> bool {
        month < self.cutoff(now)
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self(Duration::from_secs(93 * 24 * 60 * 60))
    }
}

/// Recurring wall-clock trigger, evaluated in UTC.
///
/// With `day` set the sweep runs once a month on that day; without it the
/// sweep runs every day at `hour:minute`. Config files spell "daily" as
/// `day = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSchedule {
    #[serde(deserialize_with = "day_or_daily", serialize_with = "daily_as_zero")]
    pub day: Option<u8>,
    pub hour: u8,
    pub minute: u8,
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            day: Some(15),
            hour: 3,
            minute: 0,
        }
    }
}

impl RotationSchedule {
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            day: None,
            hour,
            minute,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(day) = self.day {
            if !(1..=28).contains(&day) {
                return Err(Error::Config(format!(
                    "schedule day must be between 1 and 28, got {day}"
                )));
            }
        }
        self.time_of_day().map(|_| ())
    }

    /// First trigger strictly after `now`.
    pub fn next_after(&self, now: OffsetDateTime) -> Result<OffsetDateTime> {
        self.validate()?;
        let now = now.to_offset(UtcOffset::UTC);
        let at = self.time_of_day()?;

        let Some(day) = self.day else {
            let today = now.date().with_time(at).assume_utc();
            return Ok(if today > now {
                today
            } else {
                today + time::Duration::days(1)
            });
        };

        let mut month = Month::containing(now);
        loop {
            let date = Date::from_calendar_date(month.year(), month.month(), day)
                .map_err(|err| Error::Config(format!("invalid schedule day: {err}")))?;
            let candidate = date.with_time(at).assume_utc();
            if candidate > now {
                return Ok(candidate);
            }
            month = month.next();
        }
    }

    fn time_of_day(&self) -> Result<Time> {
        Time::from_hms(self.hour, self.minute, 0).map_err(|err| {
            Error::Config(format!(
                "invalid schedule time {:02}:{:02}: {err}",
                self.hour, self.minute
            ))
        })
    }
}

fn day_or_daily<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let day = u8::deserialize(deserializer)?;
    Ok((day != 0).then_some(day))
}

fn daily_as_zero<S>(day: &Option<u8>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u8(day.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn month(value: &str) -> Month {
        Month::parse(value).expect("month")
    }

    #[test]
    fn cutoff_matches_month_of_now_minus_window() {
        let window = RetentionWindow::from_days(93).expect("window");
        let now = datetime!(2024-05-20 12:00 UTC);
        // 2024-05-20 minus 93 days is 2024-02-17
        assert_eq!(window.cutoff(now), month("2024-02"));
        assert!(window.is_eligible(month("2024-01"), now));
        assert!(!window.is_eligible(month("2024-02"), now));
        assert!(!window.is_eligible(month("2024-04"), now));
    }

    #[test]
    fn short_windows_are_rejected() {
        assert!(matches!(
            RetentionWindow::from_days(7),
            Err(Error::Config(_))
        ));
        assert!(RetentionWindow::from_days(31).is_ok());
    }

    #[test]
    fn minimum_window_never_rotates_previous_month() {
        let window = RetentionWindow::new(MIN_RETENTION).expect("window");
        for now in [
            datetime!(2024-03-01 00:00 UTC),
            datetime!(2024-03-31 23:59 UTC),
            datetime!(2024-01-15 12:00 UTC),
        ] {
            let previous = Month::containing(now).previous();
            assert!(!window.is_eligible(previous, now), "{now}");
        }
    }

    #[test]
    fn monthly_schedule_next_trigger() {
        let schedule = RotationSchedule::default();
        assert_eq!(
            schedule
                .next_after(datetime!(2024-05-10 08:00 UTC))
                .expect("next"),
            datetime!(2024-05-15 03:00 UTC)
        );
        assert_eq!(
            schedule
                .next_after(datetime!(2024-05-15 03:00 UTC))
                .expect("next"),
            datetime!(2024-06-15 03:00 UTC)
        );
        assert_eq!(
            schedule
                .next_after(datetime!(2024-12-20 00:00 UTC))
                .expect("next"),
            datetime!(2025-01-15 03:00 UTC)
        );
    }

    #[test]
    fn daily_schedule_next_trigger() {
        let schedule = RotationSchedule::daily(3, 30);
        assert_eq!(
            schedule
                .next_after(datetime!(2024-05-10 01:00 UTC))
                .expect("next"),
            datetime!(2024-05-10 03:30 UTC)
        );
        assert_eq!(
            schedule
                .next_after(datetime!(2024-05-31 04:00 UTC))
                .expect("next"),
            datetime!(2024-06-01 03:30 UTC)
        );
    }

    #[test]
    fn invalid_schedules_are_config_errors() {
        let bad_day = RotationSchedule {
            day: Some(31),
            ..RotationSchedule::default()
        };
        assert!(matches!(bad_day.validate(), Err(Error::Config(_))));
        let bad_hour = RotationSchedule::daily(24, 0);
        assert!(matches!(bad_hour.validate(), Err(Error::Config(_))));
    }
}
