//! Calendar months as used for partitioning log storage.
//!
//! Months are written `YYYY-MM` everywhere: live directory names, container
//! stems, and the upload date header. All calendar math is UTC.

use std::fmt;
use std::str::FromStr;

use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::error::{Error, Result};
use crate::layout::LayoutError;

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    first: Date,
}

impl Month {
    pub fn parse(value: &str) -> std::result::Result<Self, LayoutError> {
        let invalid = || LayoutError::InvalidMonth {
            value: value.to_string(),
        };
        let bytes = value.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(invalid());
        }
        for (idx, byte) in bytes.iter().enumerate() {
            if idx != 4 && !byte.is_ascii_digit() {
                return Err(invalid());
            }
        }
        let year: i32 = value[..4].parse().map_err(|_| invalid())?;
        let month: u8 = value[5..].parse().map_err(|_| invalid())?;
        let month = time::Month::try_from(month).map_err(|_| invalid())?;
        let first = Date::from_calendar_date(year, month, 1).map_err(|_| invalid())?;
        Ok(Self { first })
    }

    /// The month containing `instant`, evaluated in UTC.
    pub fn containing(instant: OffsetDateTime) -> Self {
        let date = instant.to_offset(UtcOffset::UTC).date();
        Self {
            first: date - Duration::days(i64::from(date.day()) - 1),
        }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> time::Month {
        self.first.month()
    }

    /// Midnight UTC on the first day of the month.
    pub fn first_instant(&self) -> OffsetDateTime {
        self.first.midnight().assume_utc()
    }

    pub fn previous(&self) -> Self {
        Self::containing((self.first - Duration::days(1)).midnight().assume_utc())
    }

    pub fn next(&self) -> Self {
        Self::containing((self.first + Duration::days(31)).midnight().assume_utc())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.first.year(), self.first.month() as u8)
    }
}

impl FromStr for Month {
    type Err = LayoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Earliest accepted upload month and the latest instant an accepted month
/// may start at.
pub fn upload_window(now: OffsetDateTime) -> (Month, OffsetDateTime) {
    let now = now.to_offset(UtcOffset::UTC);
    (Month::containing(now).previous(), now + Duration::days(1))
}

/// Rejects upload months earlier than the previous calendar month or
/// starting after `now + 1 day`.
pub fn check_upload_window(month: Month, now: OffsetDateTime) -> Result<()> {
    let (earliest, latest) = upload_window(now);
    if month < earliest || month.first_instant() > latest {
        return Err(Error::OutOfRange(format!(
            "month {month} is outside the upload window ({earliest} through {})",
            Month::containing(latest)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn month(value: &str) -> Month {
        Month::parse(value).expect("month")
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(month("2024-03").to_string(), "2024-03");
        assert_eq!(month("0999-12").to_string(), "0999-12");
    }

    #[test]
    fn reject_malformed_months() {
        for bad in ["2024-3", "2024-13", "2024-00", "24-03", "2024/03", "2024-03-01", "abcd-ef"] {
            assert!(Month::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn ordering_is_chronological() {
        assert!(month("2023-12") < month("2024-01"));
        assert!(month("2024-02") < month("2024-10"));
    }

    #[test]
    fn previous_and_next_cross_year_boundary() {
        assert_eq!(month("2024-01").previous(), month("2023-12"));
        assert_eq!(month("2023-12").next(), month("2024-01"));
        assert_eq!(month("2024-01").next(), month("2024-02"));
    }

    #[test]
    fn containing_uses_utc() {
        let instant = datetime!(2024-03-01 01:00 +02:00);
        assert_eq!(Month::containing(instant), month("2024-02"));
    }

    #[test]
    fn upload_window_bounds() {
        let now = datetime!(2024-05-31 12:00 UTC);
        assert!(check_upload_window(month("2024-04"), now).is_ok());
        assert!(check_upload_window(month("2024-05"), now).is_ok());
        // tomorrow falls in June
        assert!(check_upload_window(month("2024-06"), now).is_ok());
        assert!(matches!(
            check_upload_window(month("2024-03"), now),
            Err(Error::OutOfRange(_))
        ));
        assert!(check_upload_window(month("2024-07"), now).is_err());
    }

    #[test]
    fn upload_window_mid_month_rejects_next_month() {
        let now = datetime!(2024-05-15 12:00 UTC);
        assert!(check_upload_window(month("2024-06"), now).is_err());
    }
}
