//! DICOM date/time (DA, TM, DT) parsing
//!
//! Accepted DT forms:
//!
//! | Form | Example |
//! |------|---------|
//! | `YYYYMMDDHHMMSS.ffffff±ZZZZ` | `20210816123045.123456+1000` |
//! | `YYYYMMDDHHMMSS.fff±ZZZZ` | `20210816123045.123-0500` |
//! | `YYYYMMDDHHMMSS.ffffff` | `20210816123045.123456` |
//! | `YYYYMMDDHHMMSS.fff` | `20210816123045.123` |
//! | `YYYYMMDDHHMMSS` | `20210816123045` |
//! | `YYYYMMDDHHMM` | `202108161230` |
//! | `YYYYMMDD` | `20210816` |
//!
//! Everything else is [`DicomError::UnparsableDateTime`].

use crate::error::{DicomError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

/// A parsed DT value, with the UTC offset when one was given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DicomDateTime {
    pub datetime: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

impl DicomDateTime {
    /// Offset-aware value, if the source carried an offset
    pub fn with_offset(&self) -> Option<DateTime<FixedOffset>> {
        let offset = self.offset?;
        self.datetime.and_local_timezone(offset).single()
    }
}

impl fmt::Display for DicomDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime.format("%Y-%m-%d %H:%M:%S"))?;
        if let Some(offset) = self.offset {
            write!(f, " {}", offset)?;
        }
        Ok(())
    }
}

impl Serialize for DicomDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn number(s: &str) -> u32 {
    s.bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

/// Split a trailing `±ZZZZ` offset
fn split_offset(value: &str) -> Option<(&str, FixedOffset)> {
    if value.len() < 5 || !value.is_char_boundary(value.len() - 5) {
        return None;
    }
    let (main, zone) = value.split_at(value.len() - 5);
    let sign = match zone.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    if !all_digits(&zone[1..]) {
        return None;
    }
    let seconds = (number(&zone[1..3]) * 3600 + number(&zone[3..5]) * 60) as i32;
    FixedOffset::east_opt(sign * seconds).map(|offset| (main, offset))
}

/// Parse a DT value in one of the supported forms
///
/// # Examples
///
/// ```
/// use dicomtools_rust::query::datetime::parse_datetime;
///
/// let dt = parse_datetime("20210816123045").unwrap();
/// assert_eq!(dt.to_string(), "2021-08-16 12:30:45");
/// assert!(parse_datetime("2021-08-16").is_err());
/// ```
pub fn parse_datetime(value: &str) -> Result<DicomDateTime> {
    let unparsable = || DicomError::UnparsableDateTime(value.to_string());
    let trimmed = value.trim();

    let (main, offset) = match split_offset(trimmed) {
        Some((main, offset)) if main.contains('.') => (main, Some(offset)),
        _ => (trimmed, None),
    };

    let (digits, micros) = match main.split_once('.') {
        Some((whole, fraction)) => {
            if whole.len() != 14 || !all_digits(fraction) {
                return Err(unparsable());
            }
            let micros = match fraction.len() {
                6 => number(fraction),
                3 => number(fraction) * 1000,
                _ => return Err(unparsable()),
            };
            (whole, micros)
        }
        None => (main, 0),
    };
    if !all_digits(digits) || !matches!(digits.len(), 8 | 12 | 14) {
        return Err(unparsable());
    }

    let date = NaiveDate::from_ymd_opt(
        number(&digits[0..4]) as i32,
        number(&digits[4..6]),
        number(&digits[6..8]),
    )
    .ok_or_else(unparsable)?;
    let (hour, minute, second) = match digits.len() {
        14 => (
            number(&digits[8..10]),
            number(&digits[10..12]),
            number(&digits[12..14]),
        ),
        12 => (number(&digits[8..10]), number(&digits[10..12]), 0),
        _ => (0, 0, 0),
    };
    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros).ok_or_else(unparsable)?;

    Ok(DicomDateTime {
        datetime: NaiveDateTime::new(date, time),
        offset,
    })
}

/// Combine a DA and a TM value into a date-time
///
/// The fractional part of the time is dropped before parsing. Values that do
/// not parse are treated as absent.
pub fn parse_date_time(date: &str, time: &str) -> Option<DicomDateTime> {
    let time = time.split('.').next().unwrap_or_default();
    let combined = format!("{}{}", date.trim(), time.trim());
    if combined.is_empty() {
        return None;
    }
    match parse_datetime(&combined) {
        Ok(dt) => Some(dt),
        Err(e) => {
            debug!(error = %e, "Ignoring unparsable date/time");
            None
        }
    }
}

/// Format a date as DA (`YYYYMMDD`)
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, us: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, us)
            .unwrap()
    }

    #[test]
    fn test_full_precision_with_offset() {
        let dt = parse_datetime("20210816123045.123456+1000").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 12, 30, 45, 123_456));
        assert_eq!(dt.offset, FixedOffset::east_opt(10 * 3600));
        assert!(dt.with_offset().is_some());
    }

    #[test]
    fn test_millis_with_negative_offset() {
        let dt = parse_datetime("20210816123045.123-0530").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 12, 30, 45, 123_000));
        assert_eq!(dt.offset, FixedOffset::west_opt(5 * 3600 + 30 * 60));
    }

    #[test]
    fn test_fraction_without_offset() {
        let dt = parse_datetime("20210816123045.654321").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 12, 30, 45, 654_321));
        assert_eq!(dt.offset, None);

        let dt = parse_datetime("20210816123045.654").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 12, 30, 45, 654_000));
    }

    #[test]
    fn test_shorter_forms() {
        assert_eq!(
            parse_datetime("20210816123045").unwrap().datetime,
            naive(2021, 8, 16, 12, 30, 45, 0)
        );
        assert_eq!(
            parse_datetime("202108161230").unwrap().datetime,
            naive(2021, 8, 16, 12, 30, 0, 0)
        );
        assert_eq!(
            parse_datetime("20210816").unwrap().datetime,
            naive(2021, 8, 16, 0, 0, 0, 0)
        );
    }

    #[test]
    fn test_unparsable_forms() {
        for value in [
            "",
            "2021",
            "202108",
            "2021081612",
            "20210816123045.12",
            "20210816123045+1000",
            "2021-08-16",
            "20211332",
            "20210816256000",
        ] {
            assert!(
                matches!(parse_datetime(value), Err(DicomError::UnparsableDateTime(_))),
                "{:?} should not parse",
                value
            );
        }
    }

    #[test]
    fn test_date_time_strips_fraction() {
        let dt = parse_date_time("20210816", "123045.999").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 12, 30, 45, 0));
    }

    #[test]
    fn test_date_time_date_only() {
        let dt = parse_date_time("20210816", "").unwrap();
        assert_eq!(dt.datetime, naive(2021, 8, 16, 0, 0, 0, 0));
    }

    #[test]
    fn test_date_time_unparsable_is_none() {
        assert_eq!(parse_date_time("", ""), None);
        assert_eq!(parse_date_time("2021", "12"), None);
    }

    #[test]
    fn test_display() {
        let dt = parse_datetime("20210816123045.123+1000").unwrap();
        assert_eq!(dt.to_string(), "2021-08-16 12:30:45 +10:00");
    }
}
