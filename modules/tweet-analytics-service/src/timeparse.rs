//! Timestamp parsing shared by the importer and the date-range parameters.
//!
//! Everything is normalised to naive UTC and stored as
//! `YYYY-MM-DD HH:MM:SS`, which sorts lexically in chronological order.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::ops::RangeInclusive;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Four-digit years only; anything else breaks lexical ordering of the
/// stored text and sits at the edge of chrono's date range.
pub const YEARS: RangeInclusive<i32> = 1..=9999;

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%a %b %d %H:%M:%S %z %Y",
];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse any of the accepted timestamp spellings into naive UTC with
/// sub-second precision dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| {
            ZONED_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        })
        .map(|dt| dt.naive_utc())
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })?;

    parsed
        .with_nanosecond(0)
        .filter(|ts| YEARS.contains(&ts.year()))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// One end of a caller-supplied date range.
///
/// A bare date covers the whole calendar day; a full timestamp is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Date(NaiveDate),
    Instant(NaiveDateTime),
}

impl DateBound {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return YEARS.contains(&date.year()).then_some(DateBound::Date(date));
        }
        parse_timestamp(s).map(DateBound::Instant)
    }

    /// Earliest timestamp inside the bound.
    pub fn start(&self) -> NaiveDateTime {
        match self {
            DateBound::Date(d) => d.and_time(NaiveTime::MIN),
            DateBound::Instant(ts) => *ts,
        }
    }

    /// First timestamp strictly after the bound. Stored timestamps have
    /// whole-second precision, so `< end_exclusive` equals `<= bound`.
    pub fn end_exclusive(&self) -> NaiveDateTime {
        match self {
            DateBound::Date(d) => d.and_time(NaiveTime::MIN) + Duration::days(1),
            DateBound::Instant(ts) => *ts + Duration::seconds(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_parse_accepted_spellings() {
        let expected = ts("2023-01-01 12:30:00");
        assert_eq!(parse_timestamp("2023-01-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 12:30:00.250"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 14:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("Sun Jan 01 12:30:00 +0000 2023"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp("2023-01-01"),
            Some(ts("2023-01-01 00:00:00"))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2023-13-01"), None);
    }

    #[test]
    fn test_date_bound_covers_whole_day() {
        let bound = DateBound::parse("2023-01-02").unwrap();
        assert_eq!(bound.start(), ts("2023-01-02 00:00:00"));
        assert_eq!(bound.end_exclusive(), ts("2023-01-03 00:00:00"));
    }

    #[test]
    fn test_instant_bound_is_inclusive() {
        let bound = DateBound::parse("2023-01-02T08:00:00").unwrap();
        assert_eq!(bound.start(), ts("2023-01-02 08:00:00"));
        assert_eq!(bound.end_exclusive(), ts("2023-01-02 08:00:01"));
        assert!(DateBound::parse("not a date").is_none());
    }

    #[test]
    fn test_years_outside_four_digits_are_rejected() {
        for raw in [
            "-262143-01-03",
            "+262142-12-31",
            "0000-01-01",
            "+10000-01-01",
            "+262142-12-31 23:59:59",
        ] {
            assert!(DateBound::parse(raw).is_none(), "{}", raw);
            assert!(parse_timestamp(raw).is_none(), "{}", raw);
        }
        let last = DateBound::parse("9999-12-31").unwrap();
        assert_eq!(last.end_exclusive().year(), 10000);
        assert_eq!(
            DateBound::parse("0001-01-01").unwrap().start(),
            ts("0001-01-01 00:00:00")
        );
    }
}
