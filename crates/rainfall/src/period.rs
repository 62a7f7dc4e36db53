//! Hour-aligned rainfall accumulation periods.

use crate::error::{RainfallError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KEY_TIME_FORMAT: &str = "%Y%m%dT%HZ";

/// A rainfall accumulation window `[start, start + span)`.
///
/// `start` is on the hour (zero minutes, seconds and sub-seconds) and the
/// span is a positive whole number of hours. Both are checked at
/// construction, so an invalid period never reaches a source or the cache.
///
/// The canonical string form, used as cache key, is
/// `YYYYMMDDTHHZ_PT{n}H`, e.g. `20260113T06Z_PT3H`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct AvailabilityPeriod {
    start: DateTime<Utc>,
    span_hours: u32,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: DateTime<Utc>,
    span_hours: u32,
}

impl TryFrom<RawPeriod> for AvailabilityPeriod {
    type Error = RainfallError;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Self::new(raw.start, raw.span_hours)
    }
}

impl AvailabilityPeriod {
    /// Validate and build a period.
    pub fn new(start: DateTime<Utc>, span_hours: u32) -> Result<Self> {
        if start.minute() != 0 || start.second() != 0 || start.nanosecond() != 0 {
            return Err(RainfallError::InvalidPeriod(format!(
                "start {} is not on the hour",
                start.to_rfc3339()
            )));
        }
        if span_hours == 0 {
            return Err(RainfallError::InvalidPeriod(
                "span must be at least one hour".into(),
            ));
        }
        // `end()` must stay inside chrono's range
        if start.checked_add_signed(span(span_hours)).is_none() {
            return Err(RainfallError::InvalidPeriod(format!(
                "{span_hours}h from {} is out of range",
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, span_hours })
    }

    /// A one-hour period starting at `start`
    pub fn hourly(start: DateTime<Utc>) -> Result<Self> {
        Self::new(start, 1)
    }

    /// The period of `span_hours` that ends at `end`
    pub fn ending_at(end: DateTime<Utc>, span_hours: u32) -> Result<Self> {
        let start = end.checked_sub_signed(span(span_hours)).ok_or_else(|| {
            RainfallError::InvalidPeriod(format!(
                "{span_hours}h before {} is out of range",
                end.to_rfc3339()
            ))
        })?;
        Self::new(start, span_hours)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn span_hours(&self) -> u32 {
        self.span_hours
    }

    /// Exclusive end of the window
    pub fn end(&self) -> DateTime<Utc> {
        self.start + span(self.span_hours)
    }

    /// The consecutive one-hour periods covering this one
    pub fn hours(&self) -> impl Iterator<Item = AvailabilityPeriod> + '_ {
        (0..self.span_hours).map(move |h| Self {
            start: self.start + Duration::hours(i64::from(h)),
            span_hours: 1,
        })
    }

    /// Canonical key, `YYYYMMDDTHHZ_PT{n}H`
    pub fn key(&self) -> String {
        format!("{}_PT{}H", self.start.format(KEY_TIME_FORMAT), self.span_hours)
    }
}

fn span(hours: u32) -> Duration {
    Duration::hours(i64::from(hours))
}

impl fmt::Display for AvailabilityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for AvailabilityPeriod {
    type Err = RainfallError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RainfallError::InvalidPeriod(format!("malformed period key '{s}'"));

        let (time, span) = s.split_once("_PT").ok_or_else(invalid)?;
        let span_hours: u32 = span
            .strip_suffix('H')
            .and_then(|n| n.parse().ok())
            .ok_or_else(invalid)?;
        // %M is required by the parser; the key carries only the hour
        let naive = NaiveDateTime::parse_from_str(&format!("{time}00"), "%Y%m%dT%HZ%M")
            .map_err(|_| invalid())?;

        Self::new(Utc.from_utc_datetime(&naive), span_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn key_format() {
        let p = AvailabilityPeriod::new(utc(2026, 1, 13, 6, 0), 3).unwrap();
        assert_eq!(p.key(), "20260113T06Z_PT3H");
        assert_eq!(p.to_string(), p.key());
        assert_eq!(p.end(), utc(2026, 1, 13, 9, 0));
    }

    #[test]
    fn key_parses_back() {
        let p: AvailabilityPeriod = "20260113T06Z_PT3H".parse().unwrap();
        assert_eq!(p.start(), utc(2026, 1, 13, 6, 0));
        assert_eq!(p.span_hours(), 3);

        assert!("20260113T06_PT3H".parse::<AvailabilityPeriod>().is_err());
        assert!("20260113T06Z_PT0H".parse::<AvailabilityPeriod>().is_err());
        assert!("garbage".parse::<AvailabilityPeriod>().is_err());
    }

    #[test]
    fn rejects_unaligned_start() {
        assert!(matches!(
            AvailabilityPeriod::new(utc(2026, 1, 13, 6, 30), 1),
            Err(RainfallError::InvalidPeriod(_))
        ));
        let with_seconds = Utc.with_ymd_and_hms(2026, 1, 13, 6, 0, 1).unwrap();
        assert!(AvailabilityPeriod::new(with_seconds, 1).is_err());
        let with_nanos = utc(2026, 1, 13, 6, 0) + Duration::nanoseconds(1);
        assert!(AvailabilityPeriod::new(with_nanos, 1).is_err());
    }

    #[test]
    fn rejects_zero_span() {
        assert!(AvailabilityPeriod::new(utc(2026, 1, 13, 6, 0), 0).is_err());
    }

    #[test]
    fn rejects_spans_past_the_calendar() {
        let start = utc(2026, 1, 13, 6, 0);
        assert!(matches!(
            AvailabilityPeriod::new(start, u32::MAX),
            Err(RainfallError::InvalidPeriod(_))
        ));
        assert!(matches!(
            AvailabilityPeriod::ending_at(start, u32::MAX),
            Err(RainfallError::InvalidPeriod(_))
        ));
        // a century is still fine
        let long = AvailabilityPeriod::new(start, 24 * 36_525).unwrap();
        assert_eq!(long.end(), start + Duration::days(36_525));
    }

    #[test]
    fn splits_into_hours() {
        let p = AvailabilityPeriod::ending_at(utc(2026, 1, 13, 0, 0), 3).unwrap();
        assert_eq!(p.start(), utc(2026, 1, 12, 21, 0));
        let keys: Vec<String> = p.hours().map(|h| h.key()).collect();
        assert_eq!(
            keys,
            vec!["20260112T21Z_PT1H", "20260112T22Z_PT1H", "20260112T23Z_PT1H"]
        );
    }

    #[test]
    fn serde_validates() {
        let p = AvailabilityPeriod::new(utc(2025, 9, 9, 12, 0), 1).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"span_hours\":1"));
        let back: AvailabilityPeriod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        let bad = r#"{"start":"2025-09-09T12:15:00Z","span_hours":1}"#;
        assert!(serde_json::from_str::<AvailabilityPeriod>(bad).is_err());
    }
}
