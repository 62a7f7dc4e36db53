//! Forecast coverage descriptors and selection.
//!
//! A forecast service publishes one coverage per model run and accumulation
//! span. Coverage identifiers look like
//! `TOTAL_PRECIPITATION__GROUND_OR_WATER_SURFACE___2026-01-13T06.00.00Z_PT3H`:
//! a product prefix, the run (publication) time and an ISO-8601 duration.

use crate::error::{RainfallError, Result};
use crate::period::AvailabilityPeriod;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;

/// One published forecast coverage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageDescriptor {
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub accumulation_span_hours: u32,
}

fn coverage_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<prefix>.+?)___(?P<time>\d{4}-\d{2}-\d{2}T\d{2}\.\d{2}\.\d{2}Z)_(?P<span>P[0-9A-Z]+)$")
            .expect("valid coverage id regex")
    })
}

fn capabilities_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?:wcs:)?CoverageId>\s*([^<\s]+)\s*</(?:wcs:)?CoverageId>")
            .expect("valid capabilities regex")
    })
}

/// Parse an ISO-8601 duration into whole hours.
///
/// Accepts the day/hour/minute/second designators; anything that is not a
/// positive whole number of hours yields `None`.
pub fn parse_duration_hours(text: &str) -> Option<u32> {
    let rest = text.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds: u64 = 0;
    for (part, units) in [
        (date_part, &[('D', 86_400u64)][..]),
        (time_part, &[('H', 3600), ('M', 60), ('S', 1)][..]),
    ] {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() {
                number.push(ch);
                continue;
            }
            let (_, scale) = units.iter().find(|(u, _)| *u == ch)?;
            let value: u64 = number.parse().ok()?;
            seconds += value * scale;
            number.clear();
        }
        if !number.is_empty() {
            return None;
        }
    }

    if seconds == 0 || seconds % 3600 != 0 {
        return None;
    }
    u32::try_from(seconds / 3600).ok()
}

impl CoverageDescriptor {
    /// Parse a coverage identifier. Identifiers from other products (when a
    /// prefix is given) or in an unknown shape yield `None`.
    pub fn parse(id: &str, prefix: Option<&str>) -> Option<Self> {
        let caps = coverage_id_regex().captures(id)?;
        if let Some(expected) = prefix {
            if &caps["prefix"] != expected {
                return None;
            }
        }
        let naive = NaiveDateTime::parse_from_str(&caps["time"], "%Y-%m-%dT%H.%M.%SZ").ok()?;
        let span = parse_duration_hours(&caps["span"])?;
        Some(Self {
            id: id.to_string(),
            published_at: naive.and_utc(),
            accumulation_span_hours: span,
        })
    }
}

/// Extract and parse every coverage id of a WCS capabilities document
pub fn parse_capabilities(xml: &str, prefix: Option<&str>) -> Vec<CoverageDescriptor> {
    capabilities_regex()
        .captures_iter(xml)
        .filter_map(|caps| {
            let id = &caps[1];
            let parsed = CoverageDescriptor::parse(id, prefix);
            if parsed.is_none() {
                tracing::debug!("skipping coverage id {id}");
            }
            parsed
        })
        .collect()
}

/// Pick the coverage serving `period`.
///
/// Candidates have the period's span and were published no later than
/// `period.start - lookback_hours`; the most recently published one wins.
pub fn select_coverage<'a>(
    coverages: &'a [CoverageDescriptor],
    period: &AvailabilityPeriod,
    lookback_hours: u32,
) -> Result<&'a CoverageDescriptor> {
    let cutoff = period.start() - Duration::hours(i64::from(lookback_hours));
    coverages
        .iter()
        .filter(|c| c.accumulation_span_hours == period.span_hours() && c.published_at <= cutoff)
        .max_by_key(|c| c.published_at)
        .ok_or_else(|| {
            RainfallError::unavailable(
                period,
                format!("no coverage with span {}h published by {}", period.span_hours(), cutoff.to_rfc3339()),
            )
        })
}

/// Coverage list with a refresh deadline.
///
/// Owned by the remote source; the list is refetched lazily once it is
/// older than the TTL.
#[derive(Debug)]
pub struct CoverageCatalog {
    ttl: std::time::Duration,
    entries: Vec<CoverageDescriptor>,
    fetched_at: Option<Instant>,
}

impl CoverageCatalog {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl,
            entries: Vec::new(),
            fetched_at: None,
        }
    }

    /// Whether the list must be refetched before use
    pub fn is_stale(&self) -> bool {
        self.fetched_at.map_or(true, |t| t.elapsed() >= self.ttl)
    }

    pub fn replace(&mut self, entries: Vec<CoverageDescriptor>) {
        self.entries = entries;
        self.fetched_at = Some(Instant::now());
    }

    pub fn entries(&self) -> &[CoverageDescriptor] {
        &self.entries
    }
}
