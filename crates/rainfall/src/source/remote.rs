//! Rainfall forecasts from a WCS 2.0 service.

use super::RainfallSource;
use crate::coverage::{parse_capabilities, select_coverage, CoverageCatalog, CoverageDescriptor};
use crate::error::{RainfallError, Result};
use crate::http::{Fetched, HttpClient};
use crate::period::AvailabilityPeriod;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const WCS_VERSION: &str = "2.0.1";

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Default for BoundingBox {
    /// The Garonne watershed upstream of Toulouse
    fn default() -> Self {
        Self {
            min_lon: -0.5,
            min_lat: 42.4,
            max_lon: 2.2,
            max_lat: 43.7,
        }
    }
}

/// Configuration for [`RemoteForecastSource`].
#[derive(Debug, Clone)]
pub struct RemoteSourceOptions {
    /// Service root; `GetCapabilities` and `GetCoverage` are appended
    pub base_url: String,
    /// Sent as the `apikey` header when set
    pub api_key: Option<String>,
    /// Product prefix of the coverage ids to consider
    pub coverage_prefix: String,
    /// Area requested from GetCoverage
    pub bbox: BoundingBox,
    /// Minimum age of a run, relative to the period start, to be eligible
    pub lookback_hours: u32,
    /// How long a capabilities listing stays fresh (default 1 h)
    pub catalog_ttl: Duration,
    /// Per-request timeout (default 30 s)
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3)
    pub max_retries: u32,
}

impl Default for RemoteSourceOptions {
    fn default() -> Self {
        Self {
            base_url: "https://public-api.meteofrance.fr/public/arome/1.0/wcs/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS".into(),
            api_key: None,
            coverage_prefix: "TOTAL_PRECIPITATION__GROUND_OR_WATER_SURFACE".into(),
            bbox: BoundingBox::default(),
            lookback_hours: 0,
            catalog_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Forecast rainfall fetched coverage by coverage from a WCS service.
///
/// The capabilities listing is kept in a [`CoverageCatalog`] and refreshed
/// when older than `catalog_ttl`.
pub struct RemoteForecastSource {
    http: HttpClient,
    options: RemoteSourceOptions,
    catalog: Mutex<CoverageCatalog>,
}

impl RemoteForecastSource {
    pub fn new(options: RemoteSourceOptions) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout, options.max_retries, options.api_key.clone())?;
        Ok(Self {
            http,
            catalog: Mutex::new(CoverageCatalog::new(options.catalog_ttl)),
            options,
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), operation)
    }

    /// Current coverage list, refreshed if stale
    pub async fn coverages(&self) -> Result<Vec<CoverageDescriptor>> {
        let mut catalog = self.catalog.lock().await;
        if catalog.is_stale() {
            let query = [
                ("service", "WCS".to_string()),
                ("version", WCS_VERSION.to_string()),
                ("language", "eng".to_string()),
            ];
            let xml = match self.http.get_text(&self.endpoint("GetCapabilities"), &query).await? {
                Fetched::Found(xml) => xml,
                Fetched::NotFound => {
                    return Err(RainfallError::UpstreamFetch(
                        "capabilities endpoint returned 404".into(),
                    ))
                }
            };
            let entries = parse_capabilities(&xml, Some(&self.options.coverage_prefix));
            info!("coverage catalog refreshed: {} coverages", entries.len());
            catalog.replace(entries);
        }
        Ok(catalog.entries().to_vec())
    }

    fn coverage_query(&self, coverage: &CoverageDescriptor, period: &AvailabilityPeriod) -> Vec<(&'static str, String)> {
        let bbox = &self.options.bbox;
        vec![
            ("service", "WCS".to_string()),
            ("version", WCS_VERSION.to_string()),
            ("coverageid", coverage.id.clone()),
            ("subset", format!("time({})", period.end().format("%Y-%m-%dT%H:%M:%SZ"))),
            ("subset", format!("lat({},{})", bbox.min_lat, bbox.max_lat)),
            ("subset", format!("long({},{})", bbox.min_lon, bbox.max_lon)),
            ("format", "image/tiff".to_string()),
        ]
    }
}

impl RainfallSource for RemoteForecastSource {
    fn name(&self) -> &str {
        "remote-forecast"
    }

    /// The earliest window each listed coverage can serve: its span,
    /// starting `lookback_hours` after publication.
    async fn availability(&self) -> Result<Vec<AvailabilityPeriod>> {
        let lookback = ChronoDuration::hours(i64::from(self.options.lookback_hours));
        let mut periods: Vec<AvailabilityPeriod> = self
            .coverages()
            .await?
            .iter()
            .filter_map(|c| AvailabilityPeriod::new(c.published_at + lookback, c.accumulation_span_hours).ok())
            .collect();
        periods.sort();
        periods.dedup();
        Ok(periods)
    }

    async fn fetch(&self, period: &AvailabilityPeriod) -> Result<Vec<u8>> {
        let coverages = self.coverages().await?;
        let coverage = select_coverage(&coverages, period, self.options.lookback_hours)?;
        debug!("period {period} served by coverage {}", coverage.id);

        let query = self.coverage_query(coverage, period);
        match self.http.get_bytes(&self.endpoint("GetCoverage"), &query).await? {
            Fetched::Found(bytes) => Ok(bytes),
            Fetched::NotFound => Err(RainfallError::unavailable(
                period,
                format!("coverage {} not found upstream", coverage.id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn coverage_query_targets_period_end() {
        let source = RemoteForecastSource::new(RemoteSourceOptions::default()).unwrap();
        let coverage = CoverageDescriptor {
            id: "TOTAL_PRECIPITATION__GROUND_OR_WATER_SURFACE___2026-01-13T00.00.00Z_PT3H".into(),
            published_at: Utc.with_ymd_and_hms(2026, 1, 13, 0, 0, 0).unwrap(),
            accumulation_span_hours: 3,
        };
        let period =
            AvailabilityPeriod::new(Utc.with_ymd_and_hms(2026, 1, 13, 6, 0, 0).unwrap(), 3).unwrap();

        let query = source.coverage_query(&coverage, &period);
        assert!(query.contains(&("coverageid", coverage.id.clone())));
        assert!(query.contains(&("subset", "time(2026-01-13T09:00:00Z)".to_string())));
        assert!(query.contains(&("subset", "lat(42.4,43.7)".to_string())));
        assert_eq!(query.iter().filter(|(k, _)| *k == "subset").count(), 3);
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let source = RemoteForecastSource::new(RemoteSourceOptions {
            base_url: "https://wcs.example.org/root/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(source.endpoint("GetCoverage"), "https://wcs.example.org/root/GetCoverage");
    }

    /// Needs network access and `HYDROCAST_WCS_API_KEY`.
    #[tokio::test]
    #[ignore]
    async fn live_capabilities() {
        let source = RemoteForecastSource::new(RemoteSourceOptions {
            api_key: std::env::var("HYDROCAST_WCS_API_KEY").ok(),
            ..Default::default()
        })
        .unwrap();
        let coverages = source.coverages().await.unwrap();
        assert!(!coverages.is_empty());
    }
}
