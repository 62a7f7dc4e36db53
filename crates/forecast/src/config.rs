//! Process configuration.
//!
//! Loaded from a JSON file; every field has a default, so `{}` is a valid
//! configuration.

use crate::baseline::BaselineParams;
use crate::error::{ForecastError, Result};
use crate::routing::RoutingParams;
use hydrocast_rainfall::{
    AnySource, BoundingBox, CacheOptions, LocalArchive, RemoteForecastSource, RemoteSourceOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    /// Travel-time GeoTIFF (seconds to the outlet)
    pub travel_time_path: PathBuf,
    pub rainfall: RainfallConfig,
    pub cache: CacheConfig,
    pub routing: RoutingConfig,
    pub baseline: BaselineConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            travel_time_path: PathBuf::from("data/travel_time.tif"),
            rainfall: RainfallConfig::default(),
            cache: CacheConfig::default(),
            routing: RoutingConfig::default(),
            baseline: BaselineConfig::default(),
        }
    }
}

/// Where rainfall comes from. A configured `remote` section takes
/// precedence over the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainfallConfig {
    pub archive_dir: PathBuf,
    pub remote: Option<RemoteConfig>,
}

impl Default for RainfallConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("data/comephores"),
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub coverage_prefix: String,
    pub bbox: BoundingBox,
    pub lookback_hours: u32,
    pub catalog_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let o = RemoteSourceOptions::default();
        Self {
            base_url: o.base_url,
            api_key: o.api_key,
            coverage_prefix: o.coverage_prefix,
            bbox: o.bbox,
            lookback_hours: o.lookback_hours,
            catalog_ttl_secs: o.catalog_ttl.as_secs(),
            request_timeout_secs: o.request_timeout.as_secs(),
            max_retries: o.max_retries,
        }
    }
}

impl RemoteConfig {
    pub fn options(&self) -> RemoteSourceOptions {
        RemoteSourceOptions {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            coverage_prefix: self.coverage_prefix.clone(),
            bbox: self.bbox,
            lookback_hours: self.lookback_hours,
            catalog_ttl: Duration::from_secs(self.catalog_ttl_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
        }
    }
}

impl RainfallConfig {
    /// Build the configured source
    pub fn source(&self) -> Result<AnySource> {
        match &self.remote {
            Some(remote) => Ok(AnySource::Remote(RemoteForecastSource::new(remote.options())?)),
            None => Ok(AnySource::Archive(LocalArchive::new(&self.archive_dir))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let o = CacheOptions::default();
        Self {
            dir: o.dir,
            ttl_secs: o.ttl.as_secs(),
            capacity: o.capacity,
        }
    }
}

impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            dir: self.dir.clone(),
            ttl: Duration::from_secs(self.ttl_secs),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub bin_hours: u32,
    pub horizon_hours: u32,
    pub max_concurrent_bins: usize,
    pub max_rainfall_mm: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let p = RoutingParams::default();
        Self {
            bin_hours: p.bin_hours,
            horizon_hours: p.horizon_hours,
            max_concurrent_bins: p.max_concurrent_bins,
            max_rainfall_mm: p.max_rainfall_mm,
        }
    }
}

impl RoutingConfig {
    pub fn params(&self) -> RoutingParams {
        RoutingParams {
            bin_hours: self.bin_hours,
            horizon_hours: self.horizon_hours,
            max_concurrent_bins: self.max_concurrent_bins,
            max_rainfall_mm: self.max_rainfall_mm,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub max_distance_km: f64,
    pub flow_divisor: f64,
    pub base_url: String,
    pub river: String,
    pub request_timeout_secs: u64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        let p = BaselineParams::default();
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
            max_distance_km: p.max_distance_km,
            flow_divisor: p.flow_divisor,
            base_url: crate::hydrometry::HubEauClient::DEFAULT_BASE_URL.into(),
            river: "La Garonne".into(),
            request_timeout_secs: 30,
        }
    }
}

impl BaselineConfig {
    pub fn params(&self) -> BaselineParams {
        BaselineParams {
            latitude: self.latitude,
            longitude: self.longitude,
            max_distance_km: self.max_distance_km,
            flow_divisor: self.flow_divisor,
        }
    }

    pub fn client(&self) -> Result<crate::hydrometry::HubEauClient> {
        crate::hydrometry::HubEauClient::new(
            self.base_url.clone(),
            self.river.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )
    }
}

impl ForecastConfig {
    /// Read a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForecastError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| match e {
            ForecastError::Config(msg) => ForecastError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| ForecastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.routing.bin_hours == 0 || self.routing.horizon_hours == 0 {
            return Err(ForecastError::Config(
                "routing.bin_hours and routing.horizon_hours must be positive".into(),
            ));
        }
        if self.routing.max_concurrent_bins == 0 {
            return Err(ForecastError::Config("routing.max_concurrent_bins must be positive".into()));
        }
        if !(self.baseline.flow_divisor > 0.0) {
            return Err(ForecastError::Config("baseline.flow_divisor must be positive".into()));
        }
        if self.cache.capacity == 0 {
            return Err(ForecastError::Config("cache.capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ForecastConfig::from_json("{}").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.routing.bin_hours, 3);
        assert_eq!(config.routing.horizon_hours, 24);
        assert_eq!(config.routing.max_rainfall_mm, 9000.0);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.baseline.flow_divisor, 12.0);
        assert_eq!(config.baseline.max_distance_km, 5.0);
        assert!(config.rainfall.remote.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ForecastConfig::from_json(
            r#"{
                "travel_time_path": "/srv/garonne/tt.tif",
                "routing": {"bin_hours": 1},
                "rainfall": {"remote": {"api_key": "secret", "lookback_hours": 6}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.routing.bin_hours, 1);
        assert_eq!(config.routing.horizon_hours, 24);

        let remote = config.rainfall.remote.as_ref().unwrap().options();
        assert_eq!(remote.api_key.as_deref(), Some("secret"));
        assert_eq!(remote.lookback_hours, 6);
        assert_eq!(remote.catalog_ttl, Duration::from_secs(3600));
        assert!(matches!(config.rainfall.source().unwrap(), AnySource::Remote(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ForecastConfig::from_json(r#"{"routing": {"bin_hours": 0}}"#).unwrap_err();
        assert!(matches!(err, ForecastError::Config(_)));
        assert!(ForecastConfig::from_json(r#"{"routing": {"bin_hours": "x"}}"#).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydrocast.json");
        std::fs::write(&path, r#"{"log_level": "debug"}"#).unwrap();
        assert_eq!(ForecastConfig::load(&path).unwrap().log_level, "debug");
        assert!(ForecastConfig::load(dir.path().join("missing.json")).is_err());
    }
}
