//! Rainfall sources.
//!
//! A source lists the periods it can serve and returns the GeoTIFF bytes
//! (depth in kg/m², i.e. mm) for one period.
//!
//! - [`LocalArchive`]: a directory of hourly reanalysis files
//! - [`RemoteForecastSource`]: a WCS 2.0 forecast service

mod local;
mod remote;

pub use local::LocalArchive;
pub use remote::{BoundingBox, RemoteForecastSource, RemoteSourceOptions};

use crate::error::Result;
use crate::period::AvailabilityPeriod;
use std::future::Future;

/// A provider of rainfall rasters keyed by period.
pub trait RainfallSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Periods this source can currently serve
    fn availability(&self) -> impl Future<Output = Result<Vec<AvailabilityPeriod>>> + Send;

    /// GeoTIFF bytes for `period`, or `DataUnavailable`
    fn fetch(&self, period: &AvailabilityPeriod) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

impl<S: RainfallSource> RainfallSource for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn availability(&self) -> impl Future<Output = Result<Vec<AvailabilityPeriod>>> + Send {
        (**self).availability()
    }

    fn fetch(&self, period: &AvailabilityPeriod) -> impl Future<Output = Result<Vec<u8>>> + Send {
        (**self).fetch(period)
    }
}

/// A source picked at runtime from configuration
pub enum AnySource {
    Archive(LocalArchive),
    Remote(RemoteForecastSource),
}

impl RainfallSource for AnySource {
    fn name(&self) -> &str {
        match self {
            Self::Archive(s) => s.name(),
            Self::Remote(s) => s.name(),
        }
    }

    async fn availability(&self) -> Result<Vec<AvailabilityPeriod>> {
        match self {
            Self::Archive(s) => s.availability().await,
            Self::Remote(s) => s.availability().await,
        }
    }

    async fn fetch(&self, period: &AvailabilityPeriod) -> Result<Vec<u8>> {
        match self {
            Self::Archive(s) => s.fetch(period).await,
            Self::Remote(s) => s.fetch(period).await,
        }
    }
}
