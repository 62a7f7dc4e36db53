//! # Hydrocast Rainfall
//!
//! Acquisition of rainfall rasters for the routing pipeline.
//!
//! Rainfall is requested by [`AvailabilityPeriod`]: an hour-aligned start and
//! a whole number of hours of accumulation. A [`RainfallSource`] serves the
//! GeoTIFF bytes for a period, either from a local archive of hourly
//! reanalyses or from a remote WCS forecast service (choosing the coverage
//! through [`select_coverage`]). [`RainfallCache`] keeps fetched rasters on
//! disk with a TTL and a capacity bound.

pub mod cache;
pub mod coverage;
pub mod error;
pub mod http;
pub mod period;
pub mod source;

pub use cache::{CacheEntry, CacheOptions, RainfallCache};
pub use coverage::{select_coverage, CoverageCatalog, CoverageDescriptor};
pub use error::{RainfallError, Result};
pub use period::AvailabilityPeriod;
pub use source::{
    AnySource, BoundingBox, LocalArchive, RainfallSource, RemoteForecastSource, RemoteSourceOptions,
};
