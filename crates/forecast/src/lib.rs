//! # Hydrocast Forecast
//!
//! Near-term discharge prediction at a watershed outlet.
//!
//! A [`FlowRouter`] integrates cached rainfall over the isochrone bins of a
//! travel-time raster; a [`BaselineCorrector`] anchors the routed rate to the
//! latest gauged discharge from a [`DischargeSource`] such as
//! [`HubEauClient`].
//!
//! ```no_run
//! use hydrocast_forecast::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> hydrocast_forecast::Result<()> {
//! let config = ForecastConfig::load("hydrocast.json")?;
//! let cache = RainfallCache::new(config.rainfall.source()?, config.cache.options()).await?;
//! let travel_time = TravelTimeRaster::from_file(&config.travel_time_path)?;
//! let router = FlowRouter::new(Arc::new(cache), Arc::new(travel_time), config.routing.params())?;
//! let corrector = BaselineCorrector::new(router, config.baseline.client()?, config.baseline.params())?;
//!
//! let arrival = truncate_to_hour(chrono::Utc::now())?;
//! let prediction = corrector.predict(arrival).await?;
//! println!("{:.2} m3/s", prediction.flow_m3s());
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod config;
pub mod error;
pub mod hydrometry;
pub mod routing;

pub use baseline::{Baseline, BaselineCorrector, BaselineParams, Prediction};
pub use config::ForecastConfig;
pub use error::{ErrorKind, ForecastError, Result};
pub use hydrometry::{DischargeSource, HubEauClient, Observation, SiteInfo};
pub use routing::{truncate_to_hour, BinEstimate, FlowEstimate, FlowRouter, RoutingParams};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::baseline::{BaselineCorrector, BaselineParams, Prediction};
    pub use crate::config::ForecastConfig;
    pub use crate::error::{ErrorKind, ForecastError, Result};
    pub use crate::hydrometry::{DischargeSource, HubEauClient};
    pub use crate::routing::{truncate_to_hour, FlowEstimate, FlowRouter, RoutingParams};
    pub use hydrocast_algorithms::hydrology::TravelTimeRaster;
    pub use hydrocast_rainfall::{AvailabilityPeriod, RainfallCache, RainfallSource};
}
