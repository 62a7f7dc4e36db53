//! # Hydrocast Algorithms
//!
//! Raster algorithms behind the rainfall-runoff routing pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **terrain**: Manning velocity and slowness fields from slope and flow accumulation
//! - **hydrology**: Travel time to the outlet, isochrone binning and volume integration
//! - **resample**: Area-weighted alignment of one raster onto another raster's grid

pub(crate) mod rows;

pub mod hydrology;
pub mod resample;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        bin_volume, time_bins, travel_time, TimeBin, TravelTime, TravelTimeParams,
        TravelTimeRaster,
    };
    pub use crate::resample::{align_to, check_value_bounds, AlignParams};
    pub use crate::terrain::{slowness_field, velocity_field, FlowRegime, VelocityField, VelocityParams};
    pub use hydrocast_core::prelude::*;
}
