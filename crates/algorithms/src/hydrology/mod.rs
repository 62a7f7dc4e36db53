//! Hydrological routing
//!
//! - Travel time: Dijkstra accumulation of slowness from the outlet
//! - Isochrones: travel-time bins and per-bin rainfall volume

mod isochrone;
mod travel_time;

pub use isochrone::{bin_cell_count, bin_volume, bin_wet_cell_count, time_bins, TimeBin};
pub use travel_time::{travel_time, TravelTime, TravelTimeParams, TravelTimeRaster};
