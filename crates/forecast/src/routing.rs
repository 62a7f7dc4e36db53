//! Flow routing engine
//!
//! Routes rainfall to the outlet through isochrone bins. For an arrival time
//! `T` and a bin `[b, b+Δh)` of travel time, the rain that matters fell in
//! the window ending `b` hours before `T`; its volume over the bin's pixels
//! arrives at the outlet during that bin.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use hydrocast_algorithms::hydrology::{
    bin_cell_count, bin_volume, bin_wet_cell_count, time_bins, TimeBin, TravelTimeRaster,
};
use hydrocast_algorithms::resample::{align_to, check_value_bounds, pixel_area_m2, AlignParams};
use hydrocast_core::io::read_geotiff_from_buffer;
use hydrocast_rainfall::{AvailabilityPeriod, RainfallCache, RainfallError, RainfallSource};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Routing parameters
#[derive(Debug, Clone, Copy)]
pub struct RoutingParams {
    /// Width of each travel-time bin, hours
    pub bin_hours: u32,
    /// Travel times beyond this are ignored, hours
    pub horizon_hours: u32,
    /// Bins fetched and integrated at the same time
    pub max_concurrent_bins: usize,
    /// Upper sanity bound for aligned rainfall depth, mm
    pub max_rainfall_mm: f64,
    pub align: AlignParams,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            bin_hours: 3,
            horizon_hours: 24,
            max_concurrent_bins: 4,
            max_rainfall_mm: 9000.0,
            align: AlignParams::default(),
        }
    }
}

/// Volume routed through one bin
#[derive(Debug, Clone, Serialize)]
pub struct BinEstimate {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Rainfall window feeding this bin
    pub period: AvailabilityPeriod,
    /// Watershed pixels in the bin
    pub cells: usize,
    pub volume_m3: f64,
}

/// Routed flow for one arrival time
#[derive(Debug, Clone, Serialize)]
pub struct FlowEstimate {
    pub arrival: DateTime<Utc>,
    pub bins: Vec<BinEstimate>,
    pub total_volume_m3: f64,
    /// `total_volume_m3 / bin_hours`. This average-rate approximation has
    /// not been validated against gauged hydrographs.
    pub rate_m3h: f64,
}

/// Truncate a timestamp to the start of its hour
pub fn truncate_to_hour(time: DateTime<Utc>) -> Result<DateTime<Utc>> {
    time.duration_trunc(Duration::hours(1))
        .map_err(|e| ForecastError::InvalidInput(format!("cannot truncate {time} to the hour: {e}")))
}

/// Routes cached rainfall through a travel-time raster.
pub struct FlowRouter<S> {
    cache: Arc<RainfallCache<S>>,
    travel_time: Arc<TravelTimeRaster>,
    pixel_area: f64,
    bins: Vec<TimeBin>,
    params: RoutingParams,
}

impl<S: RainfallSource + 'static> FlowRouter<S> {
    pub fn new(
        cache: Arc<RainfallCache<S>>,
        travel_time: Arc<TravelTimeRaster>,
        params: RoutingParams,
    ) -> Result<Self> {
        let bins = time_bins(params.bin_hours, params.horizon_hours)?;
        if params.max_concurrent_bins == 0 {
            return Err(ForecastError::InvalidInput(
                "max_concurrent_bins must be at least 1".into(),
            ));
        }
        if !(params.max_rainfall_mm > 0.0) {
            return Err(ForecastError::InvalidInput(format!(
                "max_rainfall_mm must be positive, got {}",
                params.max_rainfall_mm
            )));
        }
        let pixel_area = pixel_area_m2(travel_time.raster());
        if !(pixel_area > 0.0) {
            return Err(ForecastError::InvalidInput(
                "travel-time raster has no pixel area".into(),
            ));
        }

        Ok(Self {
            cache,
            travel_time,
            pixel_area,
            bins,
            params,
        })
    }

    pub fn params(&self) -> &RoutingParams {
        &self.params
    }

    pub fn bins(&self) -> &[TimeBin] {
        &self.bins
    }

    pub fn pixel_area(&self) -> f64 {
        self.pixel_area
    }

    pub fn cache(&self) -> &RainfallCache<S> {
        &self.cache
    }

    /// Rainfall windows needed for `arrival`, one per bin.
    ///
    /// Fails when `arrival` is not on an hour boundary.
    pub fn periods(&self, arrival: DateTime<Utc>) -> Result<Vec<(TimeBin, AvailabilityPeriod)>> {
        self.bins
            .iter()
            .map(|&bin| {
                let end = arrival
                    .checked_sub_signed(Duration::hours(i64::from(bin.start_hour)))
                    .ok_or_else(|| {
                        ForecastError::InvalidInput(format!("{bin} before {arrival} is out of range"))
                    })?;
                let period = AvailabilityPeriod::ending_at(end, bin.width_hours())?;
                Ok((bin, period))
            })
            .collect()
    }

    /// Routed flow arriving at the outlet at `arrival`.
    ///
    /// Any failing bin aborts the estimate; bins still in flight are dropped.
    pub async fn estimate(&self, arrival: DateTime<Utc>) -> Result<FlowEstimate> {
        let start = Instant::now();
        let jobs = self.periods(arrival)?;
        debug!(
            "Routing {} bins of {}h for arrival {}",
            jobs.len(),
            self.params.bin_hours,
            arrival
        );

        let bins: Vec<BinEstimate> = stream::iter(jobs)
            .map(|(bin, period)| self.route_bin(bin, period))
            .buffered(self.params.max_concurrent_bins)
            .try_collect()
            .await?;

        let total_volume_m3: f64 = bins.iter().map(|b| b.volume_m3).sum();
        let rate_m3h = total_volume_m3 / f64::from(self.params.bin_hours);
        info!(
            "Routed {:.1} m3 for {} ({:.1} m3/h) in {:.2?}",
            total_volume_m3,
            arrival,
            rate_m3h,
            start.elapsed()
        );

        Ok(FlowEstimate {
            arrival,
            bins,
            total_volume_m3,
            rate_m3h,
        })
    }

    async fn route_bin(&self, bin: TimeBin, period: AvailabilityPeriod) -> Result<BinEstimate> {
        let bytes = self.cache.get(&period).await?;

        let travel_time = Arc::clone(&self.travel_time);
        let pixel_area = self.pixel_area;
        let params = self.params;
        let (cells, volume_m3) = tokio::task::spawn_blocking(move || -> Result<(usize, f64)> {
            let rain = read_geotiff_from_buffer::<f64>(&bytes)?;
            let aligned = align_to(&rain, travel_time.raster(), params.align)?;
            check_value_bounds(&aligned, 0.0, params.max_rainfall_mm)?;

            let cells = bin_cell_count(travel_time.raster(), bin);
            if cells > 0 && bin_wet_cell_count(travel_time.raster(), &aligned, bin)? == 0 {
                return Err(RainfallError::DataUnavailable {
                    period: period.to_string(),
                    reason: format!("rainfall field does not cover any of the {cells} cells in {bin}"),
                }
                .into());
            }
            let volume = bin_volume(travel_time.raster(), &aligned, bin, pixel_area)?;
            Ok((cells, volume))
        })
        .await??;

        debug!("Bin {} <- {}: {} cells, {:.1} m3", bin, period, cells, volume_m3);
        Ok(BinEstimate {
            start_hour: bin.start_hour,
            end_hour: bin.end_hour,
            period,
            cells,
            volume_m3,
        })
    }
}
