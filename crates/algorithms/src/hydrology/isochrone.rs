//! Isochrone binning and rainfall volume integration
//!
//! The watershed is split into bands of equal travel time. Rain that fell
//! on a band reaches the outlet within the band's time window, so the
//! volume of water arriving in that window is the rainfall depth summed
//! over the band's pixels.

use crate::rows::*;
use hydrocast_core::raster::Raster;
use hydrocast_core::{Error, RasterElement, Result};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Half-open travel-time window `[start_hour, end_hour)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBin {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeBin {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        if end_hour <= start_hour {
            return Err(Error::InvalidParameter {
                name: "time_bin",
                value: format!("[{start_hour}, {end_hour})"),
                reason: "end must be after start".into(),
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn width_hours(&self) -> u32 {
        self.end_hour - self.start_hour
    }

    /// Whether a travel time in seconds falls in the window. NaN never does.
    pub fn contains_seconds(&self, seconds: f64) -> bool {
        seconds >= self.start_hour as f64 * SECONDS_PER_HOUR
            && seconds < self.end_hour as f64 * SECONDS_PER_HOUR
    }
}

impl std::fmt::Display for TimeBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}h, {}h)", self.start_hour, self.end_hour)
    }
}

/// Partition `[0, horizon)` into consecutive bins of `bin_hours`.
///
/// When the horizon is not a multiple of the width, the last bin runs past
/// the horizon rather than being shortened.
pub fn time_bins(bin_hours: u32, horizon_hours: u32) -> Result<Vec<TimeBin>> {
    if bin_hours == 0 {
        return Err(Error::InvalidParameter {
            name: "bin_hours",
            value: "0".into(),
            reason: "bin width must be at least one hour".into(),
        });
    }
    if horizon_hours == 0 {
        return Err(Error::InvalidParameter {
            name: "horizon_hours",
            value: "0".into(),
            reason: "horizon must be at least one hour".into(),
        });
    }

    (0..horizon_hours)
        .step_by(bin_hours as usize)
        .map(|start| {
            let end_hour = start.checked_add(bin_hours).ok_or_else(|| Error::InvalidParameter {
                name: "bin_hours",
                value: bin_hours.to_string(),
                reason: format!("bin starting at {start}h ends past u32::MAX hours"),
            })?;
            Ok(TimeBin {
                start_hour: start,
                end_hour,
            })
        })
        .collect()
}

/// Volume of rain (m³) over the pixels whose travel time falls in `bin`.
///
/// `rain_mm` must be aligned onto the travel-time grid. Depth is converted
/// from millimetres to metres and multiplied by `pixel_area` (m²). Pixels
/// whose rain or travel time is NaN/nodata contribute nothing.
pub fn bin_volume(
    travel_time: &Raster<f64>,
    rain_mm: &Raster<f64>,
    bin: TimeBin,
    pixel_area: f64,
) -> Result<f64> {
    travel_time.ensure_same_grid(rain_mm)?;

    let (rows, cols) = travel_time.shape();
    let tt_nodata = travel_time.nodata();
    let rain_nodata = rain_mm.nodata();

    let depth_sum: f64 = par_rows(rows)
        .map(|row| {
            let mut sum = 0.0;
            for col in 0..cols {
                let tt = unsafe { travel_time.get_unchecked(row, col) };
                if tt.is_nodata(tt_nodata) || !bin.contains_seconds(tt) {
                    continue;
                }
                let rain = unsafe { rain_mm.get_unchecked(row, col) };
                if rain.is_nodata(rain_nodata) {
                    continue;
                }
                sum += rain;
            }
            sum
        })
        .sum();

    Ok(depth_sum * 0.001 * pixel_area)
}

/// Count of pixels in `bin` that have a valid rain value.
///
/// Zero while [`bin_cell_count`] is not means the rain field does not
/// cover that part of the watershed.
pub fn bin_wet_cell_count(travel_time: &Raster<f64>, rain_mm: &Raster<f64>, bin: TimeBin) -> Result<usize> {
    travel_time.ensure_same_grid(rain_mm)?;

    let tt_nodata = travel_time.nodata();
    let rain_nodata = rain_mm.nodata();
    Ok(travel_time
        .data()
        .iter()
        .zip(rain_mm.data().iter())
        .filter(|&(&tt, &rain)| {
            !tt.is_nodata(tt_nodata) && bin.contains_seconds(tt) && !rain.is_nodata(rain_nodata)
        })
        .count())
}

/// Count of pixels whose travel time falls in `bin`
pub fn bin_cell_count(travel_time: &Raster<f64>, bin: TimeBin) -> usize {
    let nodata = travel_time.nodata();
    travel_time
        .data()
        .iter()
        .filter(|&&tt| !tt.is_nodata(nodata) && bin.contains_seconds(tt))
        .count()
}
