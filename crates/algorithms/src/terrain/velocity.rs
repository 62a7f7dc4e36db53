//! Flow velocity and slowness from terrain
//!
//! Each pixel is classified as channel or hillslope from its upstream flow
//! accumulation, then given a Manning velocity computed from its slope:
//!
//! ```text
//! v = (1 / n) * R^(2/3) * sqrt(tan(slope))
//! ```
//!
//! The velocity is clipped to a per-regime range; pixels whose velocity is
//! undefined (NaN slope, negative tangent) fall back to a small constant
//! velocity. The routing surface is the slowness `1 / v` in seconds per metre.

use crate::rows::*;
use hydrocast_core::raster::Raster;
use hydrocast_core::{Algorithm, Error, RasterElement, Result};
use ndarray::Array2;

/// Flow regime of a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRegime {
    /// Concentrated flow in a stream channel
    Channel,
    /// Overland sheet flow
    Hillslope,
}

/// Parameters for the velocity field
#[derive(Debug, Clone)]
pub struct VelocityParams {
    /// Flow accumulation (upstream cells) at or above which a pixel is a channel
    pub channel_accumulation: f64,
    /// Manning roughness of channels
    pub channel_roughness: f64,
    /// Manning roughness of hillslopes
    pub hillslope_roughness: f64,
    /// Hydraulic radius of channels (m)
    pub channel_hydraulic_radius: f64,
    /// Flow depth used as hydraulic radius on hillslopes (m)
    pub hillslope_hydraulic_radius: f64,
    /// Velocity range for channels (m/s)
    pub channel_bounds: (f64, f64),
    /// Velocity range for hillslopes (m/s)
    pub hillslope_bounds: (f64, f64),
    /// Velocity given to pixels where it is undefined (m/s)
    pub fallback_velocity: f64,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            channel_accumulation: 100.0,
            channel_roughness: 0.1,
            hillslope_roughness: 0.12,
            channel_hydraulic_radius: 1.0,
            hillslope_hydraulic_radius: 0.02,
            channel_bounds: (0.2, 5.0),
            hillslope_bounds: (0.05, 0.2),
            fallback_velocity: 0.01,
        }
    }
}

impl VelocityParams {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("channel_roughness", self.channel_roughness),
            ("hillslope_roughness", self.hillslope_roughness),
            ("channel_hydraulic_radius", self.channel_hydraulic_radius),
            ("hillslope_hydraulic_radius", self.hillslope_hydraulic_radius),
            ("fallback_velocity", self.fallback_velocity),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "must be positive".into(),
                });
            }
        }

        for (name, (lo, hi)) in [
            ("channel_bounds", self.channel_bounds),
            ("hillslope_bounds", self.hillslope_bounds),
        ] {
            if !(lo > 0.0 && lo <= hi) {
                return Err(Error::InvalidParameter {
                    name,
                    value: format!("({lo}, {hi})"),
                    reason: "expected 0 < min <= max".into(),
                });
            }
        }
        Ok(())
    }

    /// Classify a pixel by its flow accumulation. NaN accumulation is hillslope.
    pub fn regime(&self, accumulation: f64) -> FlowRegime {
        if accumulation >= self.channel_accumulation {
            FlowRegime::Channel
        } else {
            FlowRegime::Hillslope
        }
    }

    /// Velocity (m/s) of one pixel given its slope in degrees
    pub fn velocity(&self, slope_degrees: f64, accumulation: f64) -> f64 {
        let slope_tan = slope_degrees.to_radians().tan();
        let (n, radius, (lo, hi)) = match self.regime(accumulation) {
            FlowRegime::Channel => (
                self.channel_roughness,
                self.channel_hydraulic_radius,
                self.channel_bounds,
            ),
            FlowRegime::Hillslope => (
                self.hillslope_roughness,
                self.hillslope_hydraulic_radius,
                self.hillslope_bounds,
            ),
        };

        // clamp keeps NaN, which is replaced afterwards
        let v = manning_velocity(n, radius, slope_tan).clamp(lo, hi);
        if v.is_nan() {
            self.fallback_velocity
        } else {
            v
        }
    }
}

/// Manning's equation: `(1 / n) * R^(2/3) * sqrt(slope_tan)`
pub fn manning_velocity(roughness: f64, hydraulic_radius: f64, slope_tan: f64) -> f64 {
    (1.0 / roughness) * hydraulic_radius.powf(2.0 / 3.0) * slope_tan.sqrt()
}

/// Slowness field algorithm.
///
/// Input is `(slope_degrees, flow_accumulation)`.
#[derive(Debug, Clone, Default)]
pub struct VelocityField;

impl Algorithm for VelocityField {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = Raster<f64>;
    type Params = VelocityParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "VelocityField"
    }

    fn description(&self) -> &'static str {
        "Per-pixel slowness (s/m) from slope and flow accumulation using Manning's equation"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (slope, accumulation) = input;
        slowness_field(&slope, &accumulation, params)
    }
}

/// Compute the velocity field (m/s).
///
/// # Arguments
/// * `slope` - Slope raster in degrees
/// * `accumulation` - Flow accumulation raster (upstream cell count) on the same grid
/// * `params` - Regime thresholds and hydraulic constants
///
/// # Returns
/// Velocity raster on the slope grid. Nodata slope cells get the fallback
/// velocity, like any other pixel whose velocity is undefined.
pub fn velocity_field(
    slope: &Raster<f64>,
    accumulation: &Raster<f64>,
    params: VelocityParams,
) -> Result<Raster<f64>> {
    params.validate()?;
    slope.ensure_same_grid(accumulation)?;

    let (rows, cols) = slope.shape();
    let slope_nodata = slope.nodata();
    let acc_nodata = accumulation.nodata();

    let output_data: Vec<f64> = par_rows(rows)
        .flat_map(|row| {
            let mut row_data = vec![0.0; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let mut s = unsafe { slope.get_unchecked(row, col) };
                let mut a = unsafe { accumulation.get_unchecked(row, col) };
                if s.is_nodata(slope_nodata) {
                    s = f64::NAN;
                }
                if a.is_nodata(acc_nodata) {
                    a = f64::NAN;
                }
                *out = params.velocity(s, a);
            }
            row_data
        })
        .collect();

    let mut output = slope.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Compute the slowness field `1 / v` (s/m) used as routing cost.
pub fn slowness_field(
    slope: &Raster<f64>,
    accumulation: &Raster<f64>,
    params: VelocityParams,
) -> Result<Raster<f64>> {
    let mut field = velocity_field(slope, accumulation, params)?;
    field.data_mut().mapv_inplace(|v| 1.0 / v);
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hydrocast_core::{GeoTransform, CRS};

    fn grid(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(500_000.0, 6_300_000.0, 25.0, -25.0));
        r.set_crs(Some(CRS::lambert93()));
        r
    }

    #[test]
    fn hillslope_five_degrees() {
        let slope = grid(1, 1, 5.0);
        let acc = grid(1, 1, 50.0);
        let slowness = slowness_field(&slope, &acc, VelocityParams::default()).unwrap();

        // (1/0.12) * 0.02^(2/3) * sqrt(tan 5deg) ~= 0.1816 m/s, inside [0.05, 0.2]
        let expected_v = (1.0 / 0.12) * 0.02_f64.powf(2.0 / 3.0) * 5.0_f64.to_radians().tan().sqrt();
        assert!(expected_v > 0.05 && expected_v < 0.2);
        assert_relative_eq!(slowness.get(0, 0).unwrap(), 1.0 / expected_v, epsilon = 1e-9);
        assert_relative_eq!(slowness.get(0, 0).unwrap(), 5.506, epsilon = 0.01);
    }

    #[test]
    fn channel_regime_at_threshold() {
        let params = VelocityParams::default();
        assert_eq!(params.regime(100.0), FlowRegime::Channel);
        assert_eq!(params.regime(99.9), FlowRegime::Hillslope);
        assert_eq!(params.regime(f64::NAN), FlowRegime::Hillslope);
    }

    #[test]
    fn velocities_stay_in_regime_bounds() {
        let params = VelocityParams::default();
        for slope in [0.01, 0.5, 2.0, 10.0, 30.0, 60.0, 89.0] {
            let hill = params.velocity(slope, 0.0);
            assert!((0.05..=0.2).contains(&hill), "hillslope {hill} at {slope}");
            let channel = params.velocity(slope, 5000.0);
            assert!((0.2..=5.0).contains(&channel), "channel {channel} at {slope}");
        }
    }

    #[test]
    fn flat_pixels_clip_to_lower_bound() {
        let params = VelocityParams::default();
        assert_relative_eq!(params.velocity(0.0, 0.0), 0.05);
        assert_relative_eq!(params.velocity(0.0, 1000.0), 0.2);
    }

    #[test]
    fn undefined_slope_falls_back() {
        let params = VelocityParams::default();
        assert_relative_eq!(params.velocity(f64::NAN, 0.0), 0.01);
        assert_relative_eq!(params.velocity(f64::NAN, 1000.0), 0.01);
        assert_relative_eq!(params.velocity(-3.0, 0.0), 0.01);
    }

    #[test]
    fn nodata_slope_gets_fallback_slowness() {
        let mut slope = grid(2, 2, 5.0);
        slope.set_nodata(Some(-9999.0));
        slope.set(1, 1, -9999.0).unwrap();
        let acc = grid(2, 2, 0.0);

        let slowness = slowness_field(&slope, &acc, VelocityParams::default()).unwrap();
        assert_relative_eq!(slowness.get(1, 1).unwrap(), 100.0);
        assert!(slowness.get(0, 0).unwrap() < 100.0);
    }

    #[test]
    fn output_keeps_slope_grid() {
        let slope = grid(3, 4, 10.0);
        let acc = grid(3, 4, 200.0);
        let v = velocity_field(&slope, &acc, VelocityParams::default()).unwrap();
        assert_eq!(v.shape(), (3, 4));
        assert_eq!(v.transform(), slope.transform());
        assert_eq!(v.crs(), slope.crs());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let slope = grid(3, 3, 5.0);
        let acc = grid(3, 4, 5.0);
        let err = velocity_field(&slope, &acc, VelocityParams::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn shifted_grid_is_rejected() {
        let slope = grid(3, 3, 5.0);
        let mut acc = grid(3, 3, 5.0);
        acc.set_transform(GeoTransform::new(500_025.0, 6_300_000.0, 25.0, -25.0));
        let err = velocity_field(&slope, &acc, VelocityParams::default()).unwrap_err();
        assert!(matches!(err, Error::TransformMismatch(_)));
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let params = VelocityParams {
            hillslope_bounds: (0.3, 0.1),
            ..Default::default()
        };
        let slope = grid(1, 1, 5.0);
        let err = velocity_field(&slope, &slope.clone(), params).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "hillslope_bounds", .. }));
    }

    #[test]
    fn algorithm_trait() {
        let algo = VelocityField;
        assert_eq!(algo.name(), "VelocityField");
        let out = algo
            .execute_default((grid(2, 2, 5.0), grid(2, 2, 500.0)))
            .unwrap();
        assert!(out.data().iter().all(|&s| (0.2..=5.0).contains(&(1.0 / s))));
    }
}
