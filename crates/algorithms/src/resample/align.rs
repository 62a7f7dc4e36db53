//! Area-weighted alignment of a raster onto a template grid
//!
//! Each destination cell receives the average of the source cells it
//! overlaps, weighted by overlap area. Values are treated as intensive
//! quantities (depths, rates), so the total over the grid is not conserved
//! when cell sizes differ.

use crate::rows::*;
use hydrocast_core::raster::{GeoTransform, Raster};
use hydrocast_core::{Error, Projection, RasterElement, Result};
use ndarray::Array2;

/// Parameters for raster alignment
#[derive(Debug, Clone, Copy)]
pub struct AlignParams {
    /// Sample points per axis and destination cell when the source is in a
    /// different CRS (total samples = n²)
    pub samples_per_axis: usize,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self { samples_per_axis: 4 }
    }
}

/// Resample `source` onto the grid of `template`.
///
/// The output takes the template's shape, transform and CRS. Nodata/NaN
/// source cells are excluded from the average; a destination cell with no
/// valid overlap is NaN.
///
/// When both rasters share a CRS (or either CRS is unknown, in which case
/// they are assumed to match) and neither grid is rotated, the exact
/// rectangle-overlap area is used as weight. Otherwise every destination
/// cell is supersampled on a regular `n x n` pattern and the sample points
/// are projected into the source CRS.
pub fn align_to<U: RasterElement>(
    source: &Raster<f64>,
    template: &Raster<U>,
    params: AlignParams,
) -> Result<Raster<f64>> {
    if source.is_empty() {
        return Err(Error::InvalidDimensions {
            width: source.cols(),
            height: source.rows(),
        });
    }

    let same_crs = match (source.crs(), template.crs()) {
        (Some(a), Some(b)) => a.is_equivalent(b),
        _ => true,
    };
    let axis_aligned =
        source.transform().is_axis_aligned() && template.transform().is_axis_aligned();

    let data = if same_crs && axis_aligned {
        overlap_average(source, template)
    } else {
        if params.samples_per_axis == 0 {
            return Err(Error::InvalidParameter {
                name: "samples_per_axis",
                value: "0".into(),
                reason: "at least one sample per axis is required".into(),
            });
        }
        let sampler = Sampler::new(source, template, params.samples_per_axis)?;
        sampler.run(source, template)
    };

    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Extent `(min_x, max_x, min_y, max_y)` of one cell
fn cell_extent(gt: &GeoTransform, col: usize, row: usize) -> (f64, f64, f64, f64) {
    let (ax, ay) = gt.point_at(col as f64, row as f64);
    let (bx, by) = gt.point_at(col as f64 + 1.0, row as f64 + 1.0);
    (ax.min(bx), ax.max(bx), ay.min(by), ay.max(by))
}

/// Integer index range `[lo, hi)` covering fractional pixel positions `a..b`
fn index_range(a: f64, b: f64, len: usize) -> Option<(usize, usize)> {
    if a.is_nan() || b.is_nan() {
        return None;
    }
    let lo = a.min(b).floor().clamp(0.0, len as f64) as usize;
    let hi = a.max(b).ceil().clamp(0.0, len as f64) as usize;
    (lo < hi).then_some((lo, hi))
}

fn overlap_average<U: RasterElement>(source: &Raster<f64>, template: &Raster<U>) -> Vec<f64> {
    let (rows, cols) = template.shape();
    let (src_rows, src_cols) = source.shape();
    let src_gt = source.transform();
    let dst_gt = template.transform();
    let nodata = source.nodata();

    par_rows(rows)
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x0, x1, y0, y1) = cell_extent(dst_gt, col, row);

                let (c_a, r_a) = src_gt.geo_to_pixel(x0, y1);
                let (c_b, r_b) = src_gt.geo_to_pixel(x1, y0);
                let (Some((c_lo, c_hi)), Some((r_lo, r_hi))) =
                    (index_range(c_a, c_b, src_cols), index_range(r_a, r_b, src_rows))
                else {
                    continue;
                };

                let mut weighted = 0.0;
                let mut weight = 0.0;
                for sr in r_lo..r_hi {
                    for sc in c_lo..c_hi {
                        let v = unsafe { source.get_unchecked(sr, sc) };
                        if v.is_nodata(nodata) {
                            continue;
                        }
                        let (sx0, sx1, sy0, sy1) = cell_extent(src_gt, sc, sr);
                        let ox = x1.min(sx1) - x0.max(sx0);
                        let oy = y1.min(sy1) - y0.max(sy0);
                        if ox <= 0.0 || oy <= 0.0 {
                            continue;
                        }
                        weighted += v * ox * oy;
                        weight += ox * oy;
                    }
                }

                if weight > 0.0 {
                    *out = weighted / weight;
                }
            }
            row_data
        })
        .collect()
}

/// Supersampling resampler for grids in different CRSs
struct Sampler {
    from: Projection,
    to: Projection,
    offsets: Vec<f64>,
}

impl Sampler {
    fn new<U: RasterElement>(source: &Raster<f64>, template: &Raster<U>, n: usize) -> Result<Self> {
        let from = match template.crs() {
            Some(crs) => Projection::from_crs(crs)?,
            None => Projection::Geographic,
        };
        let to = match source.crs() {
            Some(crs) => Projection::from_crs(crs)?,
            None => from,
        };
        let offsets = (0..n).map(|i| (i as f64 + 0.5) / n as f64).collect();
        Ok(Self { from, to, offsets })
    }

    fn run<U: RasterElement>(&self, source: &Raster<f64>, template: &Raster<U>) -> Vec<f64> {
        let (rows, cols) = template.shape();
        let (src_rows, src_cols) = source.shape();
        let src_gt = source.transform();
        let dst_gt = template.transform();
        let nodata = source.nodata();

        par_rows(rows)
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    let mut sum = 0.0;
                    let mut hits = 0usize;
                    for &dy in &self.offsets {
                        for &dx in &self.offsets {
                            let (x, y) = dst_gt.point_at(col as f64 + dx, row as f64 + dy);
                            let (sx, sy) = self.from.transform_to(&self.to, x, y);
                            let (fc, fr) = src_gt.geo_to_pixel(sx, sy);
                            if !(fc >= 0.0 && fr >= 0.0) {
                                continue;
                            }
                            let (sc, sr) = (fc.floor() as usize, fr.floor() as usize);
                            if sc >= src_cols || sr >= src_rows {
                                continue;
                            }
                            let v = unsafe { source.get_unchecked(sr, sc) };
                            if v.is_nodata(nodata) {
                                continue;
                            }
                            sum += v;
                            hits += 1;
                        }
                    }
                    if hits > 0 {
                        *out = sum / hits as f64;
                    }
                }
                row_data
            })
            .collect()
    }
}

/// Fail when any valid cell lies outside `[min, max]`.
pub fn check_value_bounds(raster: &Raster<f64>, min: f64, max: f64) -> Result<()> {
    let nodata = raster.nodata();
    let mut count = 0usize;
    let mut worst = f64::NAN;
    let mut worst_excess = 0.0;

    for &v in raster.data().iter().filter(|v| !v.is_nodata(nodata)) {
        let excess = if v < min {
            min - v
        } else if v > max {
            v - max
        } else {
            continue;
        };
        count += 1;
        if excess > worst_excess {
            worst_excess = excess;
            worst = v;
        }
    }

    if count > 0 {
        return Err(Error::SanityCheckFailed {
            min,
            max,
            worst,
            count,
        });
    }
    Ok(())
}

/// Pixel area in square metres.
///
/// The raster must be in a projected, metre-based CRS; this is not checked.
pub fn pixel_area_m2<T: RasterElement>(raster: &Raster<T>) -> f64 {
    raster.pixel_area()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hydrocast_core::CRS;

    fn raster(values: Vec<f64>, rows: usize, cols: usize, gt: GeoTransform) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(gt);
        r.set_crs(Some(CRS::lambert93()));
        r
    }

    #[test]
    fn identical_grid_is_identity() {
        let gt = GeoTransform::new(0.0, 20.0, 10.0, -10.0);
        let src = raster(vec![1.0, 2.0, 3.0, 4.0], 2, 2, gt);
        let out = align_to(&src, &src, AlignParams::default()).unwrap();
        assert_eq!(out.data(), src.data());
        assert_eq!(out.transform(), src.transform());
    }

    #[test]
    fn coarse_to_fine_replicates() {
        let src = raster(vec![5.0, 7.0], 1, 2, GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        let template = raster(vec![0.0; 8], 2, 4, GeoTransform::new(0.0, 10.0, 5.0, -5.0));
        let out = align_to(&src, &template, AlignParams::default()).unwrap();

        for row in 0..2 {
            assert_relative_eq!(out.get(row, 0).unwrap(), 5.0);
            assert_relative_eq!(out.get(row, 1).unwrap(), 5.0);
            assert_relative_eq!(out.get(row, 2).unwrap(), 7.0);
            assert_relative_eq!(out.get(row, 3).unwrap(), 7.0);
        }
    }

    #[test]
    fn fine_to_coarse_averages_by_area() {
        let src = raster(
            vec![1.0, 2.0, 3.0, 4.0],
            2,
            2,
            GeoTransform::new(0.0, 10.0, 5.0, -5.0),
        );
        let template = raster(vec![0.0], 1, 1, GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        let out = align_to(&src, &template, AlignParams::default()).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 2.5);
    }

    #[test]
    fn partial_overlap_weights_by_area() {
        // destination cell spans 3/4 of the left source cell and 1/4 of the right one
        let src = raster(vec![0.0, 8.0], 1, 2, GeoTransform::new(0.0, 4.0, 4.0, -4.0));
        let template = raster(vec![0.0], 1, 1, GeoTransform::new(1.0, 4.0, 4.0, -4.0));
        let out = align_to(&src, &template, AlignParams::default()).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn nodata_is_excluded_and_uncovered_is_nan() {
        let mut src = raster(
            vec![1.0, -1.0, 3.0, f64::NAN],
            2,
            2,
            GeoTransform::new(0.0, 10.0, 5.0, -5.0),
        );
        src.set_nodata(Some(-1.0));
        let template = raster(vec![0.0; 2], 1, 2, GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        let out = align_to(&src, &template, AlignParams::default()).unwrap();

        assert_relative_eq!(out.get(0, 0).unwrap(), 2.0);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_eq!(out.crs(), template.crs());
    }

    #[test]
    fn geographic_source_onto_lambert_grid() {
        // uniform 2 mm over a box around Toulouse
        let mut src = Raster::filled(20, 20, 2.0);
        src.set_transform(GeoTransform::new(1.0, 44.0, 0.05, -0.05));
        src.set_crs(Some(CRS::wgs84()));

        let (x, y) = Projection::Lambert93.forward(1.44, 43.6);
        let template = raster(vec![0.0; 9], 3, 3, GeoTransform::new(x, y, 1000.0, -1000.0));

        let out = align_to(&src, &template, AlignParams::default()).unwrap();
        for &v in out.data().iter() {
            assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn unsupported_crs_is_reported() {
        let mut src = Raster::filled(2, 2, 1.0);
        src.set_crs(Some(CRS::from_epsg(3857)));
        let template = raster(vec![0.0; 4], 2, 2, GeoTransform::default());
        let err = align_to(&src, &template, AlignParams::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCrs(_)));
    }

    #[test]
    fn bounds_check_reports_worst_offender() {
        let gt = GeoTransform::default();
        let ok = raster(vec![0.0, 10.0, 9000.0, f64::NAN], 2, 2, gt);
        assert!(check_value_bounds(&ok, 0.0, 9000.0).is_ok());

        let bad = raster(vec![-0.5, 12000.0, 9500.0, 3.0], 2, 2, gt);
        match check_value_bounds(&bad, 0.0, 9000.0) {
            Err(Error::SanityCheckFailed { count, worst, .. }) => {
                assert_eq!(count, 3);
                assert_eq!(worst, 12000.0);
            }
            other => panic!("expected sanity failure, got {other:?}"),
        }
    }

    #[test]
    fn pixel_area_of_kilometre_grid() {
        let r = raster(vec![0.0], 1, 1, GeoTransform::new(0.0, 0.0, 1000.0, -1000.0));
        assert_relative_eq!(pixel_area_m2(&r), 1_000_000.0);
    }
}
