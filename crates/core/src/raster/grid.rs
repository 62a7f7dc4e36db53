//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// Tolerance, in map units, when comparing the geotransforms of two grids.
const GRID_TOLERANCE: f64 = 1e-6;

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform, CRS and no-data marker). Terrain inputs,
/// rainfall fields and the travel-time surface are all carried as rasters.
///
/// # Example
///
/// ```ignore
/// use hydrocast_core::Raster;
///
/// let mut rain: Raster<f64> = Raster::filled(3, 3, 2.5);
/// rain.set(1, 1, 4.0)?;
/// assert_eq!(rain.get(1, 1)?, 4.0);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster on the same grid (transform and CRS) with a different
    /// cell type, filled with zeros and without a no-data marker.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Area of one cell in squared map units, `|pixel_width * pixel_height|`.
    ///
    /// Only meaningful for projected, metre-based CRSs; for geographic
    /// rasters the result is in squared degrees. The CRS is not inspected.
    pub fn pixel_area(&self) -> f64 {
        (self.transform.pixel_width * self.transform.pixel_height).abs()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Check that `other` lies on exactly the same grid as `self`:
    /// same shape, same geotransform and, when both are known, the same CRS.
    pub fn ensure_same_grid<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        let (er, ec) = self.shape();
        let (ar, ac) = other.shape();
        if (er, ec) != (ar, ac) {
            return Err(Error::ShapeMismatch { er, ec, ar, ac });
        }
        if let (Some(a), Some(b)) = (self.crs(), other.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
            }
        }
        if !self.transform.approx_eq(other.transform(), GRID_TOLERANCE) {
            return Err(Error::TransformMismatch(format!(
                "{:?} vs {:?}",
                self.transform.to_gdal(),
                other.transform().to_gdal()
            )));
        }
        Ok(())
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    // Statistics

    /// Calculate basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter().filter(|&&v| !self.is_nodata(v)) {
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            sum,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub sum: f64,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_statistics_skip_nodata() {
        let mut raster: Raster<f64> = Raster::filled(2, 2, 3.0);
        raster.set(0, 0, f64::NAN).unwrap();
        raster.set(1, 1, -9999.0).unwrap();
        raster.set_nodata(Some(-9999.0));

        let stats = raster.statistics();
        assert_eq!(stats.valid_count, 2);
        assert_eq!(stats.nodata_count, 2);
        assert_eq!(stats.sum, 6.0);
        assert_eq!(stats.mean, Some(3.0));
    }

    #[test]
    fn test_pixel_area_uses_both_axes() {
        let mut raster: Raster<f64> = Raster::new(2, 2);
        raster.set_transform(GeoTransform::new(0.0, 0.0, 25.0, -40.0));
        assert_eq!(raster.pixel_area(), 1000.0);
    }

    #[test]
    fn test_same_grid_detects_mismatch() {
        let a: Raster<f64> = Raster::new(3, 3);
        let b: Raster<f64> = Raster::new(3, 4);
        assert!(matches!(a.ensure_same_grid(&b), Err(Error::ShapeMismatch { .. })));

        let mut c: Raster<f64> = Raster::new(3, 3);
        c.set_transform(GeoTransform::new(10.0, 0.0, 1.0, -1.0));
        assert!(matches!(a.ensure_same_grid(&c), Err(Error::TransformMismatch(_))));

        let mut d: Raster<f64> = Raster::new(3, 3);
        let mut e: Raster<f64> = Raster::new(3, 3);
        d.set_crs(Some(CRS::lambert93()));
        e.set_crs(Some(CRS::wgs84()));
        assert!(matches!(d.ensure_same_grid(&e), Err(Error::CrsMismatch(..))));
        // an unknown CRS is assumed to match
        assert!(d.ensure_same_grid(&a).is_ok());

        assert!(a.ensure_same_grid(&Raster::<u8>::new(3, 3)).is_ok());
    }
}
