//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Terrain, rainfall and travel-time rasters are floating point; integer
/// cells appear when reading flow-accumulation or class rasters straight
/// from disk.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }
        }
    )*};
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() <= <$t>::EPSILON * 100.0 * nd.abs().max(1.0),
                    None => false,
                }
            }
        }
    )*};
}

impl_raster_element_int!(u8, u16, u32, i16, i32);
impl_raster_element_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(f32::NAN.is_nodata(Some(0.0)));
    }

    #[test]
    fn float_nodata_matches_large_markers() {
        assert!(65535.0f64.is_nodata(Some(65535.0)));
        assert!(!65534.0f64.is_nodata(Some(65535.0)));
        assert!(!0.0f64.is_nodata(None));
    }

    #[test]
    fn int_nodata_is_exact() {
        assert!(255u8.is_nodata(Some(255)));
        assert!(!254u8.is_nodata(Some(255)));
    }
}
