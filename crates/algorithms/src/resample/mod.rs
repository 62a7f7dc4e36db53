//! Resampling between grids

mod align;

pub use align::{align_to, check_value_bounds, pixel_area_m2, AlignParams};
