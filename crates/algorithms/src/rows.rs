//! Row iteration for the per-pixel kernels.
//!
//! Every kernel in this crate walks a raster one row at a time and emits a
//! row's worth of output. [`par_rows`] yields the row indices as a rayon
//! parallel iterator when the `parallel` feature is on, and as a plain range
//! otherwise; the `map`/`flat_map`/`sum`/`collect` chains written against it
//! compile either way.

#[cfg(feature = "parallel")]
pub(crate) use rayon::prelude::*;

#[cfg(feature = "parallel")]
pub(crate) fn par_rows(rows: usize) -> rayon::range::Iter<usize> {
    (0..rows).into_par_iter()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn par_rows(rows: usize) -> std::ops::Range<usize> {
    0..rows
}
