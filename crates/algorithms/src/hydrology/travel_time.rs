//! Travel time to the watershed outlet
//!
//! Accumulates slowness (s/m) times path length (m) from the outlet across
//! the grid with Dijkstra's algorithm on 8-connected cells, giving the
//! fastest downslope travel time of every pixel in seconds.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use hydrocast_core::io::read_geotiff;
use hydrocast_core::raster::Raster;
use hydrocast_core::{Algorithm, Error, RasterElement, Result};
use ndarray::Array2;

/// Parameters for travel time
#[derive(Debug, Clone, Default)]
pub struct TravelTimeParams {
    /// Outlet cell as (row, col)
    pub outlet: (usize, usize),
}

/// State in the priority queue (min-heap via Reverse ordering).
#[derive(Debug, Clone, PartialEq)]
struct State {
    cost: f64,
    row: usize,
    col: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

/// 8-connected neighbor offsets
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Travel-time algorithm over a slowness raster
#[derive(Debug, Clone, Default)]
pub struct TravelTime;

impl Algorithm for TravelTime {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = TravelTimeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "TravelTime"
    }

    fn description(&self) -> &'static str {
        "Fastest travel time (s) from every pixel to the outlet across a slowness surface"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        travel_time(&input, params)
    }
}

/// Compute travel time (s) from every cell to the outlet.
///
/// The cost of a step between two neighbours is the mean of their slowness
/// values times the step length in map units (cell width, cell height or
/// the diagonal).
///
/// # Arguments
/// * `slowness` - Slowness raster (s/m) on a metre-based grid.
///   NaN or nodata cells are impassable.
/// * `params` - Outlet location
///
/// # Returns
/// Travel-time raster in seconds. The outlet is 0, unreachable cells are NaN.
pub fn travel_time(slowness: &Raster<f64>, params: TravelTimeParams) -> Result<Raster<f64>> {
    let (rows, cols) = slowness.shape();
    let (out_row, out_col) = params.outlet;
    if out_row >= rows || out_col >= cols {
        return Err(Error::IndexOutOfBounds {
            row: out_row,
            col: out_col,
            rows,
            cols,
        });
    }

    let nodata = slowness.nodata();
    let cost_at = |r: usize, c: usize| -> Option<f64> {
        let v = unsafe { slowness.get_unchecked(r, c) };
        if v.is_nodata(nodata) || v < 0.0 {
            None
        } else {
            Some(v)
        }
    };

    if cost_at(out_row, out_col).is_none() {
        return Err(Error::Algorithm(format!(
            "outlet ({out_row}, {out_col}) lies on an impassable cell"
        )));
    }

    let gt = slowness.transform();
    let dx = gt.pixel_width.abs();
    let dy = gt.pixel_height.abs();
    let diagonal = dx.hypot(dy);
    let step_length = |dr: isize, dc: isize| match (dr != 0, dc != 0) {
        (true, true) => diagonal,
        (true, false) => dy,
        _ => dx,
    };

    let mut dist = vec![f64::INFINITY; rows * cols];
    let mut heap = BinaryHeap::new();
    dist[out_row * cols + out_col] = 0.0;
    heap.push(State {
        cost: 0.0,
        row: out_row,
        col: out_col,
    });

    while let Some(State { cost, row, col }) = heap.pop() {
        // Skip if we already found a better path
        if cost > dist[row * cols + col] {
            continue;
        }
        let Some(cost_here) = cost_at(row, col) else {
            continue;
        };

        for &(dr, dc) in &NEIGHBORS {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);

            let Some(cost_neighbor) = cost_at(nr, nc) else {
                continue; // Impassable
            };

            let new_cost = cost + (cost_here + cost_neighbor) / 2.0 * step_length(dr, dc);
            if new_cost < dist[nr * cols + nc] {
                dist[nr * cols + nc] = new_cost;
                heap.push(State {
                    cost: new_cost,
                    row: nr,
                    col: nc,
                });
            }
        }
    }

    for d in &mut dist {
        if d.is_infinite() {
            *d = f64::NAN;
        }
    }

    let mut output = slowness.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), dist).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// A validated travel-time surface: seconds to the outlet, `>= 0` or NaN
/// outside the watershed.
///
/// Built once at startup and shared read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct TravelTimeRaster {
    raster: Raster<f64>,
}

impl TravelTimeRaster {
    /// Validate a raster as travel time. Nodata cells become NaN; any
    /// negative value is rejected.
    pub fn new(mut raster: Raster<f64>) -> Result<Self> {
        let nodata = raster.nodata();
        let mut negatives = 0usize;
        let mut worst = 0.0_f64;

        raster.data_mut().mapv_inplace(|v| {
            if v.is_nodata(nodata) {
                f64::NAN
            } else {
                if v < 0.0 {
                    negatives += 1;
                    worst = worst.min(v);
                }
                v
            }
        });

        if negatives > 0 {
            return Err(Error::InvalidParameter {
                name: "travel_time",
                value: worst.to_string(),
                reason: format!("{negatives} cell(s) hold a negative travel time"),
            });
        }

        raster.set_nodata(Some(f64::NAN));
        Ok(Self { raster })
    }

    /// Read and validate a travel-time GeoTIFF
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(read_geotiff(path)?)
    }

    /// The underlying raster
    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    /// Largest travel time in seconds, `None` if every cell is outside the watershed
    pub fn max_seconds(&self) -> Option<f64> {
        self.raster
            .data()
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<f64>, &v| Some(acc.map_or(v, |m| m.max(v))))
    }

    /// Number of pixels inside the watershed
    pub fn watershed_cells(&self) -> usize {
        self.raster.data().iter().filter(|v| !v.is_nan()).count()
    }
}
