//! Pure-Rust map projections between WGS84 and the projected grids used by
//! the watershed pipeline (Snyder 1987, USGS Prof. Paper 1395).
//!
//! Covers EPSG 326xx/327xx (UTM) and EPSG:2154 (Lambert-93). No libproj,
//! so it also builds for targets without a C toolchain.

use super::{CRS, EPSG_LAMBERT_93, EPSG_WGS84};
use crate::error::{Error, Result};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

// ── Ellipsoids ───────────────────────────────────────────────────────────

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const GRS80_F: f64 = 1.0 / 298.257_222_101;

const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

// Lambert-93: two standard parallels 49°N and 44°N, origin 46.5°N 3°E
const L93_LAT1: f64 = 49.0;
const L93_LAT2: f64 = 44.0;
const L93_LAT0: f64 = 46.5;
const L93_LON0: f64 = 3.0;
const L93_FALSE_EASTING: f64 = 700_000.0;
const L93_FALSE_NORTHING: f64 = 6_600_000.0;

/// A map projection that can convert to and from WGS84 longitude/latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// WGS84 longitude/latitude in degrees
    Geographic,
    /// Universal Transverse Mercator on WGS84
    Utm { zone: u32, north: bool },
    /// RGF93 / Lambert-93 conformal conic on GRS80
    Lambert93,
}

impl Projection {
    /// Resolve the projection for a CRS.
    pub fn from_crs(crs: &CRS) -> Result<Self> {
        let epsg = crs
            .epsg()
            .ok_or_else(|| Error::UnsupportedCrs(crs.identifier()))?;
        Self::from_epsg(epsg)
    }

    /// Resolve the projection for an EPSG code.
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        match epsg {
            EPSG_WGS84 => Ok(Self::Geographic),
            EPSG_LAMBERT_93 => Ok(Self::Lambert93),
            _ => parse_utm_epsg(epsg)
                .map(|(zone, north)| Self::Utm { zone, north })
                .ok_or_else(|| Error::UnsupportedCrs(format!("EPSG:{}", epsg))),
        }
    }

    /// Project WGS84 `(lon, lat)` degrees into this projection's `(x, y)`.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (lon, lat),
            Self::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
            Self::Lambert93 => Lcc::lambert93().forward(lon, lat),
        }
    }

    /// Unproject `(x, y)` in this projection back to WGS84 `(lon, lat)`.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (x, y),
            Self::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
            Self::Lambert93 => Lcc::lambert93().inverse(x, y),
        }
    }

    /// Convert a point from `self` into `target`.
    pub fn transform_to(&self, target: &Projection, x: f64, y: f64) -> (f64, f64) {
        if self == target {
            return (x, y);
        }
        let (lon, lat) = self.inverse(x, y);
        target.forward(lon, lat)
    }
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

fn eccentricity_squared(f: f64) -> f64 {
    2.0 * f - f * f
}

// ── Transverse Mercator (Snyder pp. 61-64) ───────────────────────────────

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared(WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let (sin_lat, cos_lat, tan_lat) = (lat.sin(), lat.cos(), lat.tan());

    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ep2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - central_meridian(zone));
    let m = meridional_arc(lat, e2);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = UTM_K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a4 * a / 120.0)
        + UTM_FALSE_EASTING;

    let northing = UTM_K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + UTM_FALSE_NORTHING_SOUTH)
    }
}

fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared(WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };

    let m = y / UTM_K0;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sq = (1.0 - e2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
    let c1 = ep2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let w = 1.0 - e2 * sin1 * sin1;
    let n1 = WGS84_A / w.sqrt();
    let r1 = WGS84_A * (1.0 - e2) / w.powf(1.5);
    let d = x / (n1 * UTM_K0);
    let d2 = d * d;

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d2 * d2 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d2.powi(3)
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d2
                * d2
                * d
                / 120.0)
            / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians), Snyder eq. 3-21.
fn meridional_arc(lat: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

// ── Lambert conformal conic, two standard parallels (Snyder pp. 104-110) ─

struct Lcc {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl Lcc {
    fn lambert93() -> Self {
        let a = WGS84_A;
        let e = eccentricity_squared(GRS80_F).sqrt();
        let (lat1, lat2, lat0) = (
            L93_LAT1.to_radians(),
            L93_LAT2.to_radians(),
            L93_LAT0.to_radians(),
        );

        let m = |phi: f64| phi.cos() / (1.0 - e * e * phi.sin().powi(2)).sqrt();
        let t = |phi: f64| lcc_t(phi, e);

        let n = (m(lat1).ln() - m(lat2).ln()) / (t(lat1).ln() - t(lat2).ln());
        let f = m(lat1) / (n * t(lat1).powf(n));
        let af = a * f;

        Self {
            e,
            n,
            af,
            rho0: af * t(lat0).powf(n),
            lon0: L93_LON0.to_radians(),
            false_easting: L93_FALSE_EASTING,
            false_northing: L93_FALSE_NORTHING,
        }
    }

    fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let rho = self.af * lcc_t(lat_deg.to_radians(), self.e).powf(self.n);
        let theta = self.n * (lon_deg.to_radians() - self.lon0);
        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + self.rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);
        let rho = self.n.signum() * (dx * dx + dy * dy).sqrt();
        let theta = (self.n.signum() * dx).atan2(self.n.signum() * dy);
        let t = (rho / self.af).powf(1.0 / self.n);

        // Fixed-point iteration on the conformal latitude (Snyder eq. 7-9)
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = self.e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            if (next - phi).abs() < 1e-12 {
                phi = next;
                break;
            }
            phi = next;
        }

        let lon = theta / self.n + self.lon0;
        (lon.to_degrees(), phi.to_degrees())
    }
}

fn lcc_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds {tol}");
    }

    #[test]
    fn parse_utm_codes() {
        assert_eq!(parse_utm_epsg(32631), Some((31, true)));
        assert_eq!(parse_utm_epsg(32721), Some((21, false)));
        assert_eq!(parse_utm_epsg(32600), None);
        assert_eq!(parse_utm_epsg(2154), None);
    }

    #[test]
    fn unsupported_crs_is_rejected() {
        assert!(matches!(
            Projection::from_epsg(3857),
            Err(Error::UnsupportedCrs(_))
        ));
        assert!(Projection::from_crs(&CRS::from_wkt("LOCAL_CS[]")).is_err());
    }

    // Reference: pyproj, EPSG:4326 -> EPSG:32630, (-3.7037, 40.4168)
    #[test]
    fn madrid_utm30n_forward_and_back() {
        let utm = Projection::from_epsg(32630).unwrap();
        let (e, n) = utm.forward(-3.7037, 40.4168);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");

        let (lon, lat) = utm.inverse(e, n);
        assert_close(lon, -3.7037, 1e-5, "lon");
        assert_close(lat, 40.4168, 1e-5, "lat");
    }

    #[test]
    fn southern_utm_roundtrip() {
        let utm = Projection::Utm { zone: 21, north: false };
        let (e, n) = utm.forward(-58.3816, -34.6037);
        assert_close(e, 373_317.50, 1.0, "easting");
        assert_close(n, 6_170_036.17, 1.0, "northing");
        let (lon, lat) = utm.inverse(e, n);
        assert_close(lon, -58.3816, 1e-5, "lon");
        assert_close(lat, -34.6037, 1e-5, "lat");
    }

    #[test]
    fn lambert93_origin_maps_to_false_origin() {
        let (x, y) = Projection::Lambert93.forward(3.0, 46.5);
        assert_close(x, 700_000.0, 1e-3, "x");
        assert_close(y, 6_600_000.0, 1e-3, "y");
    }

    #[test]
    fn lambert93_toulouse_roundtrip() {
        let (x, y) = Projection::Lambert93.forward(1.411743, 43.520681);
        // Toulouse sits south-west of the projection origin
        assert!(x < 700_000.0 && x > 500_000.0, "x = {x}");
        assert!(y < 6_600_000.0 && y > 6_200_000.0, "y = {y}");

        let (lon, lat) = Projection::Lambert93.inverse(x, y);
        assert_close(lon, 1.411743, 1e-8, "lon");
        assert_close(lat, 43.520681, 1e-8, "lat");
    }

    #[test]
    fn transform_between_projected_grids() {
        let l93 = Projection::Lambert93;
        let utm = Projection::Utm { zone: 31, north: true };
        let (x, y) = l93.forward(1.5, 43.6);
        let (e, n) = l93.transform_to(&utm, x, y);
        let (e_direct, n_direct) = utm.forward(1.5, 43.6);
        assert_close(e, e_direct, 1e-3, "easting");
        assert_close(n, n_direct, 1e-3, "northing");
    }
}
