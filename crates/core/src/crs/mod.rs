//! Coordinate Reference System handling

mod projection;

pub use projection::Projection;

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of RGF93 / Lambert-93, the national grid used for French
/// rainfall reanalyses.
pub const EPSG_LAMBERT_93: u32 = 2154;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(EPSG_WGS84)
    }

    /// RGF93 / Lambert-93 (EPSG:2154)
    pub fn lambert93() -> Self {
        Self::from_epsg(EPSG_LAMBERT_93)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Whether coordinates are angular (degrees) rather than metres.
    ///
    /// Only recognises EPSG:4326; unknown CRSs report `false`.
    pub fn is_geographic(&self) -> bool {
        self.epsg == Some(EPSG_WGS84)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // WKT comparison is textual and therefore conservative
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(2154);
        assert_eq!(crs.epsg(), Some(2154));
        assert_eq!(crs.identifier(), "EPSG:2154");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn test_crs_equivalence() {
        assert!(CRS::from_epsg(4326).is_equivalent(&CRS::wgs84()));
        assert!(!CRS::lambert93().is_equivalent(&CRS::wgs84()));
        assert!(!CRS::from_wkt("LOCAL_CS[\"x\"]").is_equivalent(&CRS::wgs84()));
    }
}
