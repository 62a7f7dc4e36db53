//! Local archive of hourly rainfall reanalysis files.

use super::RainfallSource;
use crate::error::{RainfallError, Result};
use crate::period::AvailabilityPeriod;
use chrono::NaiveDateTime;
use hydrocast_core::io::{read_geotiff_from_buffer, write_geotiff_to_buffer};
use hydrocast_core::{Raster, RasterElement};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_SUFFIX: &str = "_ERR.gtif";
const FILE_TIME_FORMAT: &str = "%Y%m%d%H";

/// Directory of `%Y%m%d%H_ERR.gtif` files, one hour of accumulation each.
///
/// A one-hour period is served verbatim from its file. Longer periods are
/// the cell-wise sum of their consecutive hourly files, re-encoded as
/// GeoTIFF; every hour must be present and on the same grid.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name holding the hour starting at `period.start()`
    pub fn file_name(period: &AvailabilityPeriod) -> String {
        format!("{}{}", period.start().format(FILE_TIME_FORMAT), FILE_SUFFIX)
    }

    /// Parse an archive file name into its one-hour period
    pub fn parse_file_name(name: &str) -> Option<AvailabilityPeriod> {
        let stamp = name.strip_suffix(FILE_SUFFIX)?;
        if stamp.len() != 10 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // chrono needs minutes to build a time
        let naive = NaiveDateTime::parse_from_str(&format!("{stamp}00"), "%Y%m%d%H%M").ok()?;
        AvailabilityPeriod::hourly(naive.and_utc()).ok()
    }

    async fn read_hour(&self, hour: &AvailabilityPeriod) -> Result<Vec<u8>> {
        let path = self.root.join(Self::file_name(hour));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RainfallError::unavailable(
                hour,
                format!("{} not in archive", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Cell-wise sum of hourly rasters; nodata in any hour makes the cell NaN.
fn sum_hours(hours: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    let mut total: Option<Raster<f64>> = None;

    for bytes in hours {
        let raster: Raster<f64> = read_geotiff_from_buffer(&bytes)?;
        let nodata = raster.nodata();
        match total.as_mut() {
            None => {
                let mut first = raster.clone();
                first
                    .data_mut()
                    .mapv_inplace(|v| if v.is_nodata(nodata) { f64::NAN } else { v });
                first.set_nodata(Some(f64::NAN));
                total = Some(first);
            }
            Some(acc) => {
                acc.ensure_same_grid(&raster)?;
                ndarray::Zip::from(acc.data_mut())
                    .and(raster.data())
                    .for_each(|a, &v| {
                        *a = if v.is_nodata(nodata) { f64::NAN } else { *a + v };
                    });
            }
        }
    }

    let total = total.ok_or_else(|| RainfallError::InvalidPeriod("empty period".into()))?;
    Ok(write_geotiff_to_buffer(&total, None)?)
}

impl RainfallSource for LocalArchive {
    fn name(&self) -> &str {
        "local-archive"
    }

    async fn availability(&self) -> Result<Vec<AvailabilityPeriod>> {
        let mut periods = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(".gtif") {
                continue;
            }
            match Self::parse_file_name(name) {
                Some(period) => periods.push(period),
                None => warn!("archive file does not match the naming pattern: {name}"),
            }
        }

        periods.sort();
        debug!("{} hourly periods in {}", periods.len(), self.root.display());
        Ok(periods)
    }

    async fn fetch(&self, period: &AvailabilityPeriod) -> Result<Vec<u8>> {
        if period.span_hours() == 1 {
            return self.read_hour(period).await;
        }

        let mut hours = Vec::with_capacity(period.span_hours() as usize);
        for hour in period.hours() {
            hours.push(self.read_hour(&hour).await?);
        }
        debug!("summing {} hourly files for {period}", hours.len());

        tokio::task::spawn_blocking(move || sum_hours(hours))
            .await
            .map_err(|e| RainfallError::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hydrocast_core::{GeoTransform, CRS};

    fn hour_raster(value: f64) -> Vec<u8> {
        let mut r = Raster::filled(2, 2, value);
        r.set_transform(GeoTransform::new(0.0, 2000.0, 1000.0, -1000.0));
        r.set_crs(Some(CRS::lambert93()));
        write_geotiff_to_buffer(&r, None).unwrap()
    }

    fn at(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 13, h, 0, 0).unwrap()
    }

    #[test]
    fn file_names() {
        let p = AvailabilityPeriod::hourly(at(6)).unwrap();
        assert_eq!(LocalArchive::file_name(&p), "2026011306_ERR.gtif");
        assert_eq!(LocalArchive::parse_file_name("2026011306_ERR.gtif"), Some(p));
        assert_eq!(LocalArchive::parse_file_name("2026011306.gtif"), None);
        assert_eq!(LocalArchive::parse_file_name("20260113_ERR.gtif"), None);
        assert_eq!(LocalArchive::parse_file_name("2026011399_ERR.gtif"), None);
    }

    #[tokio::test]
    async fn availability_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2026011307_ERR.gtif"), hour_raster(1.0)).unwrap();
        std::fs::write(dir.path().join("2026011306_ERR.gtif"), hour_raster(1.0)).unwrap();
        std::fs::write(dir.path().join("readme.gtif"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let archive = LocalArchive::new(dir.path());
        let periods = archive.availability().await.unwrap();
        assert_eq!(
            periods,
            vec![
                AvailabilityPeriod::hourly(at(6)).unwrap(),
                AvailabilityPeriod::hourly(at(7)).unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn hourly_fetch_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = hour_raster(2.5);
        std::fs::write(dir.path().join("2026011306_ERR.gtif"), &bytes).unwrap();

        let archive = LocalArchive::new(dir.path());
        let got = archive
            .fetch(&AvailabilityPeriod::hourly(at(6)).unwrap())
            .await
            .unwrap();
        assert_eq!(got, bytes);

        let missing = archive.fetch(&AvailabilityPeriod::hourly(at(7)).unwrap()).await;
        assert!(matches!(missing, Err(RainfallError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn multi_hour_fetch_sums() {
        let dir = tempfile::tempdir().unwrap();
        for (h, v) in [(6, 1.0), (7, 2.0), (8, 4.0)] {
            std::fs::write(dir.path().join(format!("20260113{h:02}_ERR.gtif")), hour_raster(v)).unwrap();
        }

        let archive = LocalArchive::new(dir.path());
        let bytes = archive
            .fetch(&AvailabilityPeriod::new(at(6), 3).unwrap())
            .await
            .unwrap();
        let sum: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();
        assert!(sum.data().iter().all(|&v| v == 7.0));
        assert_eq!(sum.crs().and_then(CRS::epsg), Some(2154));

        let gap = archive.fetch(&AvailabilityPeriod::new(at(7), 3).unwrap()).await;
        assert!(matches!(gap, Err(RainfallError::DataUnavailable { .. })));
    }
}
