//! Local archive served through the disk cache.

use chrono::{TimeZone, Utc};
use hydrocast_core::io::{read_geotiff_from_buffer, write_geotiff_to_buffer};
use hydrocast_core::{GeoTransform, Raster, CRS};
use hydrocast_rainfall::{AvailabilityPeriod, CacheOptions, LocalArchive, RainfallCache, RainfallError};

fn write_hour(dir: &std::path::Path, hour: u32, mm: f64) {
    let mut r = Raster::filled(3, 3, mm);
    r.set_transform(GeoTransform::new(570_000.0, 6_280_000.0, 1000.0, -1000.0));
    r.set_crs(Some(CRS::lambert93()));
    let bytes = write_geotiff_to_buffer(&r, None).unwrap();
    std::fs::write(dir.join(format!("20260113{hour:02}_ERR.gtif")), bytes).unwrap();
}

#[tokio::test]
async fn cached_archive_roundtrip() {
    let archive_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    for hour in 3..9 {
        write_hour(archive_dir.path(), hour, 0.5);
    }

    let cache = RainfallCache::new(
        LocalArchive::new(archive_dir.path()),
        CacheOptions {
            dir: cache_dir.path().to_path_buf(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(cache.availability().await.unwrap().len(), 6);

    let start = Utc.with_ymd_and_hms(2026, 1, 13, 3, 0, 0).unwrap();
    let bytes = cache.get_at(start, 3).await.unwrap();
    let rain: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();
    assert!(rain.data().iter().all(|&v| (v - 1.5).abs() < 1e-6));

    let entries = cache.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "20260113T03Z_PT3H");

    // a cache hit does not need the archive any more
    for entry in std::fs::read_dir(archive_dir.path()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
    assert_eq!(cache.get_at(start, 3).await.unwrap(), bytes);

    let other = AvailabilityPeriod::new(start, 1).unwrap();
    assert!(matches!(
        cache.get(&other).await,
        Err(RainfallError::DataUnavailable { .. })
    ));
}
