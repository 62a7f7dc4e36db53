//! On-disk cache of rainfall rasters in front of a [`RainfallSource`].
//!
//! Entries are `<period key>.tiff` files in one directory. An entry is
//! served while younger than the TTL; after every fill the oldest entries
//! (by modification time) are evicted down to the capacity. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! failed or interrupted write never leaves a readable entry behind.

use crate::error::{RainfallError, Result};
use crate::period::AvailabilityPeriod;
use crate::source::RainfallSource;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info};

const ENTRY_EXTENSION: &str = "tiff";

/// Cache settings
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub dir: PathBuf,
    /// Maximum age of a servable entry (default 1 h)
    pub ttl: Duration,
    /// Maximum number of entries kept after a fill (default 50)
    pub capacity: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("hydrocast-rainfall"),
            ttl: Duration::from_secs(3600),
            capacity: 50,
        }
    }
}

/// One cached raster
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl CacheEntry {
    pub fn modified_utc(&self) -> DateTime<Utc> {
        self.modified.into()
    }
}

/// Rainfall cache service.
///
/// All lookups and fills are serialized by one mutex, so concurrent
/// requests for the same period reach the source once.
pub struct RainfallCache<S> {
    source: S,
    options: CacheOptions,
    lock: Mutex<()>,
}

impl<S: RainfallSource> RainfallCache<S> {
    /// Create the cache, making its directory if needed
    pub async fn new(source: S, options: CacheOptions) -> Result<Self> {
        tokio::fs::create_dir_all(&options.dir).await?;
        Ok(Self {
            source,
            options,
            lock: Mutex::new(()),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.options.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Periods the underlying source can serve
    pub async fn availability(&self) -> Result<Vec<AvailabilityPeriod>> {
        self.source.availability().await
    }

    /// Validate `start`/`span_hours` as a period, then [`get`](Self::get) it.
    pub async fn get_at(&self, start: DateTime<Utc>, span_hours: u32) -> Result<Vec<u8>> {
        let period = AvailabilityPeriod::new(start, span_hours)?;
        self.get(&period).await
    }

    /// Rainfall bytes for `period`, from disk if fresh, else from the source.
    pub async fn get(&self, period: &AvailabilityPeriod) -> Result<Vec<u8>> {
        let key = period.key();
        let path = self.entry_path(&key);
        let _guard = self.lock.lock().await;

        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                let age = meta
                    .modified()?
                    .elapsed()
                    .unwrap_or(Duration::ZERO);
                if age < self.options.ttl {
                    debug!("cache hit {key} (age {}s)", age.as_secs());
                    return Ok(tokio::fs::read(&path).await?);
                }
                debug!("cache entry {key} expired (age {}s)", age.as_secs());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cache miss {key}");
            }
            Err(e) => return Err(e.into()),
        }

        let bytes = self.source.fetch(period).await?;
        self.store(key, bytes).await
    }

    /// Persist a fetched payload, then evict down to capacity.
    ///
    /// Both steps run in one blocking task: once handed off they complete
    /// even if the calling future is dropped.
    async fn store(&self, key: String, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let dir = self.options.dir.clone();
        let path = self.entry_path(&key);
        let capacity = self.options.capacity;

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            write_atomically(&dir, &path, &bytes)
                .map_err(|source| RainfallError::CacheWrite { key, source })?;
            evict(&dir, capacity)?;
            Ok(bytes)
        })
        .await
        .map_err(|e| RainfallError::Io(std::io::Error::other(e)))?
    }

    /// Entries, oldest first
    async fn list(&self) -> Result<Vec<CacheEntry>> {
        let dir = self.options.dir.clone();
        let entries = tokio::task::spawn_blocking(move || scan(&dir))
            .await
            .map_err(|e| RainfallError::Io(std::io::Error::other(e)))??;
        Ok(entries)
    }

    /// Current entries, oldest first
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.list().await
    }

    /// Remove every entry; returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let entries = self.list().await?;
        for entry in &entries {
            tokio::fs::remove_file(&entry.path).await?;
        }
        Ok(entries.len())
    }
}

/// Cache entries in `dir`, oldest first
fn scan(dir: &Path) -> std::io::Result<Vec<CacheEntry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let meta = item.metadata()?;
        if !meta.is_file() {
            continue;
        }
        entries.push(CacheEntry {
            key,
            modified: meta.modified()?,
            size: meta.len(),
            path,
        });
    }

    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
    Ok(entries)
}

/// Remove the oldest entries until at most `capacity` remain
fn evict(dir: &Path, capacity: usize) -> std::io::Result<()> {
    let entries = scan(dir)?;
    let excess = entries.len().saturating_sub(capacity);
    for entry in entries.into_iter().take(excess) {
        match std::fs::remove_file(&entry.path) {
            Ok(()) => info!("evicted cache entry {}", entry.key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
