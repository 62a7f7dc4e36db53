//! Error types for rainfall acquisition.

use thiserror::Error;

/// Errors produced while acquiring or caching rainfall rasters.
#[derive(Error, Debug)]
pub enum RainfallError {
    /// No rainfall exists for the requested period (missing file, no
    /// matching coverage, upstream 404).
    #[error("rainfall unavailable for {period}: {reason}")]
    DataUnavailable { period: String, reason: String },

    #[error("invalid availability period: {0}")]
    InvalidPeriod(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("cache write failed for {key}: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] hydrocast_core::Error),
}

impl RainfallError {
    pub(crate) fn unavailable(period: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            period: period.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a later attempt may succeed (transport problems only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::UpstreamFetch(_))
    }
}

/// Result alias for rainfall operations.
pub type Result<T> = std::result::Result<T, RainfallError>;
