//! Error types for flow forecasting.

use hydrocast_rainfall::RainfallError;
use thiserror::Error;

/// Coarse classification callers use to decide between retrying,
/// aborting and degrading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rasters are not on the expected grid
    ShapeMismatch,
    /// Rainfall or discharge data does not exist for the request
    DataUnavailable,
    /// A raster holds physically implausible values
    SanityCheckFailed,
    /// An upstream service failed; a later attempt may succeed
    UpstreamFetch,
    /// The rainfall cache could not be written
    CacheWrite,
    /// The request or configuration is invalid
    InvalidInput,
    Internal,
}

/// Errors produced by the routing engine and the baseline corrector.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error(transparent)]
    Rainfall(#[from] RainfallError),

    #[error(transparent)]
    Raster(#[from] hydrocast_core::Error),

    #[error("hydrometry request failed: {0}")]
    Hydrometry(String),

    #[error("no discharge observation: {0}")]
    NoObservation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ForecastError {
    fn from(e: reqwest::Error) -> Self {
        ForecastError::Hydrometry(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ForecastError {
    fn from(e: tokio::task::JoinError) -> Self {
        ForecastError::Task(e.to_string())
    }
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rainfall(e) => match e {
                RainfallError::DataUnavailable { .. } => ErrorKind::DataUnavailable,
                RainfallError::InvalidPeriod(_) => ErrorKind::InvalidInput,
                RainfallError::Http(_) | RainfallError::UpstreamFetch(_) => ErrorKind::UpstreamFetch,
                RainfallError::CacheWrite { .. } => ErrorKind::CacheWrite,
                RainfallError::Core(core) => raster_kind(core),
                RainfallError::Io(_) => ErrorKind::Internal,
            },
            Self::Raster(e) => raster_kind(e),
            Self::Hydrometry(_) => ErrorKind::UpstreamFetch,
            Self::NoObservation(_) => ErrorKind::DataUnavailable,
            Self::InvalidInput(_) | Self::Config(_) => ErrorKind::InvalidInput,
            Self::Task(_) => ErrorKind::Internal,
        }
    }

    /// Only upstream transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamFetch
    }
}

fn raster_kind(e: &hydrocast_core::Error) -> ErrorKind {
    use hydrocast_core::Error as E;
    match e {
        E::ShapeMismatch { .. } | E::TransformMismatch(_) | E::CrsMismatch(..) => ErrorKind::ShapeMismatch,
        E::SanityCheckFailed { .. } => ErrorKind::SanityCheckFailed,
        E::InvalidDimensions { .. }
        | E::IndexOutOfBounds { .. }
        | E::UnsupportedCrs(_)
        | E::InvalidParameter { .. } => ErrorKind::InvalidInput,
        E::Io(_) | E::UnsupportedDataType(_) | E::Tiff(_) | E::Algorithm(_) | E::Other(_) => {
            ErrorKind::Internal
        }
    }
}

/// Result alias for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;
