//! Error types for the occupancy pipeline

use thiserror::Error;

/// Result type alias for the occupancy library
pub type Result<T> = std::result::Result<T, OccupancyError>;

/// Errors that can occur while counting, persisting or querying occupancy
#[derive(Error, Debug)]
pub enum OccupancyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config file parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("Invalid timestamp {value:?}: {reason}")]
    TimestampError { value: String, reason: String },

    #[error("Tracking error: {0:#}")]
    TrackingError(#[from] anyhow::Error),

    #[error("Snapshot worker panicked")]
    WorkerPanicked,
}

impl OccupancyError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn timestamp<V: Into<String>, R: ToString>(value: V, reason: R) -> Self {
        Self::TimestampError {
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Unwrap an error that travelled through the tracking layer, keeping
    /// the variant it started as when it was an `OccupancyError`
    pub fn from_tracking(err: anyhow::Error) -> Self {
        match err.downcast::<OccupancyError>() {
            Ok(inner) => inner,
            Err(other) => Self::TrackingError(other),
        }
    }

    /// True for failures of the storage layer, which a caller may retry
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::IoError(_))
    }
}
