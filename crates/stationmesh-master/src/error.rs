//! Error types for the station master.

use stationmesh_layout::LayoutError;
use thiserror::Error;

/// Result type for master operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in master operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Outbound transport refused a message
    #[error("Publish error: {0}")]
    Publish(String),

    /// Bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an inbound message was dropped.
///
/// Decode failures never mutate coordinator state.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Topic does not belong to any inbound channel.
    #[error("unrecognised topic: {0}")]
    UnknownTopic(String),

    /// Payload is not valid JSON or misses a required field.
    #[error("malformed payload on {topic}: {source}")]
    Malformed {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Payload names an empty station.
    #[error("empty station id on {0}")]
    EmptyStation(String),

    /// A neighbor reading failed validation.
    #[error("invalid reading from {station}: {source}")]
    InvalidReading {
        station: String,
        #[source]
        source: LayoutError,
    },

    /// Version report carried an empty version.
    #[error("empty version reported by {0}")]
    EmptyVersion(String),
}
