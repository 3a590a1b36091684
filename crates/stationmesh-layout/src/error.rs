//! Error types for stationmesh-layout.

use thiserror::Error;

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Errors raised when building layout inputs.
///
/// The solver itself never fails; it always returns a best-effort layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// Distance readings must be finite and non-negative.
    #[error("invalid distance {value} reported for {target}")]
    InvalidDistance { target: String, value: f64 },

    /// Variance readings must be finite and non-negative.
    #[error("invalid variance {value} reported for {target}")]
    InvalidVariance { target: String, value: f64 },

    /// A reading named no neighbor.
    #[error("reading has an empty neighbor id")]
    EmptyNeighbor,
}
