//! Error type shared by the conditioning and detection stages.

use thiserror::Error;

/// Errors surfaced by the blink pipeline.
///
/// Only configuration problems are errors. Empty input and flat segments are
/// valid degenerate cases and produce empty results instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectError {
    /// A parameter is outside its valid range; reported before any processing.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl DetectError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DetectError::InvalidConfiguration(message.into())
    }
}

/// Reject a non-finite or non-positive sampling rate.
pub(crate) fn check_sampling_rate(fs: f64) -> Result<(), DetectError> {
    if !fs.is_finite() || fs <= 0.0 {
        return Err(DetectError::invalid(format!(
            "sampling rate must be positive, got {fs}"
        )));
    }
    Ok(())
}
