//! Adaptive eye-blink detection for single-channel EEG.
//!
//! A series is optionally conditioned (zero-phase low-pass, smoothing,
//! optional RMS envelope), split into fixed windows, thresholded per window
//! from robust statistics and scanned for supra-threshold peaks with a
//! refractory gap enforced across window boundaries.

pub mod conditioning;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod threshold;

pub use detectors::*;
pub use error::DetectError;
pub use metrics::*;
pub use pipeline::{
    load_config, run_blink_pipeline, run_prominence_pipeline, BlinkPipelineResult, PipelineConfig,
    ProminencePipelineResult,
};
pub use signal::*;
pub use threshold::{ThresholdEstimator, ThresholdStrategy};
