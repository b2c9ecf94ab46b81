//! Per-window detection thresholds.
//!
//! The default strategy is median + k·MAD: blinks are a minority of extreme
//! samples and barely move the median or the MAD, whereas they inflate the
//! mean and standard deviation they are measured against.

use crate::error::DetectError;
use serde::{Deserialize, Serialize};

/// Scale that turns a MAD into a standard-deviation estimate under normality.
pub const MAD_SCALE: f64 = 1.4826;

/// Anything that can turn a segment and a multiplier into one threshold.
pub trait ThresholdEstimator {
    fn estimate(&self, segment: &[f64], multiplier: f64) -> f64;
}

impl<F> ThresholdEstimator for F
where
    F: Fn(&[f64], f64) -> f64,
{
    fn estimate(&self, segment: &[f64], multiplier: f64) -> f64 {
        self(segment, multiplier)
    }
}

/// Interchangeable threshold formulas, selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdStrategy {
    /// median + multiplier · 1.4826 · MAD
    #[default]
    RobustMad,
    /// mean + multiplier · std over samples inside the [trim, 1 - trim] percentiles
    TrimmedMeanStd {
        #[serde(default = "default_trim")]
        trim: f64,
    },
    /// mean + multiplier · std
    MeanStd,
    /// The q-quantile of the segment; the multiplier is ignored.
    Quantile {
        #[serde(default = "default_quantile")]
        q: f64,
    },
}

pub const DEFAULT_TRIM: f64 = 0.1;
pub const DEFAULT_QUANTILE: f64 = 0.95;

fn default_trim() -> f64 {
    DEFAULT_TRIM
}

fn default_quantile() -> f64 {
    DEFAULT_QUANTILE
}

impl ThresholdStrategy {
    pub fn validate(&self) -> Result<(), DetectError> {
        match *self {
            ThresholdStrategy::TrimmedMeanStd { trim } if !(0.0..0.5).contains(&trim) => Err(
                DetectError::invalid(format!("trim fraction must lie in [0, 0.5), got {trim}")),
            ),
            ThresholdStrategy::Quantile { q } if !(0.0..=1.0).contains(&q) => Err(
                DetectError::invalid(format!("quantile must lie in [0, 1], got {q}")),
            ),
            _ => Ok(()),
        }
    }
}

impl ThresholdEstimator for ThresholdStrategy {
    fn estimate(&self, segment: &[f64], multiplier: f64) -> f64 {
        match *self {
            ThresholdStrategy::RobustMad => robust_threshold(segment, multiplier),
            ThresholdStrategy::TrimmedMeanStd { trim } => {
                trimmed_threshold(segment, multiplier, trim)
            }
            ThresholdStrategy::MeanStd => {
                let (mean, sd) = mean_std(segment);
                mean + multiplier * sd
            }
            ThresholdStrategy::Quantile { q } => quantile(segment, q),
        }
    }
}

/// median + multiplier · scaled MAD.
pub fn robust_threshold(segment: &[f64], multiplier: f64) -> f64 {
    let med = median(segment);
    med + multiplier * MAD_SCALE * mad(segment, med)
}

fn trimmed_threshold(segment: &[f64], multiplier: f64, trim: f64) -> f64 {
    if segment.is_empty() {
        return 0.0;
    }
    let mut sorted = segment.to_vec();
    sorted.sort_by(f64::total_cmp);
    let lo = quantile_sorted(&sorted, trim);
    let hi = quantile_sorted(&sorted, 1.0 - trim);
    let kept: Vec<f64> = segment
        .iter()
        .copied()
        .filter(|v| *v >= lo && *v <= hi)
        .collect();
    let (mean, sd) = mean_std(&kept);
    mean + multiplier * sd
}

/// Median of a slice; the mean of the middle pair for even lengths, 0 when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        0.5 * (sorted[mid - 1] + sorted[mid])
    }
}

/// Unscaled median absolute deviation around `center`.
pub fn mad(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Linearly interpolated q-quantile, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
