//! Whole-recording blink detection by peak prominence and width.
//!
//! Instead of per-window thresholds this detector takes one robust baseline
//! for the rectified recording and keeps local maxima that stand out by at
//! least `prominence_mad` scaled MADs and whose half-prominence width falls
//! in the physiological blink range.

use crate::{
    error::{check_sampling_rate, DetectError},
    signal::{Detection, Events, TimeSeries},
    threshold::{mad, median, MAD_SCALE},
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProminenceConfig {
    /// Minimum prominence in units of the scaled MAD of the recording.
    pub prominence_mad: f64,
    /// Accepted width range at half prominence (seconds).
    pub min_width_s: f64,
    pub max_width_s: f64,
    /// Minimum distance between peaks (seconds); the taller peak wins.
    pub distance_s: f64,
    pub use_absolute_value: bool,
}

impl Default for ProminenceConfig {
    fn default() -> Self {
        Self {
            prominence_mad: 4.5,
            min_width_s: 0.12,
            max_width_s: 0.45,
            distance_s: 0.2,
            use_absolute_value: true,
        }
    }
}

impl ProminenceConfig {
    pub fn validate(&self, fs: f64) -> Result<(), DetectError> {
        check_sampling_rate(fs)?;
        if !self.prominence_mad.is_finite() || self.prominence_mad < 0.0 {
            return Err(DetectError::invalid(
                "prominence multiplier must be non-negative",
            ));
        }
        if !(self.min_width_s >= 0.0 && self.min_width_s <= self.max_width_s) {
            return Err(DetectError::invalid(format!(
                "width range [{}, {}] s is empty",
                self.min_width_s, self.max_width_s
            )));
        }
        if !self.distance_s.is_finite() || self.distance_s < 0.0 {
            return Err(DetectError::invalid(format!(
                "peak distance must be non-negative, got {} s",
                self.distance_s
            )));
        }
        Ok(())
    }

    /// Minimum peak spacing in samples, truncated toward zero.
    pub fn distance_samples(&self, fs: f64) -> usize {
        (self.distance_s * fs).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProminenceDetection {
    pub fs: f64,
    pub sample_count: usize,
    pub min_prominence: f64,
    pub detections: Vec<Detection>,
    pub prominences: Vec<f64>,
    /// Half-prominence widths in seconds.
    pub widths_s: Vec<f64>,
}

impl ProminenceDetection {
    pub fn events(&self) -> Events {
        Events::from_indices(self.detections.iter().map(|d| d.index).collect())
    }
}

pub fn detect_blinks_by_prominence(
    ts: &TimeSeries,
    cfg: &ProminenceConfig,
) -> Result<ProminenceDetection, DetectError> {
    cfg.validate(ts.fs)?;
    let x: Vec<f64> = if cfg.use_absolute_value {
        ts.data.iter().map(|v| v.abs()).collect()
    } else {
        ts.data.clone()
    };
    let base = median(&x);
    let min_prominence = cfg.prominence_mad * MAD_SCALE * mad(&x, base);
    let min_width = cfg.min_width_s * ts.fs;
    let max_width = cfg.max_width_s * ts.fs;

    let peaks = select_by_distance(&x, local_maxima(&x), cfg.distance_samples(ts.fs));
    let mut detections = Vec::new();
    let mut prominences = Vec::new();
    let mut widths_s = Vec::new();
    for peak in peaks {
        let (prominence, left_base, right_base) = peak_prominence(&x, peak);
        if prominence < min_prominence {
            continue;
        }
        let width = peak_width(&x, peak, prominence, left_base, right_base);
        if width < min_width || width > max_width {
            continue;
        }
        detections.push(Detection {
            index: peak,
            amplitude: x[peak],
        });
        prominences.push(prominence);
        widths_s.push(width / ts.fs);
    }
    debug!(
        "prominence detector: {} peaks (min prominence {:.4})",
        detections.len(),
        min_prominence
    );
    Ok(ProminenceDetection {
        fs: ts.fs,
        sample_count: ts.len(),
        min_prominence,
        detections,
        prominences,
        widths_s,
    })
}

/// Strict local maxima; flat tops report their middle sample.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `distance` samples to a taller kept peak.
pub fn select_by_distance(x: &[f64], peaks: Vec<usize>, distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));
    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect()
}

/// Prominence of `peak` with the indices of its left and right bases.
fn peak_prominence(x: &[f64], peak: usize) -> (f64, usize, usize) {
    let top = x[peak];
    let mut left_base = peak;
    let mut left_min = top;
    let mut i = peak;
    loop {
        if x[i] > top {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }
    let mut right_base = peak;
    let mut right_min = top;
    for (offset, &v) in x[peak..].iter().enumerate() {
        if v > top {
            break;
        }
        if v < right_min {
            right_min = v;
            right_base = peak + offset;
        }
    }
    (top - left_min.max(right_min), left_base, right_base)
}

/// Width in samples at half prominence, linearly interpolated.
fn peak_width(
    x: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
) -> f64 {
    let height = x[peak] - 0.5 * prominence;
    let mut i = peak;
    while left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }
    let mut i = peak;
    while i < right_base && height < x[i] {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }
    right - left
}
