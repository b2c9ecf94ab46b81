use crate::{
    detectors::peaks::find_peaks,
    error::{check_sampling_rate, DetectError},
    signal::{Detection, Events, TimeSeries},
    threshold::{ThresholdEstimator, ThresholdStrategy},
};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, ops::Range};

/// Configurable parameters for the windowed adaptive-threshold detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Length of each threshold window (seconds).
    pub win_size_s: f64,
    /// Multiplier applied to the spread estimate of the strategy.
    pub threshold_multiplier: f64,
    /// Minimum spacing between accepted detections (seconds).
    pub refractory_s: f64,
    /// Rectify the series first so both polarities count.
    pub use_absolute_value: bool,
    pub strategy: ThresholdStrategy,
    /// Estimate thresholds and candidates for all windows on the rayon pool.
    pub parallel: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            win_size_s: 2.0,
            threshold_multiplier: 2.0,
            refractory_s: 0.2,
            use_absolute_value: true,
            strategy: ThresholdStrategy::RobustMad,
            parallel: false,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self, fs: f64) -> Result<(), DetectError> {
        check_sampling_rate(fs)?;
        if !self.win_size_s.is_finite() || self.win_size_s <= 0.0 {
            return Err(DetectError::invalid(format!(
                "window size must be positive, got {} s",
                self.win_size_s
            )));
        }
        if !self.refractory_s.is_finite() || self.refractory_s < 0.0 {
            return Err(DetectError::invalid(format!(
                "refractory period must be non-negative, got {} s",
                self.refractory_s
            )));
        }
        if !self.threshold_multiplier.is_finite() {
            return Err(DetectError::invalid("threshold multiplier must be finite"));
        }
        self.strategy.validate()
    }

    /// Nominal window length in samples, never below one.
    pub fn window_len(&self, fs: f64) -> usize {
        ((self.win_size_s * fs).round() as usize).max(1)
    }

    pub fn refractory_samples(&self, fs: f64) -> usize {
        (self.refractory_s * fs).round() as usize
    }
}

/// Lazily generated, non-overlapping windows covering `[0, len)`.
#[derive(Debug, Clone)]
pub struct Windows {
    len: usize,
    win_len: usize,
    start: usize,
}

/// Split `len` samples into consecutive windows of `win_len` (the last may be shorter).
pub fn windows(len: usize, win_len: usize) -> Windows {
    Windows {
        len,
        win_len: win_len.max(1),
        start: 0,
    }
}

impl Iterator for Windows {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.start >= self.len {
            return None;
        }
        let end = self.start.saturating_add(self.win_len).min(self.len);
        let window = self.start..end;
        self.start = end;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.start).div_ceil(self.win_len);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}

/// Index of the most recently accepted detection; the only state carried
/// from one window to the next.
#[derive(Debug, Clone, Copy)]
pub struct RefractoryCursor {
    last: Option<usize>,
    refractory: usize,
}

impl RefractoryCursor {
    pub fn new(refractory: usize) -> Self {
        Self {
            last: None,
            refractory,
        }
    }

    pub fn last(&self) -> Option<usize> {
        self.last
    }

    pub fn admits(&self, index: usize) -> bool {
        match self.last {
            None => true,
            Some(last) => index > last && index - last > self.refractory,
        }
    }

    /// Accept `index` if it clears the refractory gap, moving the cursor.
    pub fn offer(&mut self, index: usize) -> bool {
        let accepted = self.admits(index);
        if accepted {
            self.last = Some(index);
        }
        accepted
    }
}

/// Threshold and global candidate indices of one window, before merging.
#[derive(Debug, Clone)]
struct WindowScan {
    range: Range<usize>,
    threshold: f64,
    candidates: Vec<usize>,
}

fn scan_window<E: ThresholdEstimator + ?Sized>(
    signal: &[f64],
    range: Range<usize>,
    multiplier: f64,
    refractory: usize,
    estimator: &E,
) -> WindowScan {
    let segment = &signal[range.clone()];
    let threshold = estimator.estimate(segment, multiplier);
    let candidates = find_peaks(segment, threshold, refractory)
        .into_iter()
        .map(|local| range.start + local)
        .collect();
    WindowScan {
        range,
        threshold,
        candidates,
    }
}

/// Result of the windowed detector: accepted detections plus the
/// per-window threshold trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkDetection {
    pub fs: f64,
    pub sample_count: usize,
    pub window_len: usize,
    pub refractory_samples: usize,
    pub detections: Vec<Detection>,
    pub thresholds: Vec<f64>,
}

impl BlinkDetection {
    pub fn indices(&self) -> Vec<usize> {
        self.detections.iter().map(|d| d.index).collect()
    }

    pub fn events(&self) -> Events {
        Events::from_indices(self.indices())
    }

    /// Detection times in seconds.
    pub fn times(&self) -> Vec<f64> {
        self.detections.iter().map(|d| d.time(self.fs)).collect()
    }

    /// Window ranges matching `thresholds`, one per entry.
    pub fn windows(&self) -> Windows {
        windows(self.sample_count, self.window_len)
    }
}

/// Detect blinks with the threshold strategy named in `cfg`.
pub fn detect_blinks(ts: &TimeSeries, cfg: &DetectionConfig) -> Result<BlinkDetection, DetectError> {
    detect_blinks_with(ts, cfg, &cfg.strategy)
}

/// Detect blinks using any threshold estimator.
///
/// Thresholds and local candidates are computed independently per window
/// (on the rayon pool when `cfg.parallel` is set); acceptance under the
/// global refractory rule is always one sequential pass in index order.
pub fn detect_blinks_with<E>(
    ts: &TimeSeries,
    cfg: &DetectionConfig,
    estimator: &E,
) -> Result<BlinkDetection, DetectError>
where
    E: ThresholdEstimator + Sync + ?Sized,
{
    cfg.validate(ts.fs)?;
    let window_len = cfg.window_len(ts.fs);
    let refractory = cfg.refractory_samples(ts.fs);
    let signal: Cow<[f64]> = if cfg.use_absolute_value {
        Cow::Owned(ts.data.iter().map(|x| x.abs()).collect())
    } else {
        Cow::Borrowed(&ts.data)
    };
    let scan = |range: Range<usize>| {
        scan_window(
            &signal,
            range,
            cfg.threshold_multiplier,
            refractory,
            estimator,
        )
    };

    let (detections, thresholds) = if cfg.parallel {
        let ranges: Vec<Range<usize>> = windows(signal.len(), window_len).collect();
        let scans: Vec<WindowScan> = ranges.into_par_iter().map(scan).collect();
        merge_windows(&signal, refractory, scans)
    } else {
        merge_windows(&signal, refractory, windows(signal.len(), window_len).map(scan))
    };

    debug!(
        "{} detections over {} windows ({} samples/window, refractory {} samples)",
        detections.len(),
        thresholds.len(),
        window_len,
        refractory
    );
    Ok(BlinkDetection {
        fs: ts.fs,
        sample_count: ts.len(),
        window_len,
        refractory_samples: refractory,
        detections,
        thresholds,
    })
}

fn merge_windows(
    signal: &[f64],
    refractory: usize,
    scans: impl IntoIterator<Item = WindowScan>,
) -> (Vec<Detection>, Vec<f64>) {
    let mut cursor = RefractoryCursor::new(refractory);
    let mut detections = Vec::new();
    let mut thresholds = Vec::new();
    for scan in scans {
        trace!(
            "window {}..{}: threshold {:.4}, {} candidates",
            scan.range.start,
            scan.range.end,
            scan.threshold,
            scan.candidates.len()
        );
        thresholds.push(scan.threshold);
        for index in scan.candidates {
            if cursor.offer(index) {
                detections.push(Detection {
                    index,
                    amplitude: signal[index],
                });
            }
        }
    }
    (detections, thresholds)
}
