//! Signal conditioning ahead of blink detection.
//!
//! Blinks live roughly in the 0.1–8 Hz band, so the raw series is low-passed
//! with a zero-phase Butterworth filter, lightly smoothed, and optionally
//! turned into a moving RMS envelope. Every stage preserves the series length.

use crate::{
    error::{check_sampling_rate, DetectError},
    signal::TimeSeries,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Parameters for [`condition`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Low-pass cutoff (Hz); must stay below Nyquist.
    pub cutoff_hz: f64,
    /// Butterworth order, at least 1.
    pub filter_order: usize,
    /// Moving-average width in units of 10 ms (4 → 40 ms).
    pub smoothing_factor: f64,
    /// Replace the smoothed series by its moving RMS envelope.
    pub envelope: bool,
    /// RMS window length (seconds).
    pub rms_window_s: f64,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: 8.0,
            filter_order: 4,
            smoothing_factor: 4.0,
            envelope: false,
            rms_window_s: 0.1,
        }
    }
}

impl ConditioningConfig {
    pub fn validate(&self, fs: f64) -> Result<(), DetectError> {
        check_sampling_rate(fs)?;
        check_lowpass(fs, self.cutoff_hz, self.filter_order)?;
        if !self.smoothing_factor.is_finite() || self.smoothing_factor < 0.0 {
            return Err(DetectError::invalid(format!(
                "smoothing factor must be non-negative, got {}",
                self.smoothing_factor
            )));
        }
        if self.envelope && (!self.rms_window_s.is_finite() || self.rms_window_s <= 0.0) {
            return Err(DetectError::invalid(format!(
                "RMS window must be positive, got {} s",
                self.rms_window_s
            )));
        }
        Ok(())
    }

    /// Moving-average kernel length in samples.
    pub fn smoothing_window(&self, fs: f64) -> usize {
        ((0.01 * self.smoothing_factor * fs).floor() as usize).max(1)
    }

    /// RMS envelope window length in samples.
    pub fn rms_window(&self, fs: f64) -> usize {
        ((self.rms_window_s * fs).floor() as usize).max(1)
    }
}

/// Highest accepted Butterworth order.
pub const MAX_FILTER_ORDER: usize = 32;

fn check_lowpass(fs: f64, cutoff_hz: f64, order: usize) -> Result<(), DetectError> {
    if !(1..=MAX_FILTER_ORDER).contains(&order) {
        return Err(DetectError::invalid(format!(
            "filter order must lie in [1, {MAX_FILTER_ORDER}], got {order}"
        )));
    }
    if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 || cutoff_hz >= fs * 0.5 {
        return Err(DetectError::invalid(format!(
            "cutoff {cutoff_hz} Hz must lie in (0, {}) for fs = {fs} Hz",
            fs * 0.5
        )));
    }
    Ok(())
}

/// Run the full conditioning chain: low-pass, smoothing, optional RMS envelope.
pub fn condition(ts: &TimeSeries, cfg: &ConditioningConfig) -> Result<TimeSeries, DetectError> {
    cfg.validate(ts.fs)?;
    if ts.is_empty() {
        return Ok(ts.with_data(Vec::new()));
    }
    let filtered = filtfilt(
        &butterworth_lowpass(ts.fs, cfg.cutoff_hz, cfg.filter_order),
        &ts.data,
    );
    let smoothing = cfg.smoothing_window(ts.fs);
    let mut out = smooth(&filtered, smoothing);
    if cfg.envelope {
        out = moving_rms(&out, cfg.rms_window(ts.fs));
    }
    debug!(
        "conditioned {} samples: cutoff {} Hz, order {}, smoothing {} samples, envelope {}",
        ts.len(),
        cfg.cutoff_hz,
        cfg.filter_order,
        smoothing,
        cfg.envelope
    );
    Ok(ts.with_data(out))
}

/// Zero-phase Butterworth low-pass of `data`.
pub fn lowpass(data: &[f64], fs: f64, cutoff_hz: f64, order: usize) -> Result<Vec<f64>, DetectError> {
    check_sampling_rate(fs)?;
    check_lowpass(fs, cutoff_hz, order)?;
    Ok(filtfilt(&butterworth_lowpass(fs, cutoff_hz, order), data))
}

/// Second-order section in normalised form (a0 = 1).
///
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Transposed direct form II state after a constant input `x` has settled.
    fn steady_state(&self, x: f64) -> [f64; 2] {
        let y = self.dc_gain() * x;
        [y - self.b0 * x, self.b2 * x - self.a2 * y]
    }
}

/// Butterworth low-pass as cascaded sections, designed with the bilinear
/// transform and a pre-warped cutoff. Odd orders end with a first-order section.
pub fn butterworth_lowpass(fs: f64, cutoff_hz: f64, order: usize) -> Vec<Biquad> {
    let k = (PI * cutoff_hz / fs).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity(order.div_ceil(2));
    for idx in 0..order / 2 {
        let angle = if order % 2 == 0 {
            (2 * idx + 1) as f64 * PI / (2 * order) as f64
        } else {
            (idx + 1) as f64 * PI / order as f64
        };
        let q = 1.0 / (2.0 * angle.cos());
        let norm = 1.0 / (1.0 + k / q + k2);
        let b0 = k2 * norm;
        sections.push(Biquad {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - k / q + k2) * norm,
        });
    }
    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        sections.push(Biquad {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        });
    }
    sections
}

fn sosfilt(sections: &[Biquad], data: &[f64], initial: f64) -> Vec<f64> {
    let mut state = Vec::with_capacity(sections.len());
    let mut level = initial;
    for section in sections {
        state.push(section.steady_state(level));
        level *= section.dc_gain();
    }
    data.iter()
        .map(|&x| {
            let mut v = x;
            for (s, z) in sections.iter().zip(state.iter_mut()) {
                let y = s.b0 * v + z[0];
                z[0] = s.b1 * v - s.a1 * y + z[1];
                z[1] = s.b2 * v - s.a2 * y;
                v = y;
            }
            v
        })
        .collect()
}

/// Forward-backward filtering with odd-reflection padding.
pub fn filtfilt(sections: &[Biquad], data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n < 2 || sections.is_empty() {
        return data.to_vec();
    }
    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);
    let first = data[0];
    let last = data[n - 1];
    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    extended.extend_from_slice(data);
    extended.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

    let mut forward = sosfilt(sections, &extended, extended[0]);
    forward.reverse();
    let mut backward = sosfilt(sections, &forward, forward[0]);
    backward.reverse();
    backward[pad..pad + n].to_vec()
}

/// Moving average over `win` samples, centred like a same-length convolution
/// and padded by repeating the edge samples.
///
/// Kernels longer than the series are shortened to the series length.
pub fn smooth(data: &[f64], win: usize) -> Vec<f64> {
    let n = data.len();
    let win = win.min(n);
    if n == 0 || win <= 1 {
        return data.to_vec();
    }
    let before = win / 2;
    let after = (win - 1) / 2;
    let sample = |p: usize| data[p.saturating_sub(before).min(n - 1)];
    let mut prefix = Vec::with_capacity(n + before + after + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for p in 0..n + before + after {
        acc += sample(p);
        prefix.push(acc);
    }
    (0..n)
        .map(|i| (prefix[i + win] - prefix[i]) / win as f64)
        .collect()
}

/// Moving root-mean-square envelope over `win` samples.
pub fn moving_rms(data: &[f64], win: usize) -> Vec<f64> {
    let squared: Vec<f64> = data.iter().map(|x| x * x).collect();
    smooth(&squared, win)
        .into_iter()
        .map(|v| v.max(0.0).sqrt())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(fs: f64, freq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn argmax(data: &[f64]) -> usize {
        let mut best = 0;
        for (i, &v) in data.iter().enumerate() {
            if v > data[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn butterworth_sections_have_unit_dc_gain() {
        for order in 1..=7 {
            let sections = butterworth_lowpass(256.0, 8.0, order);
            assert_eq!(sections.len(), order.div_ceil(2));
            let gain: f64 = sections.iter().map(Biquad::dc_gain).product();
            assert!((gain - 1.0).abs() < 1e-9, "order {order} gain {gain}");
        }
    }

    #[test]
    fn filtfilt_passes_constant_signal() {
        let data = vec![4.5; 300];
        let out = filtfilt(&butterworth_lowpass(256.0, 8.0, 4), &data);
        assert_eq!(out.len(), data.len());
        assert!(out.iter().all(|v| (v - 4.5).abs() < 1e-6));
    }

    #[test]
    fn lowpass_keeps_slow_and_removes_fast_components() {
        let fs = 256.0;
        let n = 2048;
        let slow = sine(fs, 1.0, n);
        let fast = sine(fs, 40.0, n);
        let slow_out = lowpass(&slow, fs, 8.0, 4).unwrap();
        let fast_out = lowpass(&fast, fs, 8.0, 4).unwrap();
        let interior = 256..n - 256;
        let slow_peak = slow_out[interior.clone()]
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        let fast_peak = fast_out[interior]
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        assert!((slow_peak - 1.0).abs() < 0.01, "slow peak {slow_peak}");
        assert!(fast_peak < 0.01, "fast peak {fast_peak}");
    }

    #[test]
    fn conditioning_preserves_peak_timing() {
        let fs = 256.0;
        let center = 640usize;
        let sigma = 0.1 * fs;
        let data: Vec<f64> = (0..1280)
            .map(|i| 150.0 * (-0.5 * ((i as f64 - center as f64) / sigma).powi(2)).exp())
            .collect();
        let ts = TimeSeries::new(fs, data);
        let out = condition(&ts, &ConditioningConfig::default()).unwrap();
        assert_eq!(out.len(), ts.len());
        assert_eq!(out.fs, fs);
        let peak = argmax(&out.data);
        assert!(peak.abs_diff(center) <= 1, "peak moved to {peak}");
    }

    #[test]
    fn smooth_centres_odd_and_even_kernels() {
        let out = smooth(&[0.0, 0.0, 3.0, 0.0, 0.0], 3);
        assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        let out = smooth(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(out, vec![1.0, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn rms_envelope_discards_sign() {
        let out = moving_rms(&[-3.0; 20], 5);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn envelope_option_is_non_negative() {
        let fs = 256.0;
        let ts = TimeSeries::new(fs, sine(fs, 3.0, 1024));
        let cfg = ConditioningConfig {
            envelope: true,
            ..ConditioningConfig::default()
        };
        let out = condition(&ts, &cfg).unwrap();
        assert_eq!(out.len(), 1024);
        assert!(out.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn rejects_cutoff_at_or_above_nyquist() {
        let ts = TimeSeries::new(16.0, vec![0.0; 64]);
        let err = condition(&ts, &ConditioningConfig::default()).unwrap_err();
        assert!(matches!(err, DetectError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_zero_order_and_bad_rate() {
        let cfg = ConditioningConfig {
            filter_order: 0,
            ..ConditioningConfig::default()
        };
        assert!(cfg.validate(256.0).is_err());
        assert!(ConditioningConfig::default().validate(0.0).is_err());
        assert!(ConditioningConfig::default().validate(-10.0).is_err());
    }

    #[test]
    fn oversized_kernels_are_clamped_to_series_length() {
        let ts = TimeSeries::new(256.0, sine(256.0, 2.0, 64));
        let cfg = ConditioningConfig {
            smoothing_factor: 1e18,
            envelope: true,
            rms_window_s: 1e18,
            ..ConditioningConfig::default()
        };
        assert!(cfg.validate(ts.fs).is_ok());
        assert!(cfg.smoothing_window(ts.fs) > ts.len());
        let out = condition(&ts, &cfg).unwrap();
        assert_eq!(out.len(), 64);
        assert!(out.data.iter().all(|v| v.is_finite()));

        let data = [1.0, 5.0, 2.0, 8.0];
        assert_eq!(smooth(&data, usize::MAX), smooth(&data, data.len()));
        assert_eq!(moving_rms(&data, usize::MAX).len(), 4);
    }

    #[test]
    fn rejects_unbounded_filter_order() {
        let cfg = ConditioningConfig {
            filter_order: MAX_FILTER_ORDER + 1,
            ..ConditioningConfig::default()
        };
        assert!(cfg.validate(256.0).is_err());
        assert!(lowpass(&[0.0; 8], 256.0, 8.0, usize::MAX).is_err());
    }

    #[test]
    fn empty_series_stays_empty() {
        let ts = TimeSeries::new(256.0, Vec::new());
        let out = condition(&ts, &ConditioningConfig::default()).unwrap();
        assert!(out.is_empty());
    }
}
