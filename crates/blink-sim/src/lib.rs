//! Synthetic EEG with Gaussian blink artifacts at known positions.

use anyhow::{ensure, Context, Result};
use blink_lib::signal::TimeSeries;
use csv::WriterBuilder;
use log::debug;
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fs, path::Path};

/// Standard deviation of a blink pulse, in seconds.
pub const BLINK_SIGMA_S: f64 = 0.1;
/// Support of a blink pulse, in seconds.
pub const BLINK_SUPPORT_S: f64 = 0.3;

/// Background rhythms as `(amplitude, frequency_hz)`: alpha, theta, beta.
const RHYTHMS: [(f64, f64); 3] = [(30.0, 10.0), (15.0, 6.0), (10.0, 20.0)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub duration_s: f64,
    pub fs: f64,
    /// Blinks per second.
    pub blink_rate: f64,
    pub blink_amplitude: f64,
    /// Half-width of the uniform noise added to every sample.
    pub noise_level: f64,
    /// Fixed RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_s: 10.0,
            fs: 256.0,
            blink_rate: 0.25,
            blink_amplitude: 150.0,
            noise_level: 20.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fs.is_finite() && self.fs > 0.0,
            "sampling rate must be positive, got {}",
            self.fs
        );
        ensure!(
            self.duration_s.is_finite() && self.duration_s >= 0.0,
            "duration must be non-negative, got {}",
            self.duration_s
        );
        ensure!(
            self.blink_rate.is_finite() && self.blink_rate >= 0.0,
            "blink rate must be non-negative, got {}",
            self.blink_rate
        );
        ensure!(
            self.noise_level.is_finite() && self.noise_level >= 0.0,
            "noise level must be non-negative, got {}",
            self.noise_level
        );
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        (self.duration_s * self.fs).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRecording {
    pub fs: f64,
    pub timestamps: Vec<f64>,
    pub data: Vec<f64>,
    /// Blink centers as sample indices, ascending.
    pub blink_positions: Vec<usize>,
}

impl SimulatedRecording {
    pub fn ground_truth(&self) -> GroundTruth {
        GroundTruth {
            fs: self.fs,
            blink_positions: self.blink_positions.clone(),
            blink_times_s: self
                .blink_positions
                .iter()
                .map(|&p| p as f64 / self.fs)
                .collect(),
        }
    }
}

/// Blink positions written next to a simulated recording for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub fs: f64,
    pub blink_positions: Vec<usize>,
    pub blink_times_s: Vec<f64>,
}

pub fn simulate_eeg_with_blinks(cfg: &SimulationConfig) -> Result<SimulatedRecording> {
    cfg.validate()?;
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let n = cfg.sample_count();
    let timestamps: Vec<f64> = (0..n).map(|i| i as f64 / cfg.fs).collect();
    let mut data: Vec<f64> = timestamps
        .iter()
        .map(|&t| {
            let rhythm: f64 = RHYTHMS
                .iter()
                .map(|&(amp, freq)| amp * (2.0 * PI * freq * t).sin())
                .sum();
            let noise = if cfg.noise_level > 0.0 {
                rng.gen_range(-cfg.noise_level..=cfg.noise_level)
            } else {
                0.0
            };
            rhythm + noise
        })
        .collect();

    let wanted = (cfg.duration_s * cfg.blink_rate).floor() as usize;
    let mut blink_positions = index::sample(&mut rng, n, wanted.min(n)).into_vec();
    blink_positions.sort_unstable();
    for &pos in &blink_positions {
        inject_blink(&mut data, pos, cfg.blink_amplitude, cfg.fs);
    }
    debug!(
        "simulated {} samples at {} Hz with {} blinks",
        n,
        cfg.fs,
        blink_positions.len()
    );

    Ok(SimulatedRecording {
        fs: cfg.fs,
        timestamps,
        data,
        blink_positions,
    })
}

/// Add one truncated Gaussian pulse centred on `center`, clipped to the
/// series bounds.
pub fn inject_blink(data: &mut [f64], center: usize, amplitude: f64, fs: f64) {
    let half = ((BLINK_SUPPORT_S * fs).floor() as i64) / 2;
    let sigma = BLINK_SIGMA_S * fs;
    for j in -half..half {
        let idx = center as i64 + j;
        if idx < 0 || idx >= data.len() as i64 {
            continue;
        }
        let z = j as f64 / sigma;
        data[idx as usize] += amplitude * (-0.5 * z * z).exp();
    }
}

/// Noise-free series with blinks at `centers_s` seconds.
pub fn gaussian_blink_train(duration_s: f64, fs: f64, centers_s: &[f64], amplitude: f64) -> TimeSeries {
    let n = (duration_s * fs).max(0.0).floor() as usize;
    let mut data = vec![0.0; n];
    for &c in centers_s {
        let center = (c * fs).round();
        if center >= 0.0 {
            inject_blink(&mut data, center as usize, amplitude, fs);
        }
    }
    TimeSeries::new(fs, data)
}

/// `time,value` CSV, one row per sample.
pub fn write_recording_csv(path: &Path, recording: &SimulatedRecording) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(["time", "value"])?;
    for (t, v) in recording.timestamps.iter().zip(&recording.data) {
        writer.write_record([t.to_string(), v.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_ground_truth(path: &Path, truth: &GroundTruth) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, truth)?;
    Ok(())
}

pub fn read_ground_truth(path: &Path) -> Result<GroundTruth> {
    let file = fs::File::open(path).with_context(|| format!("opening truth {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing truth {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blink_lib::io::delimited::read_column;
    use tempfile::tempdir;

    fn seeded() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn default_recording_shape() {
        let rec = simulate_eeg_with_blinks(&seeded()).unwrap();
        assert_eq!(rec.data.len(), 2560);
        assert_eq!(rec.timestamps.len(), 2560);
        assert_eq!(rec.timestamps[256], 1.0);
        assert_eq!(rec.blink_positions.len(), 2);
        assert!(rec.blink_positions.windows(2).all(|w| w[0] < w[1]));
        assert!(rec.blink_positions.iter().all(|&p| p < 2560));
    }

    #[test]
    fn seed_makes_runs_repeatable() {
        let a = simulate_eeg_with_blinks(&seeded()).unwrap();
        let b = simulate_eeg_with_blinks(&seeded()).unwrap();
        assert_eq!(a, b);
        let c = simulate_eeg_with_blinks(&SimulationConfig {
            seed: Some(8),
            ..seeded()
        })
        .unwrap();
        assert_ne!(a.data, c.data);
    }

    #[test]
    fn background_without_noise_or_blinks_is_bounded() {
        let rec = simulate_eeg_with_blinks(&SimulationConfig {
            blink_rate: 0.0,
            noise_level: 0.0,
            ..seeded()
        })
        .unwrap();
        assert!(rec.blink_positions.is_empty());
        assert_eq!(rec.data[0], 0.0);
        assert!(rec.data.iter().all(|v| v.abs() <= 55.0));
    }

    #[test]
    fn noise_stays_within_level() {
        let quiet = simulate_eeg_with_blinks(&SimulationConfig {
            blink_rate: 0.0,
            noise_level: 0.0,
            ..seeded()
        })
        .unwrap();
        let noisy = simulate_eeg_with_blinks(&SimulationConfig {
            blink_rate: 0.0,
            noise_level: 5.0,
            ..seeded()
        })
        .unwrap();
        for (q, n) in quiet.data.iter().zip(&noisy.data) {
            assert!((n - q).abs() <= 5.0 + 1e-9);
        }
    }

    #[test]
    fn more_blinks_than_samples_are_capped() {
        let rec = simulate_eeg_with_blinks(&SimulationConfig {
            duration_s: 0.05,
            fs: 100.0,
            blink_rate: 1000.0,
            ..seeded()
        })
        .unwrap();
        assert_eq!(rec.data.len(), 5);
        assert_eq!(rec.blink_positions, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(simulate_eeg_with_blinks(&SimulationConfig {
            fs: 0.0,
            ..seeded()
        })
        .is_err());
        assert!(simulate_eeg_with_blinks(&SimulationConfig {
            noise_level: -1.0,
            ..seeded()
        })
        .is_err());
    }

    #[test]
    fn blink_support_is_half_open() {
        let fs = 100.0;
        let mut data = vec![0.0; 100];
        inject_blink(&mut data, 50, 150.0, fs);
        assert_eq!(data[50], 150.0);
        assert!(data[35] > 0.0);
        assert_eq!(data[34], 0.0);
        assert!(data[64] > 0.0);
        assert_eq!(data[65], 0.0);
        // sigma of 10 samples
        assert!((data[60] - 150.0 * (-0.5f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn blink_near_edge_is_clipped() {
        let mut data = vec![0.0; 10];
        inject_blink(&mut data, 0, 100.0, 100.0);
        assert_eq!(data[0], 100.0);
        assert!(data[9] > 0.0);
    }

    #[test]
    fn blink_train_peaks_at_centers() {
        let ts = gaussian_blink_train(10.0, 256.0, &[2.0, 5.0, 8.0], 150.0);
        assert_eq!(ts.len(), 2560);
        for center in [512, 1280, 2048] {
            assert_eq!(ts.data[center], 150.0);
            assert!(ts.data[center - 1] < 150.0);
        }
        assert_eq!(ts.data[0], 0.0);
    }

    #[test]
    fn writes_csv_and_truth() {
        let dir = tempdir().unwrap();
        let rec = simulate_eeg_with_blinks(&SimulationConfig {
            duration_s: 2.0,
            fs: 50.0,
            blink_rate: 1.0,
            ..seeded()
        })
        .unwrap();

        let csv_path = dir.path().join("sim.csv");
        write_recording_csv(&csv_path, &rec).unwrap();
        let values = read_column(&csv_path, "value", b',').unwrap();
        assert_eq!(values.len(), 100);
        assert!((values[10] - rec.data[10]).abs() < 1e-9);

        let truth_path = dir.path().join("truth.json");
        write_ground_truth(&truth_path, &rec.ground_truth()).unwrap();
        let truth = read_ground_truth(&truth_path).unwrap();
        assert_eq!(truth.blink_positions, rec.blink_positions);
        assert_eq!(truth.blink_times_s.len(), 2);
    }
}
