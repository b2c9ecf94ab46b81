use serde::{Deserialize, Serialize};

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    /// Sample times in seconds, starting at zero.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| i as f64 / self.fs).collect()
    }
    /// Same sampling rate, new samples.
    pub fn with_data(&self, data: Vec<f64>) -> Self {
        Self { fs: self.fs, data }
    }
}

/// Point events on a timeline (e.g., blink sample indices)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn times(&self, fs: f64) -> Vec<f64> {
        self.indices.iter().map(|&i| i as f64 / fs).collect()
    }
}

/// A single accepted detection: sample index plus the analysed amplitude there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub index: usize,
    pub amplitude: f64,
}

impl Detection {
    pub fn time(&self, fs: f64) -> f64 {
        self.index as f64 / fs
    }
}
