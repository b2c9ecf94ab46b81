//! Backend-agnostic figure model for detection results.
//!
//! The library only builds `Figure` values; rendering lives behind
//! [`PlotBackend`] so the CLI can draw PNGs without pulling a drawing stack
//! into the detector crate.

use crate::{detectors::blink::BlinkDetection, signal::TimeSeries};
use serde::{Deserialize, Serialize};

pub const SIGNAL_COLOR: u32 = 0x1F77B4;
pub const THRESHOLD_COLOR: u32 = 0xFF7F0E;
pub const BLINK_COLOR: u32 = 0xD62728;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub size: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn name(&self) -> &str {
        match self {
            Series::Line(line) => &line.name,
            Series::Markers(markers) => &markers.name,
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

/// Keep the first point of each of `max_points` equal buckets.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

pub fn figure_from_timeseries(
    title: &str,
    series: &TimeSeries,
    max_points: usize,
    color: u32,
) -> Figure {
    let dt = 1.0 / series.fs.max(1.0);
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    let decimated = decimate_points(&points, max_points);
    let mut fig = Figure::new(Some(title.into()));
    fig.x.label = Some("time (s)".into());
    fig.add_series(Series::Line(LineSeries {
        name: title.into(),
        points: decimated,
        style: Style {
            width: 1.4,
            dash: None,
            color: Color(color),
        },
    }));
    fig
}

/// Signal trace, per-window threshold steps and one marker per blink.
///
/// `series` should be the series the detector actually saw; with absolute
/// value detection the thresholds and markers sit on `|x|`.
pub fn figure_from_detection(
    title: &str,
    series: &TimeSeries,
    detection: &BlinkDetection,
    max_points: usize,
) -> Figure {
    let mut fig = figure_from_timeseries(title, series, max_points, SIGNAL_COLOR);
    fig.y.label = Some("amplitude".into());

    let fs = detection.fs;
    let steps: Vec<[f64; 2]> = detection
        .windows()
        .zip(&detection.thresholds)
        .flat_map(|(range, &t)| [[range.start as f64 / fs, t], [range.end as f64 / fs, t]])
        .collect();
    if !steps.is_empty() {
        fig.add_series(Series::Line(LineSeries {
            name: "threshold".into(),
            points: steps,
            style: Style {
                width: 1.0,
                dash: Some([6.0, 4.0]),
                color: Color(THRESHOLD_COLOR),
            },
        }));
    }

    fig.add_series(Series::Markers(MarkerSeries {
        name: format!("blinks ({})", detection.detections.len()),
        points: detection
            .detections
            .iter()
            .map(|d| [d.time(fs), d.amplitude])
            .collect(),
        size: 4,
        color: Color(BLINK_COLOR),
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::blink::{detect_blinks, DetectionConfig};

    #[test]
    fn decimation_keeps_bucket_heads() {
        let points: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, 0.0]).collect();
        let kept = decimate_points(&points, 4);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0][0], 0.0);
        assert_eq!(kept[1][0], 2.0);
        assert_eq!(decimate_points(&points, 20).len(), 10);
    }

    #[test]
    fn color_unpacks_channels() {
        assert_eq!(Color(0x1F77B4).rgb(), (0x1F, 0x77, 0xB4));
    }

    #[test]
    fn detection_figure_has_trace_steps_and_markers() {
        let mut data = vec![0.0; 1000];
        data[100] = 50.0;
        data[700] = 80.0;
        let ts = TimeSeries::new(100.0, data);
        let cfg = DetectionConfig {
            win_size_s: 4.0,
            ..DetectionConfig::default()
        };
        let detection = detect_blinks(&ts, &cfg).unwrap();
        let fig = figure_from_detection("Fp1", &ts, &detection, 256);

        assert_eq!(fig.series.len(), 3);
        assert_eq!(fig.series[0].points().len(), 256);
        // three windows, two points each
        assert_eq!(fig.series[1].points().len(), 6);
        assert_eq!(fig.series[1].points()[5][0], 10.0);
        match &fig.series[2] {
            Series::Markers(m) => {
                assert_eq!(m.name, "blinks (2)");
                assert_eq!(m.points, vec![[1.0, 50.0], [7.0, 80.0]]);
            }
            other => panic!("expected markers, got {}", other.name()),
        }
        let (x0, x1, y0, y1) = fig.bounds().unwrap();
        assert_eq!((x0, x1, y0, y1), (0.0, 10.0, 0.0, 80.0));
    }

    #[test]
    fn empty_figure_has_no_bounds() {
        assert!(Figure::new(None).bounds().is_none());
    }
}
