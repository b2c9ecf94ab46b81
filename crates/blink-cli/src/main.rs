use anyhow::{bail, Context, Result};
use blink_lib::{
    conditioning::condition,
    io::{delimited as delimited_io, eeg as eeg_io, text as text_io},
    metrics::{match_events, MatchSummary},
    pipeline::{load_config, run_blink_pipeline, run_prominence_pipeline, PipelineConfig},
    plot::{figure_from_detection, Figure, PlotBackend, Series},
    signal::TimeSeries,
    threshold::{ThresholdStrategy, DEFAULT_QUANTILE, DEFAULT_TRIM},
};
use blink_sim::{
    read_ground_truth, simulate_eeg_with_blinks, write_ground_truth, write_recording_csv,
    SimulationConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

#[derive(Parser)]
#[command(
    name = "blink",
    version,
    about = "Adaptive eye-blink detection for single-channel EEG"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    /// Windowed robust threshold with a refractory gap
    Adaptive,
    /// Whole-recording prominence and width criteria
    Prominence,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    RobustMad,
    TrimmedMeanStd,
    MeanStd,
    Quantile,
}

/// Where samples come from. Plain text is read from `--input` or stdin.
#[derive(Args, Debug)]
struct SourceArgs {
    /// Sampling rate of text/CSV input (EDF files carry their own)
    #[arg(long, default_value_t = 256.0)]
    fs: f64,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long, conflicts_with_all = ["input", "edf"])]
    csv: Option<PathBuf>,
    #[arg(long, default_value = "value")]
    column: String,
    #[arg(long, conflicts_with = "input")]
    edf: Option<PathBuf>,
    /// EDF channel index or label
    #[arg(long, default_value = "0")]
    channel: String,
}

/// Pipeline options. Flags override values from `--config`.
#[derive(Args, Debug)]
struct TuningArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Low-pass, smooth (and optionally envelope) before detection
    #[arg(long)]
    condition: bool,
    #[arg(long)]
    cutoff_hz: Option<f64>,
    #[arg(long)]
    filter_order: Option<usize>,
    #[arg(long)]
    envelope: bool,
    #[arg(long)]
    win_size_s: Option<f64>,
    #[arg(long)]
    threshold_multiplier: Option<f64>,
    #[arg(long)]
    refractory_s: Option<f64>,
    /// Keep polarity instead of rectifying
    #[arg(long)]
    signed: bool,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    #[arg(long)]
    trim: Option<f64>,
    #[arg(long)]
    quantile: Option<f64>,
    /// Evaluate windows on the rayon thread pool
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect blinks and print the detections as JSON
    Detect {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long, value_enum, default_value = "adaptive")]
        method: Method,
        /// Ground-truth JSON (as written by `simulate --truth`) to score against
        #[arg(long)]
        truth: Option<PathBuf>,
        #[arg(long, default_value_t = 0.1)]
        tolerance_s: f64,
    },
    /// Print the conditioned series, one sample per line
    Condition {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Generate a synthetic EEG recording with Gaussian blinks
    Simulate {
        #[arg(long, default_value_t = 10.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 256.0)]
        fs: f64,
        #[arg(long, default_value_t = 0.25)]
        blink_rate: f64,
        #[arg(long, default_value_t = 150.0)]
        blink_amplitude: f64,
        #[arg(long, default_value_t = 20.0)]
        noise_level: f64,
        #[arg(long)]
        seed: Option<u64>,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write `time,value` CSV instead of one sample per line
        #[arg(long, requires = "out")]
        csv: bool,
        #[arg(long)]
        truth: Option<PathBuf>,
    },
    /// Render series, window thresholds and detections to a PNG
    Plot {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 4000)]
        max_points: usize,
        #[arg(long, default_value_t = 1200)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let started = Instant::now();
    match cli.command {
        Commands::Detect {
            source,
            tuning,
            method,
            truth,
            tolerance_s,
        } => cmd_detect(&source, &tuning, method, truth.as_deref(), tolerance_s)?,
        Commands::Condition { source, tuning } => cmd_condition(&source, &tuning)?,
        Commands::Simulate {
            duration_s,
            fs,
            blink_rate,
            blink_amplitude,
            noise_level,
            seed,
            out,
            csv,
            truth,
        } => {
            let cfg = SimulationConfig {
                duration_s,
                fs,
                blink_rate,
                blink_amplitude,
                noise_level,
                seed,
            };
            cmd_simulate(&cfg, out.as_deref(), csv, truth.as_deref())?
        }
        Commands::Plot {
            source,
            tuning,
            out,
            max_points,
            width,
            height,
        } => cmd_plot(&source, &tuning, &out, max_points, (width, height))?,
    }
    debug!("finished in {:?}", started.elapsed());
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn load_time_series(source: &SourceArgs) -> Result<TimeSeries> {
    let ts = if let Some(edf) = &source.edf {
        eeg_io::load_edf_channel(edf, &source.channel.as_str().into())?
    } else if let Some(csv) = &source.csv {
        let delimiter = delimited_io::delimiter_for(csv);
        let data = delimited_io::read_column(csv, &source.column, delimiter)?;
        TimeSeries::new(source.fs, data)
    } else {
        TimeSeries::new(source.fs, read_samples(source.input.as_deref())?)
    };
    info!("loaded {} samples at {} Hz", ts.len(), ts.fs);
    Ok(ts)
}

fn resolve_config(tuning: &TuningArgs) -> Result<PipelineConfig> {
    let mut cfg = match &tuning.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    cfg.condition |= tuning.condition;
    cfg.conditioning.envelope |= tuning.envelope;
    if let Some(cutoff) = tuning.cutoff_hz {
        cfg.conditioning.cutoff_hz = cutoff;
    }
    if let Some(order) = tuning.filter_order {
        cfg.conditioning.filter_order = order;
    }
    if let Some(win) = tuning.win_size_s {
        cfg.detection.win_size_s = win;
    }
    if let Some(k) = tuning.threshold_multiplier {
        cfg.detection.threshold_multiplier = k;
    }
    if let Some(refractory) = tuning.refractory_s {
        cfg.detection.refractory_s = refractory;
        cfg.prominence.distance_s = refractory;
    }
    if tuning.signed {
        cfg.detection.use_absolute_value = false;
        cfg.prominence.use_absolute_value = false;
    }
    cfg.detection.parallel |= tuning.parallel;
    if let Some(strategy) = tuning.strategy {
        cfg.detection.strategy = match strategy {
            StrategyArg::RobustMad => ThresholdStrategy::RobustMad,
            StrategyArg::TrimmedMeanStd => ThresholdStrategy::TrimmedMeanStd { trim: DEFAULT_TRIM },
            StrategyArg::MeanStd => ThresholdStrategy::MeanStd,
            StrategyArg::Quantile => ThresholdStrategy::Quantile {
                q: DEFAULT_QUANTILE,
            },
        };
    }
    // parameters refine whichever strategy is selected, from flag or file
    match (&mut cfg.detection.strategy, tuning.trim, tuning.quantile) {
        (_, Some(_), Some(_)) => bail!("--trim and --quantile belong to different strategies"),
        (ThresholdStrategy::TrimmedMeanStd { trim }, Some(value), None) => *trim = value,
        (ThresholdStrategy::Quantile { q }, None, Some(value)) => *q = value,
        (_, None, None) => {}
        (other, _, _) => bail!("--trim/--quantile do not apply to the {other:?} strategy"),
    }
    Ok(cfg)
}

#[derive(Serialize)]
struct DetectReport<D: Serialize> {
    method: &'static str,
    conditioned: bool,
    #[serde(flatten)]
    detection: D,
    times_s: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<MatchSummary>,
}

fn score_against(
    truth: Option<&Path>,
    detected: &[usize],
    fs: f64,
    tolerance_s: f64,
) -> Result<Option<MatchSummary>> {
    let Some(path) = truth else {
        return Ok(None);
    };
    let truth = read_ground_truth(path)?;
    if (truth.fs - fs).abs() > 1e-9 {
        bail!(
            "ground truth was generated at {} Hz but the series is {} Hz",
            truth.fs,
            fs
        );
    }
    let tolerance = (tolerance_s * fs).round().max(0.0) as usize;
    let summary = match_events(&truth.blink_positions, detected, tolerance);
    info!(
        "scored against {}: sensitivity {:.3}, precision {:.3}",
        path.display(),
        summary.sensitivity,
        summary.precision
    );
    Ok(Some(summary))
}

fn cmd_detect(
    source: &SourceArgs,
    tuning: &TuningArgs,
    method: Method,
    truth: Option<&Path>,
    tolerance_s: f64,
) -> Result<()> {
    let ts = load_time_series(source)?;
    let cfg = resolve_config(tuning)?;
    let json = match method {
        Method::Adaptive => {
            let result = run_blink_pipeline(&ts, &cfg)?;
            let detection = result.detection;
            info!(
                "{} blinks over {} windows",
                detection.detections.len(),
                detection.thresholds.len()
            );
            let score = score_against(truth, &detection.indices(), ts.fs, tolerance_s)?;
            serde_json::to_string(&DetectReport {
                method: "adaptive",
                conditioned: result.conditioned,
                times_s: detection.times(),
                detection,
                score,
            })?
        }
        Method::Prominence => {
            let result = run_prominence_pipeline(&ts, &cfg)?;
            let detection = result.detection;
            info!("{} blinks by prominence", detection.detections.len());
            let events = detection.events();
            let score = score_against(truth, &events.indices, ts.fs, tolerance_s)?;
            serde_json::to_string(&DetectReport {
                method: "prominence",
                conditioned: result.conditioned,
                times_s: events.times(ts.fs),
                detection,
                score,
            })?
        }
    };
    println!("{json}");
    Ok(())
}

fn cmd_condition(source: &SourceArgs, tuning: &TuningArgs) -> Result<()> {
    let ts = load_time_series(source)?;
    let cfg = resolve_config(tuning)?;
    let conditioned = condition(&ts, &cfg.conditioning)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(text_io::format_f64_series(&conditioned.data).as_bytes())?;
    Ok(())
}

fn cmd_simulate(
    cfg: &SimulationConfig,
    out: Option<&Path>,
    csv: bool,
    truth: Option<&Path>,
) -> Result<()> {
    let recording = simulate_eeg_with_blinks(cfg)?;
    match out {
        Some(path) if csv => write_recording_csv(path, &recording)?,
        Some(path) => text_io::write_f64_series(path, &recording.data)?,
        None => print!("{}", text_io::format_f64_series(&recording.data)),
    }
    if let Some(path) = truth {
        write_ground_truth(path, &recording.ground_truth())?;
    }
    info!(
        "simulated {} samples with blinks at {:?}",
        recording.data.len(),
        recording.blink_positions
    );
    Ok(())
}

fn cmd_plot(
    source: &SourceArgs,
    tuning: &TuningArgs,
    out: &Path,
    max_points: usize,
    size: (u32, u32),
) -> Result<()> {
    if max_points == 0 {
        bail!("--max-points must be at least 1");
    }
    let ts = load_time_series(source)?;
    let cfg = resolve_config(tuning)?;
    let result = run_blink_pipeline(&ts, &cfg)?;
    let title = source
        .input
        .as_deref()
        .or(source.csv.as_deref())
        .or(source.edf.as_deref())
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blinks".into());
    let fig = figure_from_detection(&title, &result.analysed, &result.detection, max_points);
    PngBackend { path: out, size }.draw(&fig)?;
    info!("wrote {}", out.display());
    Ok(())
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        draw_plotters_figure(self.path, self.size, fig)
            .with_context(|| format!("rendering {}", self.path.display()))
    }
}

fn rgb(color: blink_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

fn draw_plotters_figure(path: &Path, size: (u32, u32), fig: &Figure) -> Result<()> {
    let backend = BitMapBackend::new(path, size);
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
    let (x_min, x_max) = padded(x_min, x_max);
    let (y_min, y_max) = padded(y_min, y_max);
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let width = line.style.width.round().max(1.0) as u32;
                let style = rgb(line.style.color).stroke_width(width);
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    style,
                ))?;
            }
            Series::Markers(markers) => {
                let style = rgb(markers.color).filled();
                chart.draw_series(
                    markers
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), markers.size, style)),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
