//! harvester - 从视频中批量采集主体居中的裁剪帧

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use lora_harvester::api::Harvester;
use lora_harvester::core::crop::AspectRatio;
use lora_harvester::core::video::{ProcessingStats, RunHooks, StopFlag, VideoInfo};
use lora_harvester::core::{HarvestConfig, HarvestError, Result};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Fast,
    Thorough,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video files, processed in order.
    #[arg(required = true)]
    videos: Vec<PathBuf>,
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start from a preset instead of the defaults (ignored with --config).
    #[arg(long, value_enum)]
    preset: Option<Preset>,
    /// Output root directory.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Crop aspect ratio: 9:16, 3:4, 1:1, 4:5, 16:9 or 4:3.
    #[arg(short, long)]
    format: Option<AspectRatio>,
    /// Process every N-th frame.
    #[arg(short, long)]
    interval: Option<u64>,
    /// Detection confidence threshold (0-1).
    #[arg(short, long)]
    confidence: Option<f32>,
    /// Minimum padding around the subject in pixels.
    #[arg(short, long)]
    padding: Option<u32>,
    /// Keep frames with subtitles or on-screen text.
    #[arg(long)]
    no_skip_text: bool,
    /// Vote across several detection models.
    #[arg(long)]
    ensemble: bool,
    /// Models used in ensemble mode, in invocation order.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    ensemble_models: Vec<String>,
    /// Minimum number of agreeing models.
    #[arg(long)]
    voting_threshold: Option<usize>,
    /// Batch frames and pre-filter text in parallel.
    #[arg(long)]
    turbo: bool,
    /// Frames per batch in turbo mode.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Weights file for the first (single-mode) model.
    #[arg(short, long)]
    model: Option<PathBuf>,
    /// Directory holding the ONNX model files.
    #[arg(long)]
    models_dir: Option<PathBuf>,
    /// Write the run summary as JSON to this file.
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn build_config(&self) -> Result<HarvestConfig> {
        let mut config = match (&self.config, self.preset) {
            (Some(path), _) => HarvestConfig::from_json_file(path)?,
            (None, Some(Preset::Fast)) => HarvestConfig::fast(),
            (None, Some(Preset::Thorough)) => HarvestConfig::thorough(),
            (None, None) => HarvestConfig::default(),
        };

        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(format) = self.format {
            config.crop.aspect_ratio = format;
        }
        if let Some(interval) = self.interval {
            config.sampling.frame_interval = interval;
        }
        if let Some(confidence) = self.confidence {
            config.detection.confidence = confidence;
        }
        if let Some(padding) = self.padding {
            config.crop.min_padding = padding;
        }
        if self.no_skip_text {
            config.text.skip_text = false;
        }
        if self.ensemble {
            config.detection.ensemble = true;
        }
        if !self.ensemble_models.is_empty() {
            config.select_models(&self.ensemble_models)?;
        }
        if let Some(weights) = &self.model {
            let first = config
                .detection
                .models
                .first_mut()
                .ok_or_else(|| HarvestError::Config("no model to override".to_string()))?;
            first.path = weights.clone();
        }
        if let Some(threshold) = self.voting_threshold {
            config.detection.consensus.voting_threshold = threshold;
        }
        if self.turbo {
            config.sampling.turbo = true;
        }
        if let Some(batch_size) = self.batch_size {
            config.sampling.batch_size = batch_size;
        }
        if let Some(dir) = &self.models_dir {
            config.detection.models_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// 进度条 + Ctrl-C 停止
struct ConsoleHooks {
    bar: ProgressBar,
    stop: StopFlag,
}

impl ConsoleHooks {
    fn new(stop: StopFlag) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}%")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, stop }
    }
}

impl RunHooks for ConsoleHooks {
    fn on_video_start(&mut self, name: &str, info: &VideoInfo) {
        self.bar.set_position(0);
        self.bar.set_message(format!(
            "{} ({}x{}, {:.1}s)",
            name, info.width, info.height, info.duration_secs
        ));
    }

    fn on_progress(&mut self, percent: f64, stats: &ProcessingStats) {
        self.bar.set_position(percent.clamp(0.0, 100.0) as u64);
        self.bar.set_message(format!("saved {}", stats.saved_frames));
    }

    fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.build_config()?;
    let mut harvester = Harvester::new(config)?;

    for (name, status) in &harvester.model_status().models {
        info!("🤖 {}: {:?}", name, status);
    }

    let stop = StopFlag::new();
    let handler_flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.stop()) {
        warn!("⚠️ Ctrl-C handler unavailable: {}", e);
    }

    let mut hooks = ConsoleHooks::new(stop);
    let result = harvester.run(&args.videos, &mut hooks);
    hooks.bar.finish_and_clear();
    let summary = result?;

    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)?;
        info!("📊 Summary written to {}", path.display());
    }
    if hooks.stop.is_stopped() {
        info!("⏹️ Stopped by user");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    lora_harvester::init_logging();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
