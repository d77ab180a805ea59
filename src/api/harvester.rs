//! 帧采集器 - 从配置组装检测器、文字过滤、裁剪器与驱动
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use lora_harvester::api::Harvester;
//! use lora_harvester::core::video::NoHooks;
//! use lora_harvester::core::HarvestConfig;
//!
//! let mut harvester = Harvester::new(HarvestConfig::default())?;
//! let summary = harvester.run(&[PathBuf::from("clip.mp4")], &mut NoHooks)?;
//! println!("{} frames saved", summary.total_frames_saved);
//! # Ok::<(), lora_harvester::core::HarvestError>(())
//! ```

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::core::config::{HarvestConfig, ModelSpec};
use crate::core::crop::SmartCropper;
use crate::core::detection::{
    DetectError, DetectionModel, EnsembleDetector, EnsembleStatus, ModelSlot, ObjectDetector,
    SingleModelDetector,
};
use crate::core::error::{HarvestError, Result};
use crate::core::video::{
    extract_single_frame, probe_video, BatchOrchestrator, DirectorySinkFactory, FfmpegOpener,
    Frame, FramePipeline, OcrEngine, OcrTextGate, OutputLayout, RunHooks, RunSummary,
    SinkFactory, SourceOpener, SubtitleGate, TextGate, VideoDriver, VideoInfo,
};

pub struct Harvester {
    config: HarvestConfig,
    pipeline: FramePipeline,
    orchestrator: BatchOrchestrator,
}

impl Harvester {
    /// Validate the config and build every model slot it names. A model that
    /// fails to load is kept as a failed slot; it is an error only when no
    /// slot is left that is ready or may still load.
    pub fn new(config: HarvestConfig) -> Result<Self> {
        config.validate()?;
        if cfg!(not(feature = "onnx")) {
            return Err(HarvestError::Config(
                "built without the `onnx` feature, supply a detector with Harvester::with_detector"
                    .to_string(),
            ));
        }

        let detector = build_detector(&config)?;
        let status = detector.model_status();
        if status.usable_count() == 0 {
            let names: Vec<&str> = status.models.iter().map(|(n, _)| n.as_str()).collect();
            return Err(HarvestError::Config(format!(
                "no detection model could be loaded (tried {})",
                names.join(", ")
            )));
        }
        Self::with_detector(config, detector)
    }

    /// Use a caller-built detector instead of the configured models.
    pub fn with_detector(config: HarvestConfig, detector: Box<dyn ObjectDetector>) -> Result<Self> {
        config.validate()?;
        crate::init_logging();

        let cropper = SmartCropper::from_config(&config.crop);
        let mut pipeline = FramePipeline::new(detector, cropper)
            .with_quality_threshold(config.crop.quality_threshold)
            .with_zoom(config.crop.zoom_factor);
        if config.text.skip_text {
            pipeline = pipeline.with_text_gate(Box::new(SubtitleGate::new()));
        }

        let orchestrator = BatchOrchestrator::new(VideoDriver::new(config.driver_options()));

        info!(
            "🎬 Harvester ready: {} crops, padding {}px, every {} frames, detector `{}`{}",
            config.crop.aspect_ratio,
            config.crop.min_padding,
            config.sampling.frame_interval,
            pipeline.mode_label(),
            if config.sampling.turbo { ", turbo" } else { "" }
        );

        Ok(Self {
            config,
            pipeline,
            orchestrator,
        })
    }

    /// Replace the subtitle heuristic with an OCR-backed gate when the config
    /// asks for OCR. The heuristic stays as the OCR gate's fallback.
    pub fn with_ocr_engine<E: OcrEngine + 'static>(mut self, engine: E) -> Self {
        if !self.config.text.skip_text {
            return self;
        }
        if !self.config.text.use_ocr {
            warn!("⚠️ OCR engine supplied but text.use_ocr is off, keeping heuristic gate");
            return self;
        }

        let mut gate = OcrTextGate::new(engine).with_min_coverage(self.config.text.ocr_min_coverage);
        if self.config.text.ocr_whole_frame {
            gate = gate.whole_frame();
        }
        self.pipeline = self.pipeline.with_text_gate(Box::new(gate));
        info!("🔤 OCR text gate enabled");
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn mode_label(&self) -> &str {
        self.pipeline.mode_label()
    }

    pub fn text_gate(&self) -> Option<&dyn TextGate> {
        self.pipeline.text_gate()
    }

    /// Per-model load state. Lazy models show `pending` until their first frame.
    pub fn model_status(&self) -> EnsembleStatus {
        self.pipeline.detector().model_status()
    }

    /// Directory the crops of `video` are written to.
    pub fn output_dir_for(&self, video: &Path) -> PathBuf {
        OutputLayout::for_video(
            &self.config.output_dir,
            video,
            self.config.crop.aspect_ratio,
            self.pipeline.mode_label(),
            self.config.sampling.turbo,
        )
        .base()
        .to_path_buf()
    }

    /// Decode with ffmpeg and write JPEGs under `config.output_dir`.
    pub fn run(&mut self, videos: &[PathBuf], hooks: &mut dyn RunHooks) -> Result<RunSummary> {
        let mut sinks = DirectorySinkFactory {
            root: self.config.output_dir.clone(),
            aspect: self.config.crop.aspect_ratio,
            turbo: self.config.sampling.turbo,
            jpeg_quality: self.config.jpeg_quality,
        };
        self.run_with(videos, &mut FfmpegOpener, &mut sinks, hooks)
    }

    pub fn run_with(
        &mut self,
        videos: &[PathBuf],
        opener: &mut dyn SourceOpener,
        sinks: &mut dyn SinkFactory,
        hooks: &mut dyn RunHooks,
    ) -> Result<RunSummary> {
        if videos.is_empty() {
            return Err(HarvestError::Config("no input videos".to_string()));
        }
        self.orchestrator
            .run(&mut self.pipeline, videos, opener, sinks, hooks)
    }

    pub fn probe(path: &Path) -> Result<VideoInfo> {
        probe_video(path)
    }

    /// Frame at 0-based position `index`, outside the sampling pipeline.
    pub fn extract_frame(path: &Path, index: u64) -> Result<Frame> {
        extract_single_frame(path, index)
    }
}

/// Slots in invocation order: every configured model in ensemble mode,
/// otherwise only the first, which is loaded up front whatever its policy.
pub fn build_detector(config: &HarvestConfig) -> Result<Box<dyn ObjectDetector>> {
    let mut slots: Vec<ModelSlot> = config
        .active_models()
        .iter()
        .map(|spec| model_slot(config, spec))
        .collect();

    if config.detection.ensemble {
        return Ok(Box::new(EnsembleDetector::new(
            slots,
            &config.detection.consensus,
        )));
    }

    if slots.is_empty() {
        return Err(HarvestError::Config("no detection model configured".to_string()));
    }
    let mut slot = slots.remove(0);
    slot.load();
    Ok(Box::new(SingleModelDetector::new(slot)))
}

fn model_slot(config: &HarvestConfig, spec: &ModelSpec) -> ModelSlot {
    let name = spec.name.clone();
    let path = config.model_path(spec);
    let input_size = spec.input_size;
    let confidence = config.model_confidence(spec);
    let class_offset = spec.class_offset;

    ModelSlot::new(
        spec.name.clone(),
        spec.load,
        Box::new(move || load_model(&name, &path, input_size, confidence, class_offset)),
    )
}

#[cfg(feature = "onnx")]
fn load_model(
    name: &str,
    path: &Path,
    input_size: u32,
    confidence: f32,
    class_offset: i32,
) -> std::result::Result<Box<dyn DetectionModel>, DetectError> {
    if !path.is_file() {
        return Err(DetectError::load(name, format!("{} not found", path.display())));
    }
    let model = crate::core::detection::yolo::YoloOnnxModel::load(
        name,
        path,
        input_size,
        confidence,
        class_offset,
    )?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "onnx"))]
fn load_model(
    name: &str,
    path: &Path,
    _input_size: u32,
    _confidence: f32,
    _class_offset: i32,
) -> std::result::Result<Box<dyn DetectionModel>, DetectError> {
    Err(DetectError::load(
        name,
        format!("{}: built without the `onnx` feature", path.display()),
    ))
}
