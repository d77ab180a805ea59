//! 运行配置：JSON 文件 + 默认值 + 预设
//!
//! ```json
//! {
//!   "output_dir": "output",
//!   "crop": { "aspect_ratio": "9:16", "min_padding": 500 },
//!   "detection": { "ensemble": true, "consensus": { "voting_threshold": 2 } },
//!   "sampling": { "frame_interval": 30, "turbo": true, "batch_size": 4 }
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use super::crop::CropConfig;
use super::detection::{ConsensusConfig, LoadPolicy};
use super::error::{HarvestError, Result};
use super::video::sink::DEFAULT_JPEG_QUALITY;
use super::video::{DriverOptions, ProcessingMode};

/// 单个检测模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// Relative paths resolve against `detection.models_dir`
    pub path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Overrides `detection.confidence` for this model
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Added to raw class ids, e.g. -1 for 1-based label spaces
    #[serde(default)]
    pub class_offset: i32,
    #[serde(default)]
    pub load: LoadPolicy,
}

fn default_input_size() -> u32 {
    640
}

impl ModelSpec {
    pub fn new(name: &str, path: &str, load: LoadPolicy) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(path),
            input_size: default_input_size(),
            confidence: None,
            class_offset: 0,
            load,
        }
    }

    pub fn with_class_offset(mut self, class_offset: i32) -> Self {
        self.class_offset = class_offset;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub models_dir: PathBuf,
    /// Invocation order; single-model mode uses the first entry
    pub models: Vec<ModelSpec>,
    pub ensemble: bool,
    pub confidence: f32,
    pub consensus: ConsensusConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            models: vec![
                ModelSpec::new("yolo", "yolov8n.onnx", LoadPolicy::Eager),
                ModelSpec::new("detr", "detr_resnet50.onnx", LoadPolicy::Lazy),
                ModelSpec::new("fasterrcnn", "fasterrcnn_resnet50.onnx", LoadPolicy::Lazy)
                    .with_class_offset(-1),
            ],
            ensemble: false,
            confidence: 0.5,
            consensus: ConsensusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub frame_interval: u64,
    pub turbo: bool,
    pub batch_size: usize,
    pub progress_every: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frame_interval: 30,
            turbo: false,
            batch_size: 4,
            progress_every: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub skip_text: bool,
    /// Use an OCR engine when one is supplied; otherwise the subtitle heuristic
    pub use_ocr: bool,
    pub ocr_min_coverage: f32,
    pub ocr_whole_frame: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            skip_text: true,
            use_ocr: false,
            ocr_min_coverage: crate::core::video::text_gate::MIN_TEXT_COVERAGE,
            ocr_whole_frame: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
    pub crop: CropConfig,
    pub detection: DetectionConfig,
    pub sampling: SamplingConfig,
    pub text: TextConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            crop: CropConfig::default(),
            detection: DetectionConfig::default(),
            sampling: SamplingConfig::default(),
            text: TextConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// 快速预设：turbo，大批次，稀疏采样
    pub fn fast() -> Self {
        let mut config = Self::default();
        config.sampling.turbo = true;
        config.sampling.batch_size = 8;
        config.sampling.frame_interval = 60;
        config
    }

    /// 精细预设：密集采样，全部模型投票
    pub fn thorough() -> Self {
        let mut config = Self::default();
        config.sampling.frame_interval = 15;
        config.detection.ensemble = true;
        config
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!("📦 Config loaded from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(HarvestError::Config(msg));

        if self.sampling.frame_interval == 0 {
            return fail("sampling.frame_interval must be at least 1".into());
        }
        if self.sampling.batch_size == 0 {
            return fail("sampling.batch_size must be at least 1".into());
        }
        if self.sampling.progress_every == 0 {
            return fail("sampling.progress_every must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return fail(format!(
                "detection.confidence {} is outside [0, 1]",
                self.detection.confidence
            ));
        }
        let consensus = &self.detection.consensus;
        if !(consensus.iou_threshold > 0.0 && consensus.iou_threshold <= 1.0) {
            return fail(format!(
                "detection.consensus.iou_threshold {} is outside (0, 1]",
                consensus.iou_threshold
            ));
        }
        if consensus.voting_threshold == 0 {
            return fail("detection.consensus.voting_threshold must be at least 1".into());
        }
        if self.detection.models.is_empty() {
            return fail("detection.models is empty".into());
        }
        let mut names = HashSet::new();
        for model in &self.detection.models {
            if !names.insert(model.name.as_str()) {
                return fail(format!("duplicate model name `{}`", model.name));
            }
            if let Some(c) = model.confidence {
                if !(0.0..=1.0).contains(&c) {
                    return fail(format!("model `{}` confidence {} is outside [0, 1]", model.name, c));
                }
            }
            if model.input_size == 0 {
                return fail(format!("model `{}` input_size must be positive", model.name));
            }
        }
        if !(0.0..=1.0).contains(&self.crop.quality_threshold) {
            return fail(format!(
                "crop.quality_threshold {} is outside [0, 1]",
                self.crop.quality_threshold
            ));
        }
        if let Some(zoom) = self.crop.zoom_factor {
            if zoom.is_nan() || zoom <= 0.0 {
                return fail(format!("crop.zoom_factor {} must be positive", zoom));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return fail(format!("jpeg_quality {} is outside 1..=100", self.jpeg_quality));
        }
        Ok(())
    }

    /// Keep only the named models, in the given order.
    pub fn select_models(&mut self, names: &[String]) -> Result<()> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let spec = self
                .detection
                .models
                .iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| HarvestError::Config(format!("unknown model `{}`", name)))?;
            selected.push(spec.clone());
        }
        self.detection.models = selected;
        Ok(())
    }

    /// Models the detector is built from, in invocation order.
    pub fn active_models(&self) -> &[ModelSpec] {
        if self.detection.ensemble {
            &self.detection.models
        } else {
            &self.detection.models[..self.detection.models.len().min(1)]
        }
    }

    pub fn model_path(&self, spec: &ModelSpec) -> PathBuf {
        if spec.path.is_absolute() {
            spec.path.clone()
        } else {
            self.detection.models_dir.join(&spec.path)
        }
    }

    pub fn model_confidence(&self, spec: &ModelSpec) -> f32 {
        spec.confidence.unwrap_or(self.detection.confidence)
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        if self.sampling.turbo {
            ProcessingMode::Turbo {
                batch_size: self.sampling.batch_size,
            }
        } else {
            ProcessingMode::Standard
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            frame_interval: self.sampling.frame_interval,
            mode: self.processing_mode(),
            progress_every: self.sampling.progress_every,
        }
    }
}
