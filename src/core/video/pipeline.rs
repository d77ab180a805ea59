//! 单帧处理流程
//!
//! 文字检测 → 目标检测 → 选主体 → 计算裁剪框 → 质量评分 → 裁剪 → 保存

use std::path::PathBuf;

use log::{debug, warn};

use super::frame::Frame;
use super::sink::FrameSink;
use super::stats::ProcessingStats;
use super::text_gate::TextGate;
use crate::core::crop::quality::{passes, quality_score, QUALITY_THRESHOLD};
use crate::core::crop::{adaptive_zoom, apply_crop, CropBox, SmartCropper};
use crate::core::detection::{
    head_space_ratio, select_primary_subject, CategorizedDetections, Category, ObjectDetector,
};
use crate::core::error::Result;

/// What happened to one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    SkippedText,
    NoDetection,
    Infeasible,
    LowQuality {
        crop: CropBox,
        quality: f64,
    },
    Saved {
        category: Category,
        crop: CropBox,
        quality: f64,
        path: PathBuf,
    },
}

pub struct FramePipeline {
    detector: Box<dyn ObjectDetector>,
    text_gate: Option<Box<dyn TextGate>>,
    cropper: SmartCropper,
    quality_threshold: f64,
    zoom_factor: Option<f64>,
}

impl FramePipeline {
    pub fn new(detector: Box<dyn ObjectDetector>, cropper: SmartCropper) -> Self {
        Self {
            detector,
            text_gate: None,
            cropper,
            quality_threshold: QUALITY_THRESHOLD,
            zoom_factor: None,
        }
    }

    pub fn with_text_gate(mut self, gate: Box<dyn TextGate>) -> Self {
        self.text_gate = Some(gate);
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_zoom(mut self, zoom_factor: Option<f64>) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }

    pub fn text_gate(&self) -> Option<&dyn TextGate> {
        self.text_gate.as_deref()
    }

    pub fn mode_label(&self) -> &str {
        self.detector.mode_label()
    }

    pub fn detector(&self) -> &dyn ObjectDetector {
        self.detector.as_ref()
    }

    pub fn cropper(&self) -> &SmartCropper {
        &self.cropper
    }

    /// Full sequence including the text gate.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        sink: &mut dyn FrameSink,
        stats: &mut ProcessingStats,
    ) -> Result<FrameOutcome> {
        stats.processed_frames += 1;

        if let Some(gate) = &self.text_gate {
            if gate.has_text(frame) {
                stats.skipped_text += 1;
                return Ok(FrameOutcome::SkippedText);
            }
        }

        self.detect_and_crop(frame, sink, stats)
    }

    /// Frame already rejected by a batch pre-filter.
    pub fn record_text_skip(&self, stats: &mut ProcessingStats) -> FrameOutcome {
        stats.processed_frames += 1;
        stats.skipped_text += 1;
        FrameOutcome::SkippedText
    }

    /// Frame already cleared by a batch pre-filter.
    pub fn process_prefiltered(
        &mut self,
        frame: &Frame,
        sink: &mut dyn FrameSink,
        stats: &mut ProcessingStats,
    ) -> Result<FrameOutcome> {
        stats.processed_frames += 1;
        self.detect_and_crop(frame, sink, stats)
    }

    fn detect_and_crop(
        &mut self,
        frame: &Frame,
        sink: &mut dyn FrameSink,
        stats: &mut ProcessingStats,
    ) -> Result<FrameOutcome> {
        let detections = match self.detector.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                warn!("⚠️ Detection failed on frame {}: {}", frame.frame_number, e);
                CategorizedDetections::new()
            }
        };

        let Some(subject) = select_primary_subject(&detections) else {
            stats.skipped_no_detection += 1;
            return Ok(FrameOutcome::NoDetection);
        };
        let category = subject.category;
        let bbox = subject.detection.bbox;

        let head_space = if category == Category::Person {
            head_space_ratio(&bbox, frame.height)
        } else {
            0.0
        };

        let Some(crop) =
            self.cropper
                .calculate_crop_box(frame.width, frame.height, &bbox, category, head_space)
        else {
            stats.skipped_infeasible += 1;
            return Ok(FrameOutcome::Infeasible);
        };

        let quality = quality_score(frame.width, frame.height, &crop, &bbox);
        if !passes(quality, self.quality_threshold) {
            debug!(
                "Frame {}: quality {:.3} too low, dropped",
                frame.frame_number, quality
            );
            stats.dropped_low_quality += 1;
            return Ok(FrameOutcome::LowQuality { crop, quality });
        }

        let image = match self.zoom_factor {
            Some(zoom) => adaptive_zoom(frame, &crop, zoom)?,
            None => apply_crop(frame, &crop)?,
        };

        let path = sink.save(&image, category, frame.frame_number, quality)?;
        stats.record_saved(category);
        debug!(
            "💾 Frame {} -> {} ({} q{:.2})",
            frame.frame_number,
            path.display(),
            category,
            quality
        );

        Ok(FrameOutcome::Saved {
            category,
            crop,
            quality,
            path,
        })
    }
}
