//! 智能裁剪几何
//!
//! 主体框 → 加边距 → 适配目标宽高比 → 超出画面则等比缩小 →
//! 人物头部留白微调 → 以主体为中心定位并夹紧到画面内

use log::debug;
use serde::{Deserialize, Serialize};

use super::aspect::AspectRatio;
use crate::core::detection::{BoundingBox, Category};

/// Head space below this ratio shifts the crop up.
pub const MIN_HEAD_SPACE: f64 = 0.05;
/// Head space above this ratio shifts the crop down.
pub const MAX_HEAD_SPACE: f64 = 0.25;
/// Head-room nudge as a fraction of crop height.
pub const HEAD_SHIFT: f64 = 0.1;

/// 裁剪框 (x, y, width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.right() <= frame_width && self.bottom() <= frame_height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub aspect_ratio: AspectRatio,
    /// Pixels added on every side of the subject before fitting the aspect ratio
    pub min_padding: u32,
    /// Crops narrower or shorter than this are rejected
    pub min_crop_side: u32,
    pub quality_threshold: f64,
    /// Optional zoom applied to accepted crops, > 1 zooms in
    pub zoom_factor: Option<f64>,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Portrait9x16,
            min_padding: 500,
            min_crop_side: 32,
            quality_threshold: super::quality::QUALITY_THRESHOLD,
            zoom_factor: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmartCropper {
    aspect_ratio: AspectRatio,
    min_padding: u32,
    min_crop_side: u32,
}

impl SmartCropper {
    pub fn new(aspect_ratio: AspectRatio, min_padding: u32) -> Self {
        Self {
            aspect_ratio,
            min_padding,
            min_crop_side: 32,
        }
    }

    pub fn from_config(config: &CropConfig) -> Self {
        Self::new(config.aspect_ratio, config.min_padding).with_min_crop_side(config.min_crop_side)
    }

    pub fn with_min_crop_side(mut self, min_crop_side: u32) -> Self {
        self.min_crop_side = min_crop_side;
        self
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Compute the crop around `subject`, or `None` when the result would be
    /// smaller than `min_crop_side` on either axis.
    ///
    /// `head_space` only matters for persons and is ignored when ≤ 0.
    pub fn calculate_crop_box(
        &self,
        frame_width: u32,
        frame_height: u32,
        subject: &BoundingBox,
        category: Category,
        head_space: f64,
    ) -> Option<CropBox> {
        let frame_w = frame_width as i64;
        let frame_h = frame_height as i64;
        let ratio = self.aspect_ratio.ratio();

        let (center_x, mut center_y) = subject.center();
        let padding = 2 * self.min_padding as i64;
        let padded_w = subject.width() + padding;
        let padded_h = subject.height() + padding;
        if padded_w <= 0 || padded_h <= 0 {
            return None;
        }

        let (mut crop_w, mut crop_h) = if padded_w as f64 / padded_h as f64 > ratio {
            (padded_w, (padded_w as f64 / ratio) as i64)
        } else {
            ((padded_h as f64 * ratio) as i64, padded_h)
        };

        if crop_w > frame_w || crop_h > frame_h {
            let scale = (frame_w as f64 / crop_w as f64).min(frame_h as f64 / crop_h as f64);
            crop_w = (crop_w as f64 * scale) as i64;
            crop_h = (crop_h as f64 * scale) as i64;
        }

        if crop_w <= 0
            || crop_h <= 0
            || crop_w < self.min_crop_side as i64
            || crop_h < self.min_crop_side as i64
        {
            debug!(
                "Crop {}x{} below minimum side {}, rejected",
                crop_w, crop_h, self.min_crop_side
            );
            return None;
        }

        if category == Category::Person && head_space > 0.0 {
            let shift = (crop_h as f64 * HEAD_SHIFT) as i64;
            if head_space < MIN_HEAD_SPACE {
                center_y -= shift;
            } else if head_space > MAX_HEAD_SPACE {
                center_y += shift;
            }
        }

        let crop_x = (center_x - crop_w.div_euclid(2)).min(frame_w - crop_w).max(0);
        let crop_y = (center_y - crop_h.div_euclid(2)).min(frame_h - crop_h).max(0);

        Some(CropBox::new(
            crop_x as u32,
            crop_y as u32,
            crop_w as u32,
            crop_h as u32,
        ))
    }
}
