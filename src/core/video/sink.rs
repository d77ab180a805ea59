//! 输出：`<root>/<视频名>_<宽高比>_<模式>[_turbo]/{persons,animals,objects}/frame_<帧号>_q<质量>.jpg`

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageOutputFormat, RgbImage};
use log::info;

use crate::core::crop::AspectRatio;
use crate::core::detection::Category;
use crate::core::error::{HarvestError, Result};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

pub trait FrameSink {
    /// Persist one accepted crop, returning where it went.
    fn save(
        &mut self,
        image: &RgbImage,
        category: Category,
        frame_number: u64,
        quality: f64,
    ) -> Result<PathBuf>;
}

/// `frame_000123_q87.jpg`; the quality percentage is truncated.
pub fn frame_file_name(frame_number: u64, quality: f64) -> String {
    let pct = (quality * 100.0).clamp(0.0, 100.0) as u32;
    format!("frame_{:06}_q{}.jpg", frame_number, pct)
}

/// 输出目录结构
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    base: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path, video_name: &str, aspect: AspectRatio, mode: &str, turbo: bool) -> Self {
        let turbo_suffix = if turbo { "_turbo" } else { "" };
        let dir = format!(
            "{}_{}_{}{}",
            video_name,
            aspect.dir_label(),
            mode,
            turbo_suffix
        );
        Self {
            base: root.join(dir),
        }
    }

    /// Video name is the file stem of `video_path`.
    pub fn for_video(
        root: &Path,
        video_path: &Path,
        aspect: AspectRatio,
        mode: &str,
        turbo: bool,
    ) -> Self {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self::new(root, &stem, aspect, mode, turbo)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.base.join(category.dir_name())
    }

    pub fn create_dirs(&self) -> Result<()> {
        for category in Category::ALL {
            fs::create_dir_all(self.category_dir(category))?;
        }
        info!("📁 Output: {}", self.base.display());
        Ok(())
    }
}

/// 写入 JPEG 文件的输出端
pub struct DirectorySink {
    layout: OutputLayout,
    jpeg_quality: u8,
}

impl DirectorySink {
    /// Creates the category directories up front.
    pub fn create(layout: OutputLayout, jpeg_quality: u8) -> Result<Self> {
        layout.create_dirs()?;
        Ok(Self {
            layout,
            jpeg_quality,
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
    Ok(buffer.into_inner())
}

impl FrameSink for DirectorySink {
    fn save(
        &mut self,
        image: &RgbImage,
        category: Category,
        frame_number: u64,
        quality: f64,
    ) -> Result<PathBuf> {
        // 先在内存中完整编码，再一次性写入
        let bytes = encode_jpeg(image, self.jpeg_quality)?;
        let path = self
            .layout
            .category_dir(category)
            .join(frame_file_name(frame_number, quality));
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedFrame {
    pub category: Category,
    pub frame_number: u64,
    pub quality: f64,
    pub width: u32,
    pub height: u32,
}

/// 内存输出端（测试用）
#[derive(Debug, Default)]
pub struct MemorySink {
    pub saved: Vec<SavedFrame>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save fails with an I/O error.
    pub fn failing() -> Self {
        Self {
            saved: Vec::new(),
            fail: true,
        }
    }

    pub fn frame_numbers(&self) -> Vec<u64> {
        self.saved.iter().map(|s| s.frame_number).collect()
    }
}

impl FrameSink for MemorySink {
    fn save(
        &mut self,
        image: &RgbImage,
        category: Category,
        frame_number: u64,
        quality: f64,
    ) -> Result<PathBuf> {
        if self.fail {
            return Err(HarvestError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only output",
            )));
        }
        self.saved.push(SavedFrame {
            category,
            frame_number,
            quality,
            width: image.width(),
            height: image.height(),
        });
        Ok(PathBuf::from(category.dir_name()).join(frame_file_name(frame_number, quality)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(frame_file_name(30, 0.9398), "frame_000030_q93.jpg");
        assert_eq!(frame_file_name(1234567, 1.0), "frame_1234567_q100.jpg");
    }

    #[test]
    fn test_layout_naming() {
        let layout = OutputLayout::for_video(
            Path::new("/out"),
            Path::new("/videos/holiday.mp4"),
            AspectRatio::Portrait9x16,
            "yolo",
            false,
        );
        assert_eq!(layout.base(), Path::new("/out/holiday_9x16_yolo"));
        assert_eq!(
            layout.category_dir(Category::Animal),
            Path::new("/out/holiday_9x16_yolo/animals")
        );

        let turbo = OutputLayout::new(Path::new("/out"), "clip", AspectRatio::Square, "ensemble", true);
        assert_eq!(turbo.base(), Path::new("/out/clip_1x1_ensemble_turbo"));
    }

    #[test]
    fn test_directory_sink_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "clip", AspectRatio::Square, "yolo", false);
        let mut sink = DirectorySink::create(layout, DEFAULT_JPEG_QUALITY).unwrap();

        for category in Category::ALL {
            assert!(sink.layout().category_dir(category).is_dir());
        }

        let image = RgbImage::from_pixel(64, 48, image::Rgb([200, 100, 50]));
        let path = sink.save(&image, Category::Person, 30, 0.875).unwrap();

        assert_eq!(
            path,
            dir.path().join("clip_1x1_yolo/persons/frame_000030_q87.jpg")
        );
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_memory_sink() {
        let image = RgbImage::new(4, 4);
        let mut sink = MemorySink::new();
        sink.save(&image, Category::Object, 2, 0.5).unwrap();
        assert_eq!(sink.frame_numbers(), vec![2]);

        let mut broken = MemorySink::failing();
        assert!(broken.save(&image, Category::Object, 2, 0.5).is_err());
        assert!(broken.saved.is_empty());
    }
}
