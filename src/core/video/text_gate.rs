//! 字幕 / 文字检测 - 命中则跳过该帧
//!
//! - `SubtitleGate`：底部 25% 区域的边缘特征启发式，无 OCR，足够快用于批量预筛
//! - `OcrTextGate`：OCR 文字框面积占比，出错时回退到启发式

use log::debug;

use crate::core::detection::{BoundingBox, DetectError};
use crate::core::video::frame::Frame;

/// Portion of the frame, from the bottom, where subtitles are looked for.
pub const SUBTITLE_REGION: f64 = 0.25;
/// OCR text area / region area above which a frame counts as text.
pub const MIN_TEXT_COVERAGE: f32 = 0.015;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDetectionResult {
    pub has_text: bool,
    /// Text area / inspected area. Always 0 for the heuristic gate.
    pub coverage: f32,
    pub text_region_count: u32,
}

pub trait TextGate: Send + Sync {
    fn detect(&self, frame: &Frame) -> TextDetectionResult;

    fn has_text(&self, frame: &Frame) -> bool {
        self.detect(frame).has_text
    }

    /// Cheap pre-filter used by batched processing.
    fn quick_check(&self, frame: &Frame) -> bool {
        self.has_text(frame)
    }
}

impl<T: TextGate + ?Sized> TextGate for Box<T> {
    fn detect(&self, frame: &Frame) -> TextDetectionResult {
        (**self).detect(frame)
    }

    fn has_text(&self, frame: &Frame) -> bool {
        (**self).has_text(frame)
    }

    fn quick_check(&self, frame: &Frame) -> bool {
        (**self).quick_check(frame)
    }
}

pub struct MockTextGate {
    // 模拟在特定帧编号有文字
    text_frame_pattern: Option<Box<dyn Fn(u64) -> bool + Send + Sync>>,
}

impl MockTextGate {
    pub fn new() -> Self {
        Self {
            text_frame_pattern: None,
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self {
            text_frame_pattern: Some(Box::new(pattern)),
        }
    }

    pub fn with_fixed_frames(frames: Vec<u64>) -> Self {
        Self {
            text_frame_pattern: Some(Box::new(move |frame_num| frames.contains(&frame_num))),
        }
    }
}

impl Default for MockTextGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGate for MockTextGate {
    fn detect(&self, frame: &Frame) -> TextDetectionResult {
        let has_text = self
            .text_frame_pattern
            .as_ref()
            .map(|p| p(frame.frame_number))
            .unwrap_or(false);

        TextDetectionResult {
            has_text,
            coverage: if has_text { 0.05 } else { 0.0 },
            text_region_count: if has_text { 2 } else { 0 },
        }
    }
}

/// 底部字幕启发式检测
///
/// Rows with enough horizontal edges form bands; each band is split into
/// column segments on wide gaps. A segment is text-like when it is wide
/// (aspect > 2.5, wider than 8% of the frame), larger than 100 px² and sits
/// below the top 30% of the subtitle region. Two or more such segments mean
/// subtitles.
#[derive(Debug, Clone)]
pub struct SubtitleGate {
    region_ratio: f64,
    edge_threshold: i16,
    min_row_density: f32,
    min_aspect: f32,
    min_width_ratio: f32,
    min_area: u32,
    min_regions: u32,
}

impl SubtitleGate {
    pub fn new() -> Self {
        Self {
            region_ratio: SUBTITLE_REGION,
            edge_threshold: 30,
            min_row_density: 0.02,
            min_aspect: 2.5,
            min_width_ratio: 0.08,
            min_area: 100,
            min_regions: 2,
        }
    }

    fn text_like_segments(&self, frame: &Frame) -> u32 {
        let w = frame.width as usize;
        let h = frame.height as usize;
        if w < 3 || h == 0 || frame.data.len() < w * h * 3 {
            return 0;
        }

        let gray = frame.to_gray();
        let y_start = (h as f64 * (1.0 - self.region_ratio)) as usize;
        let region_h = h - y_start;
        if region_h == 0 {
            return 0;
        }

        // 水平边缘掩码
        let mut edges = vec![false; region_h * w];
        let mut row_counts = vec![0u32; region_h];
        for local_y in 0..region_h {
            let row = &gray[(y_start + local_y) * w..(y_start + local_y + 1) * w];
            for x in 1..w - 1 {
                let diff = (row[x + 1] as i16 - row[x - 1] as i16).abs();
                if diff > self.edge_threshold {
                    edges[local_y * w + x] = true;
                    row_counts[local_y] += 1;
                }
            }
        }

        let row_threshold = (w as f32 * self.min_row_density).max(2.0) as u32;
        let valid: Vec<bool> = row_counts.iter().map(|&c| c > row_threshold).collect();

        let mut count = 0;
        for (y0, y1) in Self::bands(&valid) {
            let band_h = y1 - y0 + 1;
            let columns: Vec<bool> = (0..w)
                .map(|x| (y0..=y1).any(|y| edges[y * w + x]))
                .collect();

            let max_gap = band_h.max(4);
            for (x0, x1) in Self::segments(&columns, max_gap) {
                let seg_w = (x1 - x0 + 1) as f32;
                let seg_h = band_h as f32;
                let aspect = seg_w / seg_h;
                let area = (seg_w * seg_h) as u32;

                if aspect > self.min_aspect
                    && seg_w > w as f32 * self.min_width_ratio
                    && area > self.min_area
                    && y0 as f32 > region_h as f32 * 0.3
                {
                    count += 1;
                }
            }
        }
        count
    }

    /// Runs of consecutive `true` rows as inclusive ranges.
    fn bands(valid: &[bool]) -> Vec<(usize, usize)> {
        let mut bands = Vec::new();
        let mut start = None;
        for (i, &v) in valid.iter().enumerate() {
            match (v, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    bands.push((s, i - 1));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            bands.push((s, valid.len() - 1));
        }
        bands
    }

    /// Column runs, bridging gaps of up to `max_gap` empty columns.
    fn segments(columns: &[bool], max_gap: usize) -> Vec<(usize, usize)> {
        let mut segments = Vec::new();
        let mut current: Option<(usize, usize)> = None;
        for (x, &on) in columns.iter().enumerate() {
            if !on {
                continue;
            }
            current = match current {
                Some((s, e)) if x - e - 1 <= max_gap => Some((s, x)),
                Some(seg) => {
                    segments.push(seg);
                    Some((x, x))
                }
                None => Some((x, x)),
            };
        }
        segments.extend(current);
        segments
    }
}

impl Default for SubtitleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGate for SubtitleGate {
    fn detect(&self, frame: &Frame) -> TextDetectionResult {
        let regions = self.text_like_segments(frame);
        TextDetectionResult {
            has_text: regions >= self.min_regions,
            coverage: 0.0,
            text_region_count: regions,
        }
    }
}

/// 外部 OCR 引擎：返回图像内文字框
pub trait OcrEngine: Send + Sync {
    fn read_text(&self, image: &image::RgbImage) -> Result<Vec<BoundingBox>, DetectError>;
}

pub struct OcrTextGate<E: OcrEngine> {
    engine: E,
    fallback: SubtitleGate,
    min_coverage: f32,
    subtitle_region_only: bool,
}

impl<E: OcrEngine> OcrTextGate<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            fallback: SubtitleGate::new(),
            min_coverage: MIN_TEXT_COVERAGE,
            subtitle_region_only: true,
        }
    }

    /// Inspect the whole frame instead of the bottom quarter.
    pub fn whole_frame(mut self) -> Self {
        self.subtitle_region_only = false;
        self
    }

    pub fn with_min_coverage(mut self, min_coverage: f32) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    fn region_image(&self, frame: &Frame) -> Option<image::RgbImage> {
        let y = if self.subtitle_region_only {
            (frame.height as f64 * (1.0 - SUBTITLE_REGION)) as u32
        } else {
            0
        };
        frame.crop_region(0, y, frame.width, frame.height.saturating_sub(y))
    }
}

impl<E: OcrEngine> TextGate for OcrTextGate<E> {
    fn detect(&self, frame: &Frame) -> TextDetectionResult {
        let Some(region) = self.region_image(frame) else {
            return self.fallback.detect(frame);
        };
        let region_area = region.width() as f64 * region.height() as f64;

        match self.engine.read_text(&region) {
            Ok(boxes) => {
                let text_area: i64 = boxes.iter().map(|b| b.area().max(0)).sum();
                let coverage = if region_area > 0.0 {
                    (text_area as f64 / region_area) as f32
                } else {
                    0.0
                };
                TextDetectionResult {
                    has_text: coverage > self.min_coverage,
                    coverage,
                    text_region_count: boxes.len() as u32,
                }
            }
            Err(e) => {
                debug!("OCR failed on frame {}, using heuristic: {}", frame.frame_number, e);
                self.fallback.detect(frame)
            }
        }
    }

    fn quick_check(&self, frame: &Frame) -> bool {
        self.fallback.has_text(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 320x240 grey frame with striped "subtitle lines" at the given rows.
    fn frame_with_lines(lines: &[(u32, u32)]) -> Frame {
        let (w, h) = (320u32, 240u32);
        let mut data = vec![60u8; (w * h * 3) as usize];
        for &(y0, y1) in lines {
            for y in y0..y1 {
                for x in 40..200 {
                    let v = if x % 4 < 2 { 250 } else { 10 };
                    let idx = ((y * w + x) * 3) as usize;
                    data[idx..idx + 3].copy_from_slice(&[v, v, v]);
                }
            }
        }
        Frame::new(w, h, data, 0, 1)
    }

    #[test]
    fn test_plain_frame_has_no_text() {
        let gate = SubtitleGate::new();
        let result = gate.detect(&Frame::filled(320, 240, 90, 1));
        assert!(!result.has_text);
        assert_eq!(result.text_region_count, 0);
    }

    #[test]
    fn test_two_subtitle_lines_detected() {
        let gate = SubtitleGate::new();
        let result = gate.detect(&frame_with_lines(&[(200, 209), (215, 224)]));
        assert_eq!(result.text_region_count, 2);
        assert!(result.has_text);
    }

    #[test]
    fn test_single_line_is_not_enough() {
        let gate = SubtitleGate::new();
        assert!(!gate.has_text(&frame_with_lines(&[(215, 224)])));
    }

    #[test]
    fn test_lines_above_subtitle_zone_ignored() {
        let gate = SubtitleGate::new();
        assert!(!gate.has_text(&frame_with_lines(&[(40, 49), (60, 69)])));
    }

    #[test]
    fn test_segments_bridge_small_gaps() {
        let cols = [true, true, false, false, true, false, false, false, false, false, true];
        assert_eq!(SubtitleGate::segments(&cols, 4), vec![(0, 4), (10, 10)]);
        assert_eq!(SubtitleGate::bands(&[false, true, true, false, true]), vec![(1, 2), (4, 4)]);
    }

    struct FixedOcr(Result<Vec<BoundingBox>, ()>);

    impl OcrEngine for FixedOcr {
        fn read_text(&self, _image: &image::RgbImage) -> Result<Vec<BoundingBox>, DetectError> {
            self.0
                .clone()
                .map_err(|_| DetectError::inference("ocr", "engine crashed"))
        }
    }

    #[test]
    fn test_ocr_coverage_threshold() {
        // Bottom quarter of 320x240 is 320x60 = 19200 px²
        let frame = Frame::filled(320, 240, 90, 1);

        let sparse = OcrTextGate::new(FixedOcr(Ok(vec![BoundingBox::new(0, 0, 20, 10)])));
        let result = sparse.detect(&frame);
        assert!(!result.has_text);
        assert!((result.coverage - 200.0 / 19200.0).abs() < 1e-6);

        let dense = OcrTextGate::new(FixedOcr(Ok(vec![BoundingBox::new(0, 0, 200, 20)])));
        assert!(dense.has_text(&frame));
    }

    /// Reports one box per bright row it is handed.
    struct RowCountingOcr;

    impl OcrEngine for RowCountingOcr {
        fn read_text(&self, image: &image::RgbImage) -> Result<Vec<BoundingBox>, DetectError> {
            let width = image.width() as i32;
            Ok((0..image.height())
                .filter(|&y| image.get_pixel(0, y).0[0] > 200)
                .map(|y| BoundingBox::new(0, y as i32, width, y as i32 + 1))
                .collect())
        }
    }

    #[test]
    fn test_ocr_sees_bottom_quarter_pixels() {
        // Rows 180..=239 form the bottom quarter; rows 190..200 are bright
        let (w, h) = (320u32, 240u32);
        let mut data = vec![60u8; (w * h * 3) as usize];
        for y in 190..200u32 {
            let start = (y * w * 3) as usize;
            data[start..start + (w * 3) as usize].fill(250);
        }
        let frame = Frame::new(w, h, data, 0, 1);

        let result = OcrTextGate::new(RowCountingOcr).detect(&frame);
        assert!((result.coverage - 10.0 / 60.0).abs() < 1e-6);
        assert!(result.has_text);

        let whole = OcrTextGate::new(RowCountingOcr).whole_frame().detect(&frame);
        assert!((whole.coverage - 10.0 / 240.0).abs() < 1e-6);
    }

    #[test]
    fn test_ocr_failure_falls_back_to_heuristic() {
        let gate = OcrTextGate::new(FixedOcr(Err(())));
        assert!(gate.has_text(&frame_with_lines(&[(200, 209), (215, 224)])));
        assert!(!gate.has_text(&Frame::filled(320, 240, 90, 1)));
    }

    #[test]
    fn test_mock_gate_pattern() {
        let gate = MockTextGate::with_fixed_frames(vec![4]);
        assert!(gate.has_text(&Frame::filled(4, 4, 0, 4)));
        assert!(!gate.has_text(&Frame::filled(4, 4, 0, 5)));
        assert!(gate.quick_check(&Frame::filled(4, 4, 0, 4)));
    }
}
