use std::time::Duration;

use image::RgbImage;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB24 格式
    pub timestamp: Duration,
    /// 1-based position in the source stream
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// Solid grey frame.
    pub fn filled(width: u32, height: u32, value: u8, frame_number: u64) -> Self {
        let data = vec![value; (width * height * 3) as usize];
        Self::new(width, height, data, frame_number * 33, frame_number)
    }

    pub fn from_image(image: RgbImage, timestamp_ms: u64, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw(), timestamp_ms, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Borrowing view as an `image` buffer. `None` if `data` has the wrong length.
    pub fn as_image(&self) -> Option<image::ImageBuffer<image::Rgb<u8>, &[u8]>> {
        image::ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Owned copy of a rectangle, row by row. `None` if the rectangle leaves
    /// the frame or `data` has the wrong length.
    pub fn crop_region(&self, x: u32, y: u32, width: u32, height: u32) -> Option<RgbImage> {
        let (fw, fh) = (self.width as usize, self.height as usize);
        let (x, y, w, h) = (x as usize, y as usize, width as usize, height as usize);
        if self.data.len() != fw * fh * 3 || x + w > fw || y + h > fh {
            return None;
        }

        let row_bytes = w * 3;
        let mut data = Vec::with_capacity(row_bytes * h);
        for row in y..y + h {
            let start = (row * fw + x) * 3;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        RgbImage::from_raw(width, height, data)
    }

    /// 灰度（整数 BT.601 权重）
    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|rgb| {
                let r = rgb[0] as u32;
                let g = rgb[1] as u32;
                let b = rgb[2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            })
            .collect()
    }
}

/// 帧元数据（轻量级，用于传递信息）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl FrameInfo {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            timestamp_ms: frame.timestamp.as_millis() as u64,
            frame_number: frame.frame_number,
        }
    }
}
