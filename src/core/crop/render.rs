use image::imageops::{self, FilterType};
use image::RgbImage;

use super::geometry::CropBox;
use crate::core::error::{HarvestError, Result};
use crate::core::video::Frame;

/// Rectangular slice of the frame.
pub fn apply_crop(frame: &Frame, crop: &CropBox) -> Result<RgbImage> {
    if frame.as_image().is_none() {
        return Err(HarvestError::Decode(format!(
            "frame {} buffer does not match {}x{}",
            frame.frame_number, frame.width, frame.height
        )));
    }
    frame
        .crop_region(crop.x, crop.y, crop.width, crop.height)
        .ok_or_else(|| {
            HarvestError::Decode(format!(
                "crop {:?} outside {}x{} frame",
                crop, frame.width, frame.height
            ))
        })
}

/// Box of `size / zoom` sharing the crop's centre, clamped into the frame.
/// A zoom of 1 or less leaves the crop unchanged.
pub fn zoom_box(crop: &CropBox, zoom: f64, frame_width: u32, frame_height: u32) -> CropBox {
    if zoom.is_nan() || zoom <= 1.0 {
        return *crop;
    }

    let new_w = ((crop.width as f64 / zoom) as u32).max(1);
    let new_h = ((crop.height as f64 / zoom) as u32).max(1);

    let center_x = crop.x as i64 + (crop.width / 2) as i64;
    let center_y = crop.y as i64 + (crop.height / 2) as i64;
    let x = (center_x - (new_w / 2) as i64)
        .min(frame_width as i64 - new_w as i64)
        .max(0);
    let y = (center_y - (new_h / 2) as i64)
        .min(frame_height as i64 - new_h as i64)
        .max(0);

    CropBox::new(x as u32, y as u32, new_w, new_h)
}

/// 自适应放大：截取中心子区域后以 Lanczos3 放大回原裁剪尺寸
pub fn adaptive_zoom(frame: &Frame, crop: &CropBox, zoom: f64) -> Result<RgbImage> {
    let inner = zoom_box(crop, zoom, frame.width, frame.height);
    let zoomed = apply_crop(frame, &inner)?;
    if inner == *crop {
        return Ok(zoomed);
    }
    Ok(imageops::resize(
        &zoomed,
        crop.width,
        crop.height,
        FilterType::Lanczos3,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::new(width, height, data, 0, 1)
    }

    #[test]
    fn test_apply_crop_slices_pixels() {
        let frame = gradient_frame(100, 80);
        let out = apply_crop(&frame, &CropBox::new(10, 20, 30, 40)).unwrap();

        assert_eq!(out.dimensions(), (30, 40));
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 0]);
        assert_eq!(out.get_pixel(29, 39).0, [39, 59, 0]);
    }

    #[test]
    fn test_apply_crop_at_right_edge() {
        let frame = gradient_frame(100, 80);
        let out = apply_crop(&frame, &CropBox::new(70, 0, 30, 80)).unwrap();
        assert_eq!(out.get_pixel(29, 79).0, [99, 79, 0]);

        let short = Frame::new(100, 80, vec![0u8; 30], 0, 1);
        assert!(apply_crop(&short, &CropBox::new(0, 0, 10, 10)).is_err());
    }

    #[test]
    fn test_apply_crop_rejects_out_of_bounds() {
        let frame = gradient_frame(50, 50);
        assert!(apply_crop(&frame, &CropBox::new(30, 30, 30, 30)).is_err());
    }

    #[test]
    fn test_zoom_box_centered() {
        let crop = CropBox::new(100, 100, 200, 400);
        assert_eq!(zoom_box(&crop, 2.0, 1000, 1000), CropBox::new(150, 200, 100, 200));
        assert_eq!(zoom_box(&crop, 1.0, 1000, 1000), crop);
        assert_eq!(zoom_box(&crop, f64::NAN, 1000, 1000), crop);
    }

    #[test]
    fn test_zoom_box_clamped() {
        let crop = CropBox::new(0, 0, 120, 120);
        let inner = zoom_box(&crop, 1.2, 120, 120);
        assert_eq!((inner.width, inner.height), (100, 100));
        assert!(inner.fits_within(120, 120));
    }

    #[test]
    fn test_adaptive_zoom_keeps_output_size() {
        let frame = gradient_frame(200, 200);
        let crop = CropBox::new(20, 20, 120, 160);
        let out = adaptive_zoom(&frame, &crop, 1.5).unwrap();
        assert_eq!(out.dimensions(), (120, 160));
    }
}
