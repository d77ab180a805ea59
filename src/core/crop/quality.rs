use super::geometry::CropBox;
use crate::core::detection::BoundingBox;

/// Crops must score strictly above this to be kept.
pub const QUALITY_THRESHOLD: f64 = 0.3;
/// Subject share of the crop area that scores best.
pub const IDEAL_COVERAGE: f64 = 0.45;
/// A crop within this many pixels of a frame edge counts as touching it.
pub const EDGE_MARGIN: i64 = 10;
pub const EDGE_PENALTY: f64 = 0.1;

/// 裁剪质量评分，范围 [0, 1]
///
/// `1 - |0.45 - coverage|`, minus 0.1 when the crop touches the left or top
/// edge and another 0.1 when it touches the right or bottom edge.
pub fn quality_score(
    frame_width: u32,
    frame_height: u32,
    crop: &CropBox,
    subject: &BoundingBox,
) -> f64 {
    let crop_area = crop.area();
    let coverage = if crop_area > 0 {
        subject.area() as f64 / crop_area as f64
    } else {
        0.0
    };

    let penalty = edge_penalty(frame_width, frame_height, crop);
    let coverage_score = 1.0 - (IDEAL_COVERAGE - coverage).abs();

    (coverage_score - penalty).max(0.0)
}

pub fn edge_penalty(frame_width: u32, frame_height: u32, crop: &CropBox) -> f64 {
    let x = crop.x as i64;
    let y = crop.y as i64;
    let right = crop.right() as i64;
    let bottom = crop.bottom() as i64;

    let mut penalty = 0.0;
    if x <= EDGE_MARGIN || y <= EDGE_MARGIN {
        penalty += EDGE_PENALTY;
    }
    if right >= frame_width as i64 - EDGE_MARGIN || bottom >= frame_height as i64 - EDGE_MARGIN {
        penalty += EDGE_PENALTY;
    }
    penalty
}

pub fn passes(quality: f64, threshold: f64) -> bool {
    quality > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ideal_coverage_scores_one() {
        // 90x200 subject in a 200x200 crop: coverage 0.45
        let crop = CropBox::new(100, 100, 200, 200);
        let subject = BoundingBox::new(150, 100, 240, 300);
        assert_eq!(quality_score(1000, 1000, &crop, &subject), 1.0);
    }

    #[test]
    fn test_touching_two_edges() {
        let crop = CropBox::new(800, 0, 200, 200);
        assert!((edge_penalty(1000, 1000, &crop) - 0.2).abs() < 1e-12);

        let subject = BoundingBox::new(850, 0, 940, 200);
        let q = quality_score(1000, 1000, &crop, &subject);
        assert!((q - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_can_drop_below_threshold() {
        // Tiny subject: coverage ≈ 0.0025 → score ≈ 0.5525 - 0.2
        let crop = CropBox::new(0, 0, 200, 200);
        let subject = BoundingBox::new(0, 0, 10, 10);
        let q = quality_score(200, 200, &crop, &subject);
        assert!(q > 0.3 && q < 0.36);

        // Subject far larger than the crop floors at zero
        let huge = BoundingBox::new(0, 0, 1000, 1000);
        let q = quality_score(1000, 1000, &CropBox::new(400, 400, 100, 100), &huge);
        assert_eq!(q, 0.0);
        assert!(!passes(q, QUALITY_THRESHOLD));
    }

    #[test]
    fn test_quality_bounds() {
        let crops = [
            CropBox::new(0, 0, 50, 50),
            CropBox::new(100, 100, 300, 300),
            CropBox::new(0, 0, 0, 0),
        ];
        let subjects = [
            BoundingBox::new(0, 0, 1, 1),
            BoundingBox::new(100, 100, 400, 400),
            BoundingBox::new(0, 0, 2000, 2000),
        ];
        for c in crops.iter() {
            for s in subjects.iter() {
                let q = quality_score(1000, 1000, c, s);
                assert!((0.0..=1.0).contains(&q), "{:?} {:?} -> {}", c, s, q);
            }
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!passes(0.3, QUALITY_THRESHOLD));
        assert!(passes(0.3001, QUALITY_THRESHOLD));
    }
}
