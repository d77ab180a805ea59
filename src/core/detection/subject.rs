use super::types::{BoundingBox, CategorizedDetections, Category, Detection};

/// 主体：裁剪围绕的那一个检测
#[derive(Debug, Clone, PartialEq)]
pub struct PrimarySubject {
    pub category: Category,
    pub detection: Detection,
}

/// Highest `area × confidence` wins. Exact ties go to the earlier detection
/// in person, animal, object order.
pub fn select_primary_subject(detections: &CategorizedDetections) -> Option<PrimarySubject> {
    let mut best: Option<(Category, &Detection, f64)> = None;

    for (category, det) in detections.iter() {
        let score = det.subject_score();
        if best.map_or(true, |(_, _, s)| score > s) {
            best = Some((category, det, score));
        }
    }

    best.map(|(category, det, _)| PrimarySubject {
        category,
        detection: det.clone(),
    })
}

/// Fraction of the frame above the subject's top edge.
pub fn head_space_ratio(bbox: &BoundingBox, frame_height: u32) -> f64 {
    if frame_height == 0 {
        return 0.0;
    }
    bbox.y1 as f64 / frame_height as f64
}

/// 所有检测的外接框
pub fn union_bbox(detections: &CategorizedDetections) -> Option<BoundingBox> {
    detections.iter().map(|(_, d)| d.bbox).reduce(|acc, b| {
        BoundingBox::new(
            acc.x1.min(b.x1),
            acc.y1.min(b.y1),
            acc.x2.max(b.x2),
            acc.y2.max(b.y2),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: i32, bbox: (i32, i32, i32, i32), conf: f32) -> Detection {
        Detection::new(
            BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            conf,
            class_id,
            "x",
            "yolo",
        )
    }

    #[test]
    fn test_empty_has_no_subject() {
        assert!(select_primary_subject(&CategorizedDetections::new()).is_none());
        assert!(union_bbox(&CategorizedDetections::new()).is_none());
    }

    #[test]
    fn test_largest_confident_detection_wins() {
        let dets = CategorizedDetections::from_detections(vec![
            det(0, (0, 0, 10, 10), 0.9),   // 90
            det(2, (0, 0, 100, 20), 0.5),  // 1000
            det(16, (0, 0, 30, 30), 0.9),  // 810
        ]);

        let subject = select_primary_subject(&dets).unwrap();
        assert_eq!(subject.category, Category::Object);
        assert_eq!(subject.detection.class_id, 2);
    }

    #[test]
    fn test_ties_follow_category_order() {
        let dets = CategorizedDetections::from_detections(vec![
            det(2, (0, 0, 10, 10), 0.5),
            det(16, (0, 0, 10, 10), 0.5),
            det(0, (0, 0, 10, 10), 0.5),
        ]);
        assert_eq!(select_primary_subject(&dets).unwrap().category, Category::Person);

        let dets = CategorizedDetections::from_detections(vec![
            det(2, (0, 0, 10, 10), 0.5),
            det(16, (0, 0, 10, 10), 0.5),
        ]);
        assert_eq!(select_primary_subject(&dets).unwrap().category, Category::Animal);
    }

    #[test]
    fn test_ties_within_category_keep_first() {
        let dets = CategorizedDetections::from_detections(vec![
            det(0, (0, 0, 10, 10), 0.5),
            det(0, (50, 50, 60, 60), 0.5),
        ]);
        let subject = select_primary_subject(&dets).unwrap();
        assert_eq!(subject.detection.bbox.x1, 0);
    }

    #[test]
    fn test_head_space_ratio() {
        assert_eq!(head_space_ratio(&BoundingBox::new(0, 192, 10, 300), 1920), 0.1);
        assert_eq!(head_space_ratio(&BoundingBox::new(0, 192, 10, 300), 0), 0.0);
    }

    #[test]
    fn test_union_bbox() {
        let dets = CategorizedDetections::from_detections(vec![
            det(0, (10, 20, 30, 40), 0.5),
            det(56, (5, 25, 50, 35), 0.5),
        ]);
        assert_eq!(union_bbox(&dets), Some(BoundingBox::new(5, 20, 50, 40)));
    }
}
