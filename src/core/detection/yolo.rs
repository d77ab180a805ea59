//! YOLOv8 导出格式的 ONNX 模型
//!
//! 输出张量布局 `[1, 4 + C, N]`：前四行为 cx, cy, w, h（输入像素坐标），
//! 其余 C 行为各类别得分。后处理：取最大类别 → 置信度过滤 → 按类别 NMS。

use super::types::{BoundingBox, Detection};

pub const DEFAULT_NMS_IOU: f64 = 0.45;

pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_class_name(class_id: i32) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|i| COCO_CLASS_NAMES.get(i))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// 后处理参数
#[derive(Debug, Clone)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    /// Added to the raw class index, e.g. -1 for 1-based label spaces.
    pub class_offset: i32,
    pub nms_iou: f64,
    /// Model input pixels → frame pixels
    pub scale_x: f32,
    pub scale_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Decode a row-major `[4 + num_classes, num_anchors]` output into frame-space detections.
pub fn decode_output(
    output: &[f32],
    num_classes: usize,
    num_anchors: usize,
    params: &DecodeParams,
    model_name: &str,
) -> Vec<Detection> {
    if output.len() < (4 + num_classes) * num_anchors {
        return Vec::new();
    }
    let at = |row: usize, col: usize| output[row * num_anchors + col];

    let max_x = params.frame_width as f32;
    let max_y = params.frame_height as f32;

    let mut candidates = Vec::new();
    for i in 0..num_anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..num_classes {
            let score = at(4 + c, i);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let x1 = ((cx - w / 2.0) * params.scale_x).clamp(0.0, max_x) as i32;
        let y1 = ((cy - h / 2.0) * params.scale_y).clamp(0.0, max_y) as i32;
        let x2 = ((cx + w / 2.0) * params.scale_x).clamp(0.0, max_x) as i32;
        let y2 = ((cy + h / 2.0) * params.scale_y).clamp(0.0, max_y) as i32;
        let bbox = BoundingBox::new(x1, y1, x2, y2);
        if !bbox.is_valid() {
            continue;
        }

        let class_id = best_class as i32 + params.class_offset;
        candidates.push(Detection::new(
            bbox,
            best_score,
            class_id,
            coco_class_name(class_id),
            model_name,
        ));
    }

    non_max_suppression(candidates, params.nms_iou)
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(feature = "onnx")]
pub use self::onnx::YoloOnnxModel;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;

    use image::imageops::FilterType;
    use log::debug;
    use tract_onnx::prelude::*;

    use super::{decode_output, DecodeParams, DEFAULT_NMS_IOU};
    use crate::core::detection::error::DetectError;
    use crate::core::detection::model::DetectionModel;
    use crate::core::detection::types::Detection;
    use crate::core::video::Frame;

    pub struct YoloOnnxModel {
        name: String,
        model: TypedRunnableModel<TypedModel>,
        input_size: u32,
        confidence_threshold: f32,
        class_offset: i32,
    }

    impl YoloOnnxModel {
        pub fn load(
            name: &str,
            path: &Path,
            input_size: u32,
            confidence_threshold: f32,
            class_offset: i32,
        ) -> Result<Self, DetectError> {
            let side = input_size as usize;
            let model = tract_onnx::onnx()
                .model_for_path(path)
                .and_then(|m| {
                    m.with_input_fact(
                        0,
                        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
                    )
                })
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| DetectError::load(name, format!("{}: {}", path.display(), e)))?;

            Ok(Self {
                name: name.to_string(),
                model,
                input_size,
                confidence_threshold,
                class_offset,
            })
        }

        fn build_input(&self, frame: &Frame) -> Result<Tensor, DetectError> {
            let image = frame
                .as_image()
                .ok_or_else(|| DetectError::inference(&self.name, "frame buffer size mismatch"))?;
            let side = self.input_size;
            let resized = image::imageops::resize(&image, side, side, FilterType::Triangle);

            let side = side as usize;
            let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
                resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
            });
            Ok(input.into_tensor())
        }
    }

    impl DetectionModel for YoloOnnxModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            let input = self.build_input(frame)?;
            let outputs = self
                .model
                .run(tvec!(input.into()))
                .map_err(|e| DetectError::inference(&self.name, e))?;

            let output = outputs
                .first()
                .ok_or_else(|| DetectError::inference(&self.name, "model produced no outputs"))?;
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| DetectError::inference(&self.name, e))?;

            let shape = view.shape().to_vec();
            if shape.len() != 3 || shape[1] <= 4 {
                return Err(DetectError::inference(
                    &self.name,
                    format!("unexpected output shape {:?}", shape),
                ));
            }
            let num_classes = shape[1] - 4;
            let num_anchors = shape[2];
            let flat: Vec<f32> = view.iter().copied().collect();

            let params = DecodeParams {
                confidence_threshold: self.confidence_threshold,
                class_offset: self.class_offset,
                nms_iou: DEFAULT_NMS_IOU,
                scale_x: frame.width as f32 / self.input_size as f32,
                scale_y: frame.height as f32 / self.input_size as f32,
                frame_width: frame.width,
                frame_height: frame.height,
            };
            let detections = decode_output(&flat, num_classes, num_anchors, &params, &self.name);
            debug!(
                "{}: frame {} -> {} detections",
                self.name,
                frame.frame_number,
                detections.len()
            );
            Ok(detections)
        }
    }
}
