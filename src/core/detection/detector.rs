//! 检测器 - 单模型 / 多模型集成两种模式，对外统一返回按类别分桶的结果

use log::{debug, info, warn};
use serde::Serialize;

use super::consensus::{ConsensusConfig, ConsensusVoter};
use super::error::DetectError;
use super::model::{LoadPolicy, ModelSlot, SlotStatus};
use super::types::CategorizedDetections;
use crate::core::video::Frame;

/// Frame in, categorized detections out.
///
/// An `Err` is downgraded to "no detections" by the frame pipeline.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<CategorizedDetections, DetectError>;

    /// Used in output directory names: the model name, or `ensemble`.
    fn mode_label(&self) -> &str;

    fn model_status(&self) -> EnsembleStatus;
}

pub struct SingleModelDetector {
    slot: ModelSlot,
}

impl SingleModelDetector {
    pub fn new(mut slot: ModelSlot) -> Self {
        if slot.policy() == LoadPolicy::Eager {
            slot.load();
        }
        Self { slot }
    }

    pub fn status(&self) -> SlotStatus {
        self.slot.status()
    }
}

impl ObjectDetector for SingleModelDetector {
    fn detect(&mut self, frame: &Frame) -> Result<CategorizedDetections, DetectError> {
        let detections = self.slot.infer(frame)?;
        Ok(CategorizedDetections::from_detections(detections))
    }

    fn mode_label(&self) -> &str {
        self.slot.name()
    }

    fn model_status(&self) -> EnsembleStatus {
        EnsembleStatus {
            models: vec![(self.slot.name().to_string(), self.slot.status())],
            voting_threshold: 1,
            iou_threshold: 0.0,
        }
    }
}

/// 集成状态快照
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleStatus {
    pub models: Vec<(String, SlotStatus)>,
    pub voting_threshold: usize,
    pub iou_threshold: f64,
}

impl EnsembleStatus {
    pub fn ready_count(&self) -> usize {
        self.models
            .iter()
            .filter(|(_, s)| *s == SlotStatus::Ready)
            .count()
    }

    /// Slots that are ready or may still load.
    pub fn usable_count(&self) -> usize {
        self.models
            .iter()
            .filter(|(_, s)| *s != SlotStatus::Failed)
            .count()
    }
}

/// 多模型集成检测器
///
/// Slots are invoked in configuration order every frame. Eager slots are
/// loaded here; lazy ones on their first frame. A slot that fails to load or
/// run contributes nothing for that frame, and the voting threshold stays
/// where it was set against the configured model count.
pub struct EnsembleDetector {
    slots: Vec<ModelSlot>,
    voter: ConsensusVoter,
    iou_threshold: f64,
}

impl EnsembleDetector {
    pub fn new(mut slots: Vec<ModelSlot>, config: &ConsensusConfig) -> Self {
        for slot in slots.iter_mut() {
            if slot.policy() == LoadPolicy::Eager {
                slot.load();
            }
        }

        let voter = ConsensusVoter::new(config, slots.len());
        info!(
            "🗳️ Ensemble of {} models, voting threshold {}",
            slots.len(),
            voter.voting_threshold()
        );

        Self {
            slots,
            voter,
            iou_threshold: config.iou_threshold,
        }
    }
}

impl ObjectDetector for EnsembleDetector {
    fn detect(&mut self, frame: &Frame) -> Result<CategorizedDetections, DetectError> {
        let mut raw = Vec::new();

        for slot in self.slots.iter_mut() {
            match slot.infer(frame) {
                Ok(detections) => raw.extend(detections),
                Err(DetectError::Unavailable(name)) => {
                    debug!("Model `{}` unavailable, skipped", name);
                }
                Err(e) => {
                    warn!("⚠️ Frame {}: {}", frame.frame_number, e);
                }
            }
        }

        let consensus = self.voter.vote(&raw);
        debug!(
            "Frame {}: {} raw detections -> {} consensus",
            frame.frame_number,
            raw.len(),
            consensus.len()
        );

        Ok(CategorizedDetections::from_detections(consensus))
    }

    fn mode_label(&self) -> &str {
        "ensemble"
    }

    fn model_status(&self) -> EnsembleStatus {
        EnsembleStatus {
            models: self
                .slots
                .iter()
                .map(|s| (s.name().to_string(), s.status()))
                .collect(),
            voting_threshold: self.voter.voting_threshold(),
            iou_threshold: self.iou_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::model::{DetectionModel, StaticModel};
    use crate::core::detection::{BoundingBox, Detection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn det(model: &str, class_id: i32, bbox: (i32, i32, i32, i32)) -> Detection {
        Detection::new(
            BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            0.8,
            class_id,
            "x",
            model,
        )
    }

    fn static_slot(name: &str, dets: Vec<Detection>) -> ModelSlot {
        ModelSlot::ready(Box::new(StaticModel::new(name, dets)))
    }

    struct FailingModel;

    impl DetectionModel for FailingModel {
        fn name(&self) -> &str {
            "broken"
        }

        fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            Err(DetectError::inference("broken", "runtime exploded"))
        }
    }

    #[test]
    fn test_single_model_categorizes() {
        let mut detector = SingleModelDetector::new(static_slot(
            "yolo",
            vec![det("yolo", 0, (0, 0, 10, 10)), det("yolo", 16, (0, 0, 10, 10))],
        ));

        let out = detector.detect(&Frame::filled(32, 32, 0, 1)).unwrap();
        assert_eq!(out.persons.len(), 1);
        assert_eq!(out.animals.len(), 1);
        assert!(out.objects.is_empty());
        assert_eq!(detector.mode_label(), "yolo");
    }

    #[test]
    fn test_single_model_failure_is_err() {
        let mut detector = SingleModelDetector::new(ModelSlot::ready(Box::new(FailingModel)));
        assert!(detector.detect(&Frame::filled(8, 8, 0, 1)).is_err());
    }

    #[test]
    fn test_ensemble_votes_across_models() {
        let mut detector = EnsembleDetector::new(
            vec![
                static_slot("yolo", vec![det("yolo", 0, (0, 0, 100, 100))]),
                static_slot("detr", vec![det("detr", 0, (0, 25, 100, 125))]),
            ],
            &ConsensusConfig::default(),
        );

        let out = detector.detect(&Frame::filled(32, 32, 0, 1)).unwrap();
        assert_eq!(out.persons.len(), 1);
        assert_eq!(out.persons[0].model_source, "detr,yolo");
        assert_eq!(detector.mode_label(), "ensemble");
    }

    #[test]
    fn test_ensemble_failing_model_counts_as_empty() {
        let mut detector = EnsembleDetector::new(
            vec![
                static_slot("yolo", vec![det("yolo", 0, (0, 0, 100, 100))]),
                ModelSlot::ready(Box::new(FailingModel)),
                static_slot("detr", vec![det("detr", 0, (0, 0, 100, 100))]),
            ],
            &ConsensusConfig::default(),
        );

        let out = detector.detect(&Frame::filled(32, 32, 0, 1)).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_ensemble_dead_model_keeps_threshold() {
        let mut detector = EnsembleDetector::new(
            vec![
                static_slot("yolo", vec![det("yolo", 0, (0, 0, 100, 100))]),
                ModelSlot::new(
                    "detr",
                    LoadPolicy::Eager,
                    Box::new(|| Err(DetectError::load("detr", "missing weights"))),
                ),
            ],
            &ConsensusConfig::default(),
        );

        let status = detector.model_status();
        assert_eq!(status.voting_threshold, 2);
        assert_eq!(status.ready_count(), 1);
        assert_eq!(status.models[1], ("detr".to_string(), SlotStatus::Failed));

        assert!(detector.detect(&Frame::filled(32, 32, 0, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_lazy_slot_loads_on_first_detect() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = ModelSlot::new(
            "fasterrcnn",
            LoadPolicy::Lazy,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(StaticModel::new("fasterrcnn", vec![])) as Box<dyn DetectionModel>)
            }),
        );

        let mut detector = EnsembleDetector::new(
            vec![static_slot("yolo", vec![]), lazy],
            &ConsensusConfig::default(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(detector.model_status().models[1].1, SlotStatus::Pending);

        detector.detect(&Frame::filled(8, 8, 0, 1)).unwrap();
        detector.detect(&Frame::filled(8, 8, 0, 2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(detector.model_status().models[1].1, SlotStatus::Ready);
    }
}
