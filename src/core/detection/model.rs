//! 检测模型槽位 - 启动时按配置顺序建立，支持立即加载 / 首次使用时加载

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::error::DetectError;
use super::types::Detection;
use crate::core::video::Frame;

/// A raw detector: one frame in, uncategorised detections out.
pub trait DetectionModel: Send {
    fn name(&self) -> &str;

    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

pub type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn DetectionModel>, DetectError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    #[default]
    Eager,
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Pending,
    Ready,
    Failed,
}

enum SlotState {
    Pending(ModelLoader),
    Ready(Box<dyn DetectionModel>),
    Failed,
}

pub struct ModelSlot {
    name: String,
    policy: LoadPolicy,
    state: SlotState,
}

impl ModelSlot {
    pub fn new(name: impl Into<String>, policy: LoadPolicy, loader: ModelLoader) -> Self {
        Self {
            name: name.into(),
            policy,
            state: SlotState::Pending(loader),
        }
    }

    /// Wrap an already constructed model.
    pub fn ready(model: Box<dyn DetectionModel>) -> Self {
        Self {
            name: model.name().to_string(),
            policy: LoadPolicy::Eager,
            state: SlotState::Ready(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn status(&self) -> SlotStatus {
        match self.state {
            SlotState::Pending(_) => SlotStatus::Pending,
            SlotState::Ready(_) => SlotStatus::Ready,
            SlotState::Failed => SlotStatus::Failed,
        }
    }

    /// Load now if the slot is still pending. A failed load is permanent.
    pub fn load(&mut self) -> SlotStatus {
        let state = std::mem::replace(&mut self.state, SlotState::Failed);
        self.state = match state {
            SlotState::Pending(loader) => {
                info!("📦 Loading model `{}`...", self.name);
                match loader() {
                    Ok(model) => {
                        info!("✅ Model `{}` loaded", self.name);
                        SlotState::Ready(model)
                    }
                    Err(e) => {
                        warn!("⚠️ Model `{}` unavailable, contributes no detections: {}", self.name, e);
                        SlotState::Failed
                    }
                }
            }
            other => other,
        };
        self.status()
    }

    /// Run the model, loading it first if needed. A failed slot yields
    /// `DetectError::Unavailable`.
    pub fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        self.load();
        match &self.state {
            SlotState::Ready(model) => model.infer(frame),
            _ => Err(DetectError::Unavailable(self.name.clone())),
        }
    }
}

/// Fixed-output model used in tests and demos.
pub struct StaticModel {
    name: String,
    detections: Vec<Detection>,
}

impl StaticModel {
    pub fn new(name: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            name: name.into(),
            detections,
        }
    }
}

impl DetectionModel for StaticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::BoundingBox;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn frame() -> Frame {
        Frame::filled(32, 32, 0, 1)
    }

    fn person() -> Detection {
        Detection::new(BoundingBox::new(0, 0, 10, 10), 0.9, 0, "person", "yolo")
    }

    #[test]
    fn test_lazy_slot_loads_once_on_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut slot = ModelSlot::new(
            "yolo",
            LoadPolicy::Lazy,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(StaticModel::new("yolo", vec![person()])) as Box<dyn DetectionModel>)
            }),
        );

        assert_eq!(slot.status(), SlotStatus::Pending);
        assert_eq!(slot.infer(&frame()).unwrap().len(), 1);
        assert_eq!(slot.infer(&frame()).unwrap().len(), 1);
        assert_eq!(slot.status(), SlotStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_permanent() {
        let mut slot = ModelSlot::new(
            "detr",
            LoadPolicy::Lazy,
            Box::new(|| Err(DetectError::load("detr", "weights missing"))),
        );

        assert_eq!(slot.load(), SlotStatus::Failed);
        assert!(matches!(
            slot.infer(&frame()),
            Err(DetectError::Unavailable(name)) if name == "detr"
        ));
        assert_eq!(slot.status(), SlotStatus::Failed);
    }

    #[test]
    fn test_ready_slot_takes_model_name() {
        let slot = ModelSlot::ready(Box::new(StaticModel::new("fasterrcnn", vec![])));
        assert_eq!(slot.name(), "fasterrcnn");
        assert_eq!(slot.status(), SlotStatus::Ready);
    }
}
