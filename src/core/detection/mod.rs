pub mod consensus;
pub mod detector;
pub mod error;
pub mod model;
pub mod subject;
pub mod types;
pub mod yolo;

pub use consensus::{ConsensusConfig, ConsensusVoter, MatchPolicy};
pub use detector::{EnsembleDetector, EnsembleStatus, ObjectDetector, SingleModelDetector};
pub use error::DetectError;
pub use model::{DetectionModel, LoadPolicy, ModelLoader, ModelSlot, SlotStatus, StaticModel};
pub use subject::{head_space_ratio, select_primary_subject, union_bbox, PrimarySubject};
pub use types::{BoundingBox, CategorizedDetections, Category, Detection};
