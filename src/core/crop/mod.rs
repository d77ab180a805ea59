pub mod aspect;
pub mod geometry;
pub mod quality;
pub mod render;

pub use aspect::AspectRatio;
pub use geometry::{CropBox, CropConfig, SmartCropper};
pub use quality::{quality_score, QUALITY_THRESHOLD};
pub use render::{adaptive_zoom, apply_crop, zoom_box};
