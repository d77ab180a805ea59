use thiserror::Error;

use crate::core::detection::DetectError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to open video {path}: {reason}")]
    SourceOpen { path: String, reason: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),
    #[error("Frame {index} not found in {path}")]
    FrameNotFound { path: String, index: u64 },
}

impl HarvestError {
    pub fn source_open(path: &std::path::Path, reason: impl ToString) -> Self {
        HarvestError::SourceOpen {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
