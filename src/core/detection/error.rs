use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Model `{model}` failed to load: {reason}")]
    ModelLoad { model: String, reason: String },
    #[error("Model `{model}` inference failed: {reason}")]
    Inference { model: String, reason: String },
    #[error("No detection model available: {0}")]
    Unavailable(String),
}

impl DetectError {
    pub fn load(model: &str, reason: impl ToString) -> Self {
        DetectError::ModelLoad {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(model: &str, reason: impl ToString) -> Self {
        DetectError::Inference {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}
