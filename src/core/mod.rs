pub mod config;
pub mod crop;
pub mod detection;
pub mod error;
pub mod video;

pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
