pub mod harvester;

pub use harvester::{build_detector, Harvester};
