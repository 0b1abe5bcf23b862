pub mod edge;
pub mod performance;
pub mod pipeline;
pub mod selection;
pub mod threshold;

pub use pipeline::{CycleReport, EngineSettings, PickEngine};
