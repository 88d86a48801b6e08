pub mod config;
pub mod errors;
pub mod logging;
pub mod mentions;
pub mod model;
pub mod normalization;
pub mod pipeline;
pub mod providers;

pub mod util {
    pub mod env;
}

pub use config::PipelineConfig;
pub use model::{Deal, DealRecord, ProductIdentifier, RawMention, Tier};
pub use pipeline::{Pipeline, RunOutput};
