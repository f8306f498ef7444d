pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod trigger;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{PipelineError, Result, TableReadWarning};
pub use pipeline::{Pipeline, RunSummary};
pub use trigger::{run_pipeline, TriggerResponse};
