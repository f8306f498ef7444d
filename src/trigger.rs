use serde::Serialize;
use tracing::error;

use crate::config::Config;
use crate::pipeline::Pipeline;

/// What an outer trigger (HTTP handler, scheduler, shell) gets back from a run.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    /// 0 when every archive made it through, 1 otherwise.
    pub exit_status: i32,
    pub captured_output: String,
}

impl TriggerResponse {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Run the whole pipeline for `start_year..=end_year` and fold the outcome
/// into an exit status plus diagnostic text. Never panics on pipeline errors.
pub async fn run_pipeline(config: Config, start_year: i32, end_year: i32) -> TriggerResponse {
    let outcome = match Pipeline::new(config) {
        Ok(pipeline) => pipeline.run(start_year, end_year).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(summary) => TriggerResponse {
            exit_status: if summary.is_success() { 0 } else { 1 },
            captured_output: summary.to_string(),
        },
        Err(e) => {
            error!(error = %e, "pipeline run failed");
            TriggerResponse {
                exit_status: 1,
                captured_output: format!("error: {e}"),
            }
        }
    }
}
