//! Pipeline composition, configuration and batch execution.

mod batch;
mod runner;

pub use batch::{load_batch, run_batches, BatchJob, BatchOutcome, BatchSummary};
pub use runner::{Pipeline, PipelineConfig, PipelineStep};
