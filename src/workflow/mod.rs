pub mod executor;
pub mod types;

pub use executor::{PipelineOutcome, run_pipeline};
pub use types::{ExecutionLogEntry, Step, WorkingPayload, parse_pipeline};
