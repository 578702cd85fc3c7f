use anyhow::{Context, Result};
use log::{info, warn};
use std::time::Instant;

use crate::remote::{AnalysisService, Operation};
use crate::workflow::types::{ExecutionLogEntry, Step, WorkingPayload};

#[derive(Debug)]
pub struct PipelineOutcome {
    pub payload: WorkingPayload,
    pub log: Vec<ExecutionLogEntry>,
}

/// Runs the steps strictly in order, each one consuming the image the previous
/// one produced. The first failing remote call aborts the whole run.
pub async fn run_pipeline(
    service: &dyn AnalysisService,
    payload: WorkingPayload,
    steps: &[Step],
) -> Result<PipelineOutcome> {
    let start_time = Instant::now();
    let mut payload = payload;
    let mut log = vec![ExecutionLogEntry::Input {
        media_type: payload.media_type.clone(),
        size: payload.len(),
    }];

    for (index, step) in steps.iter().enumerate() {
        let step_start_time = Instant::now();
        match step {
            Step::DetectObject { object } => {
                let response = service
                    .detect(&payload, object)
                    .await
                    .with_context(|| failed(index, step, Operation::Detect))?;
                let fetched = service
                    .fetch(&response.file_url, &payload.media_type)
                    .await
                    .with_context(|| failed(index, step, Operation::Fetch))?;
                payload = fetched;
                log.push(ExecutionLogEntry::Detect {
                    object: object.clone(),
                    detections: response.detections,
                });
            }
            Step::HighlightObject { object, method } => {
                let response = service
                    .highlight(&payload, object, method)
                    .await
                    .with_context(|| failed(index, step, Operation::Highlight))?;
                let fetched = service
                    .fetch(&response.file_url, &payload.media_type)
                    .await
                    .with_context(|| failed(index, step, Operation::Fetch))?;
                payload = fetched;
                log.push(ExecutionLogEntry::Highlight {
                    object: object.clone(),
                    method: method.clone(),
                });
            }
            Step::Output => {}
            Step::Unrecognized(kind) => {
                warn!("Skipping step #{} with unrecognized type '{}'", index, kind);
                continue;
            }
        }
        info!(duration = &*format!("{:?}", step_start_time.elapsed());
            "Step #{} {} done",
            index,
            step
        );
    }

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "(total time) Pipeline of {} steps complete",
        steps.len()
    );

    Ok(PipelineOutcome { payload, log })
}

fn failed(index: usize, step: &Step, operation: Operation) -> String {
    format!("Step #{} {} failed during remote {} call", index, step, operation)
}
