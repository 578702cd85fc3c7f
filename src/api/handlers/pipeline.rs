use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use rocket::form::{Errors, Form, FromForm};
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::{Route, State, post};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;

use crate::api::fairings::guards::host::GuardHost;
use crate::api::{AppError, AppResult};
use crate::remote::AnalysisService;
use crate::storage::ResultStore;
use crate::utils::{is_image_media_type, resolve_media_type};
use crate::workflow::{ExecutionLogEntry, WorkingPayload, parse_pipeline, run_pipeline};

pub fn generate_pipeline_routes() -> Vec<Route> {
    routes![process]
}

#[derive(FromForm, Debug)]
pub struct PipelineForm<'r> {
    /// The image the first step receives
    #[field(name = "image")]
    pub image: Option<TempFile<'r>>,

    /// JSON array of step objects
    #[field(name = "pipeline")]
    pub pipeline: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub processed_image_url: String,
    pub pipeline: Vec<ExecutionLogEntry>,
}

fn form_error(errors: Errors<'_>) -> AppError {
    let error_chain = errors
        .iter()
        .map(|e| anyhow!(e.to_string()))
        .reduce(|acc, e| acc.context(e.to_string()));

    match error_chain {
        Some(chain) => AppError::bad_request(chain.context("Failed to parse form")),
        None => AppError::bad_request(anyhow!("Failed to parse form with unknown error")),
    }
}

async fn read_upload(file: &TempFile<'_>) -> Result<WorkingPayload> {
    let reader = file
        .open()
        .await
        .context("Failed to open uploaded image")?;
    tokio::pin!(reader);
    let mut bytes = Vec::with_capacity(file.len() as usize);
    reader
        .read_to_end(&mut bytes)
        .await
        .context("Failed to read uploaded image")?;

    let declared = file.content_type().map(|ct| ct.to_string());
    let media_type = resolve_media_type(declared.as_deref(), &bytes);
    if !is_image_media_type(&media_type) {
        return Err(anyhow!("Invalid file type: {}", media_type));
    }
    WorkingPayload::new(bytes, media_type)
}

#[post("/process", data = "<form>")]
pub async fn process(
    service: &State<Arc<dyn AnalysisService>>,
    store: &State<ResultStore>,
    host: GuardHost,
    form: Result<Form<PipelineForm<'_>>, Errors<'_>>,
) -> AppResult<Json<PipelineResponse>> {
    let start_time = Instant::now();
    let inner_form = form.map_err(form_error)?.into_inner();

    let image = inner_form.image.ok_or_else(|| {
        warn!("Rejected pipeline request without an image");
        AppError::bad_request(anyhow!("Missing image file"))
    })?;
    let raw_pipeline = inner_form
        .pipeline
        .ok_or_else(|| AppError::bad_request(anyhow!("Missing pipeline field")))?;
    let steps = parse_pipeline(&raw_pipeline).map_err(AppError::bad_request)?;
    let payload = read_upload(&image).await.map_err(AppError::bad_request)?;

    info!(
        "Running pipeline of {} steps on {} ({} bytes)",
        steps.len(),
        payload.media_type,
        payload.len()
    );

    let outcome = run_pipeline(service.inner().as_ref(), payload, &steps)
        .await
        .map_err(|error| {
            error!("Pipeline aborted: {:#}", error);
            error
        })?;
    let stored = store.persist(&outcome.payload, host.0.as_deref()).await?;

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "(total time) Pipeline request complete: {}",
        stored.url
    );

    Ok(Json(PipelineResponse {
        processed_image_url: stored.url,
        pipeline: outcome.log,
    }))
}
