pub mod client;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflow::types::{Detection, WorkingPayload};

pub use client::AnalysisClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Detect,
    Highlight,
    Fetch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Detect => f.write_str("detect"),
            Operation::Highlight => f.write_str("highlight"),
            Operation::Fetch => f.write_str("fetch"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub file_url: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HighlightResponse {
    pub file_url: String,
}

/// The external image-analysis server. Every method is a single attempt;
/// transport failures and non-2xx answers come back as errors.
#[rocket::async_trait]
pub trait AnalysisService: Send + Sync {
    async fn detect(&self, payload: &WorkingPayload, object: &str) -> Result<DetectResponse>;

    async fn highlight(
        &self,
        payload: &WorkingPayload,
        object: &str,
        method: &str,
    ) -> Result<HighlightResponse>;

    /// Downloads an image the server produced. `fallback_media_type` is used
    /// when neither the response headers nor the bytes identify the format.
    async fn fetch(&self, file_url: &str, fallback_media_type: &str) -> Result<WorkingPayload>;
}
