use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use crate::common::{PROCESSED_FILE_PREFIX, PROCESSED_ROUTE};
use crate::utils::extension_for;
use crate::workflow::types::WorkingPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub path: PathBuf,
    pub url: String,
}

/// Append-only directory of final images. Names never repeat, so concurrent
/// requests need no locking.
#[derive(Debug, Clone)]
pub struct ResultStore {
    processed_dir: PathBuf,
    public_base_url: Option<String>,
}

impl ResultStore {
    pub fn new(processed_dir: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            public_base_url: public_base_url
                .map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    /// Writes the payload and returns its public URL. `request_host` is used
    /// when no public base URL is configured.
    pub async fn persist(
        &self,
        payload: &WorkingPayload,
        request_host: Option<&str>,
    ) -> Result<StoredResult> {
        let start_time = Instant::now();
        let filename = unique_filename(&payload.media_type);
        let path = self.processed_dir.join(&filename);

        tokio::fs::write(&path, &payload.bytes)
            .await
            .with_context(|| format!("Failed to write processed image {}", path.display()))?;

        let url = format!("{}{}/{}", self.base_url(request_host), PROCESSED_ROUTE, filename);
        info!(duration = &*format!("{:?}", start_time.elapsed());
            "Stored {} ({} bytes)",
            path.display(),
            payload.len()
        );
        Ok(StoredResult { path, url })
    }

    fn base_url(&self, request_host: Option<&str>) -> String {
        match (&self.public_base_url, request_host) {
            (Some(base), _) => base.clone(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => String::new(),
        }
    }
}

/// `processed_<local time to the millisecond>_<8 hex>.<ext>`
pub fn unique_filename(media_type: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S%3f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        PROCESSED_FILE_PREFIX,
        timestamp,
        &suffix[..8],
        extension_for(media_type)
    )
}
