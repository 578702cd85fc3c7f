use anyhow::{Context, Result, bail};
use dotenv::dotenv;
use log::info;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "PIPELINE_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Multipart endpoint of the remote detect operation
    pub detect_url: String,
    /// Multipart endpoint of the remote highlight operation
    pub highlight_url: String,
    /// Where final images are written; served under `/static/processed`
    pub processed_dir: PathBuf,
    /// Origin used in returned image URLs, e.g. `https://img.example.com`
    pub public_base_url: Option<String>,
    /// Upload size limit (MB)
    pub upload_limit_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detect_url: "http://localhost:5000/detect".to_string(),
            highlight_url: "http://localhost:5000/highlight".to_string(),
            processed_dir: PathBuf::from("./static/processed"),
            public_base_url: None,
            upload_limit_mb: 20,
        }
    }
}

impl AppConfig {
    /// Reads `PIPELINE_*` variables, honouring a `.env` file in the working directory.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let config: AppConfig = envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("Failed to read PIPELINE_* environment variables")?;
        config.validate()?;
        info!(
            "Remote endpoints: detect = {}, highlight = {}",
            config.detect_url, config.highlight_url
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("detect_url", &self.detect_url),
            ("highlight_url", &self.highlight_url),
        ] {
            Url::parse(url).with_context(|| format!("Invalid {}: {}", name, url))?;
        }
        if let Some(base) = &self.public_base_url {
            Url::parse(base).with_context(|| format!("Invalid public_base_url: {}", base))?;
        }
        if self.upload_limit_mb == 0 {
            bail!("upload_limit_mb must be greater than zero");
        }
        Ok(())
    }

    pub fn detect_endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&self.detect_url)?)
    }

    pub fn highlight_endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&self.highlight_url)?)
    }
}
