pub mod setup;

use anyhow::Result;

use crate::config::AppConfig;
use setup::{initialize_folder, initialize_logger};

pub fn initialize() -> Result<AppConfig> {
    initialize_logger();
    let config = AppConfig::from_env()?;
    initialize_folder(&config.processed_dir)?;
    Ok(config)
}
