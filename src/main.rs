use anyhow::Result;
use log::{error, info};
use std::sync::Arc;

use vision_pipeline::bootstrap::initialize;
use vision_pipeline::build_rocket;
use vision_pipeline::common::ROCKET_RUNTIME;
use vision_pipeline::remote::{AnalysisClient, AnalysisService};

fn main() -> Result<()> {
    let config = initialize()?;
    let service: Arc<dyn AnalysisService> = Arc::new(AnalysisClient::new(&config)?);

    let result = ROCKET_RUNTIME.block_on(async {
        let rocket_instance = build_rocket(config, service).ignite().await?;
        info!("Pipeline server ready");
        rocket_instance.launch().await
    });

    if let Err(e) = result {
        error!("Rocket server failed: {}", e);
        return Err(anyhow::Error::from(e));
    }
    Ok(())
}
