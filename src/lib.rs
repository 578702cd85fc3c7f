#[macro_use]
extern crate rocket;

pub mod api;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod remote;
pub mod storage;
pub mod utils;
pub mod workflow;

use rocket::data::{Limits, ToByteUnit};
use rocket::fs::FileServer;
use std::sync::Arc;

use api::fairings::cache::cache_control_fairing;
use api::handlers::pipeline::generate_pipeline_routes;
use api::handlers::system::generate_system_routes;
use common::PROCESSED_ROUTE;
use config::AppConfig;
use remote::AnalysisService;
use storage::ResultStore;

/// Wires routes, static serving and shared state. The analysis service is
/// passed in so callers can swap the remote server.
pub fn build_rocket(
    config: AppConfig,
    service: Arc<dyn AnalysisService>,
) -> rocket::Rocket<rocket::Build> {
    // The form limit leaves room for the pipeline field around the file.
    let limits = Limits::default()
        .limit("file", config.upload_limit_mb.mebibytes())
        .limit("data-form", config.upload_limit_mb.saturating_add(1).mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    let store = ResultStore::new(
        config.processed_dir.clone(),
        config.public_base_url.clone(),
    );

    rocket::custom(figment)
        .attach(cache_control_fairing())
        .mount(PROCESSED_ROUTE, FileServer::from(&config.processed_dir))
        .mount("/", generate_pipeline_routes())
        .mount("/", generate_system_routes())
        .manage(service)
        .manage(store)
        .manage(config)
}
