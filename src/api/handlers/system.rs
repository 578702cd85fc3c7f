use rocket::serde::json::Json;
use rocket::{Route, State, get};
use serde::Serialize;

use crate::config::AppConfig;

pub fn generate_system_routes() -> Vec<Route> {
    routes![health]
}

#[derive(Debug, Serialize)]
pub struct RemoteServices {
    pub detect: String,
    pub highlight: String,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub services: RemoteServices,
}

#[get("/health")]
pub async fn health(config: &State<AppConfig>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        services: RemoteServices {
            detect: config.detect_url.clone(),
            highlight: config.highlight_url.clone(),
        },
    })
}
