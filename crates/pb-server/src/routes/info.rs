use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::context::AppContext;

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheck {
    pub status: String,
    pub pandoc_version: String,
    /// Pandoc processes currently running.
    pub in_flight: usize,
    pub max_concurrent_processes: usize,
    pub uptime_secs: u64,
    pub timestamp: String,
}

const ENDPOINTS: &[(&str, &str)] = &[
    ("health", "/health"),
    ("formats", "/api/v1/formats"),
    ("convert_text", "/api/v1/convert/text"),
    ("convert_file", "/api/v1/convert/file"),
    ("convert_stream", "/api/v1/convert/stream"),
    ("convert_batch", "/api/v1/convert/batch"),
    ("mcp", "/mcp"),
    ("openapi", "/openapi.json"),
];

#[utoipa::path(
    get,
    path = "/",
    tag = "Info",
    responses(
        (status = 200, description = "Service name, version and endpoint map", body = ServiceInfo)
    )
)]
pub async fn service_info(State(ctx): State<AppContext>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: ctx.config.server.service_name.clone(),
        version: ctx.config.server.service_version.clone(),
        endpoints: ENDPOINTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Info",
    responses(
        (status = 200, description = "Liveness and Pandoc availability", body = HealthCheck)
    )
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthCheck> {
    let admission = ctx.converter.admission();
    Json(HealthCheck {
        status: "healthy".into(),
        pandoc_version: ctx.pandoc_version().await.to_string(),
        in_flight: admission.in_flight(),
        max_concurrent_processes: admission.limit(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
