use axum::{http::StatusCode, response::Json as ResponseJson};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Liveness probe; no authentication
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "Health"
)]
pub async fn health_check() -> (StatusCode, ResponseJson<HealthResponse>) {
    (
        StatusCode::OK,
        ResponseJson(HealthResponse {
            status: "ok".to_string(),
            version: option_env!("CARGO_PKG_VERSION").map(|v| v.to_string()),
        }),
    )
}
