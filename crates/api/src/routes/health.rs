use crate::types::HealthResponse;
use axum::response::Json;
use chrono::Utc;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
