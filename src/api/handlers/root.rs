use axum::{Json, response::IntoResponse};
use serde_json::json;

// axum handler for /
pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "ok" }))
}
