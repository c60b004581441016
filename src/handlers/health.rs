// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;

use crate::error::AppError;

/// Liveness probe that also pings the database.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service and database are up"),
        (status = 500, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn health(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT 1").execute(&pool).await.map_err(|e| {
        tracing::error!("Health check failed: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({ "status": "ok" })))
}
