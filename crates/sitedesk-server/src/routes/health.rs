use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /health: liveness check.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /status: build version, schema version and table sizes.
pub async fn status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let (version, counts) = app
        .with_store(|store| Ok((store.version()?, store.counts()?)))
        .await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "schema_version": version,
        "counts": counts,
    })))
}
