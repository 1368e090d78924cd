use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::features::FlagMap;

/// GET /api/features - bare `{feature_key: bool}` map
pub async fn features_get(State(state): State<AppState>) -> Json<FlagMap> {
    Json(state.features.flags().await)
}

/// GET /api/features/:key - single flag; unknown keys are disabled
pub async fn feature_get(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<serde_json::Value> {
    let enabled = state.features.is_enabled(&key).await;
    Ok(ApiResponse::success(json!({ "feature_key": key, "is_enabled": enabled })))
}
