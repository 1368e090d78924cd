use axum::extract::{Path, State};
use serde_json::Value;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminSession, ApiResponse, ApiResult, JsonBody};
use crate::services::features::{demo_features, FeatureFlag};

/// GET /api/admin/features - full flag rows; demo callers get the sample set
pub async fn list(State(state): State<AppState>, admin: AdminSession) -> ApiResult<Vec<FeatureFlag>> {
    if admin.demo_mode {
        return Ok(ApiResponse::success(demo_features()).with_field("demo", true));
    }

    let flags = state.features.list().await?;
    Ok(ApiResponse::success(flags).with_field("demo", false))
}

/// PATCH /api/admin/features/:key - body `{is_enabled: bool}`
///
/// Demo toggles are echoed back without being persisted.
pub async fn toggle(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(key): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<FeatureFlag> {
    let enabled = body
        .get("is_enabled")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::field_error("is_enabled", "is_enabled must be a boolean"))?;

    if admin.demo_mode {
        let mut flag = demo_features()
            .into_iter()
            .find(|f| f.feature_key == key)
            .ok_or_else(|| ApiError::not_found("Feature not found"))?;
        flag.is_enabled = enabled;
        return Ok(ApiResponse::success(flag).with_field("demo", true));
    }

    let flag = state
        .features
        .set_enabled(&key, enabled, &admin.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Feature not found"))?;
    tracing::info!(admin = %admin.user_id, feature = %key, enabled, "feature flag toggled");
    Ok(ApiResponse::success(flag).with_field("demo", false))
}
