use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{Row, Table};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Identity, JsonBody};

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// POST /api/analytics/track - record a user activity (view, add_to_cart, ...)
pub async fn track(
    State(state): State<AppState>,
    identity: Identity,
    JsonBody(request): JsonBody<TrackRequest>,
) -> ApiResult<Row> {
    let action = request
        .action
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| ApiError::field_error("action", "action is required"))?;

    let mut row = Row::new();
    row.insert("user_id".to_string(), json!(identity.id));
    row.insert("action".to_string(), json!(action));
    row.insert("product_id".to_string(), request.product_id.unwrap_or(Value::Null));
    row.insert("metadata".to_string(), request.metadata.unwrap_or_else(|| json!({})));

    let rows = state.store.insert(Table::UserActivityLogs, vec![row]).await?;
    let logged = rows
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal_server_error("Activity insert returned no row"))?;
    tracing::debug!(user_id = %identity.id, action = %action, "activity tracked");
    Ok(ApiResponse::created(logged))
}
