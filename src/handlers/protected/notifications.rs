use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{where_eq, Row, Table};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, Identity, JsonBody};

const RECENT_NOTIFICATIONS: i32 = 50;

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub related_id: Option<Value>,
}

/// GET /api/notifications - newest first, with the unread count
pub async fn list(State(state): State<AppState>, identity: Identity) -> ApiResult<Value> {
    let filter = FilterData::new()
        .where_clause(where_eq("user_id", identity.id.as_str()))
        .order("created_at desc")
        .limit(RECENT_NOTIFICATIONS);
    let rows = state.store.select(Table::Notifications, filter).await?;

    let unread = rows
        .iter()
        .filter(|n| n.get("is_read").and_then(Value::as_bool) != Some(true))
        .count();
    Ok(ApiResponse::success(json!({ "notifications": rows, "unread_count": unread })))
}

/// POST /api/notifications/create
pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    JsonBody(request): JsonBody<NotificationRequest>,
) -> ApiResult<Row> {
    let title = request.title.filter(|t| !t.trim().is_empty()).ok_or_else(|| ApiError::field_error("title", "title is required"))?;

    let row = json!({
        "user_id": identity.id,
        "type": request.kind,
        "title": title,
        "content": request.content,
        "related_id": request.related_id,
    });
    let Value::Object(row) = row else {
        return Err(ApiError::internal_server_error("Failed to build notification"));
    };

    let created = state.store.insert(Table::Notifications, vec![row]).await?;
    let created = created
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal_server_error("Notification insert returned no row"))?;
    Ok(ApiResponse::created(created))
}
