use axum::extract::{Path, Query, State};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{where_eq, Row, Table};
use crate::filter::FilterData;
use crate::middleware::{AdminSession, ApiResponse, ApiResult, JsonBody};

use super::utils::{clamp_limit, contains, first_or_not_found, pick, require_fields, ListQuery};

const FIELDS: &[&str] = &["name", "description", "icon", "display_order", "is_hidden", "slug", "icon_url"];

/// GET /api/admin/categories?q=&limit=
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<Row>> {
    let mut filter = FilterData::new()
        .order("created_at desc")
        .limit(clamp_limit(query.limit.as_deref(), 200, 500));
    if let Some(term) = query.term() {
        filter = filter.where_clause(json!({ "name": contains(term) }));
    }

    let rows = state.store.select(Table::Categories, filter).await?;
    Ok(ApiResponse::success(rows))
}

/// POST /api/admin/categories
pub async fn create(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let payload = pick(&body, FIELDS);
    let rows = state.store.insert(Table::Categories, vec![payload]).await?;
    let created = first_or_not_found(rows, "Category")?;
    tracing::info!(admin = %admin.user_id, id = ?created.get("id"), "category created");
    Ok(ApiResponse::created(created))
}

/// PATCH /api/admin/categories/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let patch = pick(&body, FIELDS);
    require_fields(&patch)?;

    let rows = state.store.update(Table::Categories, where_eq("id", id.as_str()), patch).await?;
    Ok(ApiResponse::success(first_or_not_found(rows, "Category")?))
}

/// DELETE /api/admin/categories/:id
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.store.delete(Table::Categories, where_eq("id", id.as_str())).await?;
    Ok(ApiResponse::success(json!({ "ok": true })))
}
