use axum::extract::{Path, Query, State};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{where_eq, Row, Table};
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};

use super::utils::{clamp_limit, first_or_not_found, pick, require_fields, ListQuery};

const FIELDS: &[&str] = &["category_id", "name", "description", "display_order", "slug"];

/// GET /api/admin/subcategories?category_id=&limit=
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<Row>> {
    let mut filter = FilterData::new()
        .order("created_at desc")
        .limit(clamp_limit(query.limit.as_deref(), 200, 500));
    if let Some(category_id) = query.category_id.as_deref().filter(|c| !c.is_empty()) {
        filter = filter.where_clause(where_eq("category_id", category_id));
    }

    let rows = state.store.select(Table::Subcategories, filter).await?;
    Ok(ApiResponse::success(rows))
}

/// POST /api/admin/subcategories
pub async fn create(State(state): State<AppState>, JsonBody(body): JsonBody<Value>) -> ApiResult<Row> {
    let payload = pick(&body, FIELDS);
    let rows = state.store.insert(Table::Subcategories, vec![payload]).await?;
    Ok(ApiResponse::created(first_or_not_found(rows, "Subcategory")?))
}

/// PATCH /api/admin/subcategories/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let patch = pick(&body, FIELDS);
    require_fields(&patch)?;

    let rows = state.store.update(Table::Subcategories, where_eq("id", id.as_str()), patch).await?;
    Ok(ApiResponse::success(first_or_not_found(rows, "Subcategory")?))
}

/// DELETE /api/admin/subcategories/:id
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.store.delete(Table::Subcategories, where_eq("id", id.as_str())).await?;
    Ok(ApiResponse::success(json!({ "ok": true })))
}
