use axum::extract::{Path, Query, State};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::app::AppState;
use crate::database::{where_eq, Row, Store, Table};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{AdminSession, ApiResponse, ApiResult, JsonBody};

use super::utils::{clamp_limit, enrichment_failed, first_or_not_found, pick, require_fields, ListQuery};

const FIELDS: &[&str] = &[
    "status",
    "order_status",
    "payment_status",
    "paid_amount",
    "due_amount",
    "tracking_id",
    "is_partial_cod",
    "risk_score",
    "updated_at",
];

const BULK_FIELDS: &[&str] = &["status", "order_status", "payment_status"];

/// GET /api/admin/orders?limit= - newest first, with line items when available
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<Row>> {
    let filter = FilterData::new()
        .order("created_at desc")
        .limit(clamp_limit(query.limit.as_deref(), 100, 200));

    let mut rows = state.store.select(Table::Orders, filter).await?;
    attach_items(state.store.as_ref(), &mut rows).await;
    Ok(ApiResponse::success(rows))
}

/// PATCH /api/admin/orders/:id
pub async fn update(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let patch = pick(&body, FIELDS);
    require_fields(&patch)?;

    let rows = state.store.update(Table::Orders, where_eq("id", id.as_str()), patch).await?;
    let order = first_or_not_found(rows, "Order")?;
    tracing::info!(admin = %admin.user_id, order_id = %id, "order updated");
    Ok(ApiResponse::success(order))
}

/// PATCH /api/admin/orders/bulk - body `{ids: [...], status?, order_status?, payment_status?}`
pub async fn bulk_update(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Vec<Row>> {
    let ids = bulk_ids(&body);
    if ids.is_empty() {
        return Err(ApiError::field_error("ids", "ids[] required"));
    }

    let updates = pick(&body, BULK_FIELDS);
    require_fields(&updates)?;

    let requested = ids.len();
    let rows = state
        .store
        .update(Table::Orders, json!({ "id": { "$in": ids } }), updates)
        .await?;
    tracing::info!(admin = %admin.user_id, requested, updated = rows.len(), "bulk order update");
    Ok(ApiResponse::success(rows))
}

/// Non-empty string or numeric ids from `body.ids`, as strings so the `$in`
/// list has a single type.
fn bulk_ids(body: &Value) -> Vec<Value> {
    body.get("ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(Value::String(s.clone())),
                    Value::Number(n) => Some(Value::String(n.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Best-effort `order_items` expansion.
async fn attach_items(store: &dyn Store, orders: &mut [Row]) {
    let ids: Vec<Value> = orders.iter().filter_map(|o| o.get("id").cloned()).collect();
    if ids.is_empty() {
        return;
    }

    let filter = FilterData::new().where_clause(json!({ "order_id": { "$in": ids } }));
    let items = match store.select(Table::OrderItems, filter).await {
        Ok(items) => items,
        Err(e) => return enrichment_failed("order_items", &e),
    };

    let mut by_order: HashMap<String, Vec<Value>> = HashMap::new();
    for item in items {
        if let Some(order_id) = item.get("order_id").map(id_key) {
            by_order.entry(order_id).or_default().push(Value::Object(item));
        }
    }
    for order in orders.iter_mut() {
        let lines = order
            .get("id")
            .map(id_key)
            .and_then(|id| by_order.remove(&id))
            .unwrap_or_default();
        order.insert("order_items".to_string(), Value::Array(lines));
    }
}

fn id_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
