use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{where_eq, Row, Table};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, Identity, JsonBody};
use crate::services::checkout::{cart_total, decimal_to_json, CartLine};

#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: Option<Value>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartLine {
    pub quantity: Option<i64>,
}

/// GET /api/cart - the caller's cart lines and their total
pub async fn list(State(state): State<AppState>, identity: Identity) -> ApiResult<Value> {
    let rows = state
        .store
        .select(
            Table::CartItems,
            FilterData::new()
                .where_clause(where_eq("cart_id", identity.id.as_str()))
                .order("created_at asc"),
        )
        .await?;

    let lines: Vec<CartLine> = rows.iter().map(CartLine::from_row).collect();
    let total = cart_total(&lines).ok_or_else(|| ApiError::validation_error("Cart total out of range", None))?;
    let total = decimal_to_json(total);
    Ok(ApiResponse::success(json!({ "items": rows, "total": total })))
}

/// POST /api/cart - add a product at its current price, merging with an existing line
pub async fn add(
    State(state): State<AppState>,
    identity: Identity,
    JsonBody(request): JsonBody<AddToCart>,
) -> ApiResult<Row> {
    let product_id = request
        .product_id
        .filter(|p| p.as_str().map_or(!p.is_null(), |s| !s.is_empty()))
        .ok_or_else(|| ApiError::field_error("product_id", "product_id is required"))?;
    let quantity = request.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(ApiError::field_error("quantity", "quantity must be at least 1"));
    }

    let product = state
        .store
        .select(
            Table::Products,
            FilterData::new()
                .select(&["id", "price"])
                .where_clause(json!({ "id": product_id }))
                .limit(1),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let line_where = json!({ "cart_id": identity.id, "product_id": product_id });
    let existing = state
        .store
        .select(Table::CartItems, FilterData::new().where_clause(line_where.clone()).limit(1))
        .await?
        .into_iter()
        .next();

    if let Some(line) = existing {
        let current = line.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        let merged = current
            .checked_add(quantity)
            .ok_or_else(|| ApiError::field_error("quantity", "quantity is too large"))?;
        let mut patch = Row::new();
        patch.insert("quantity".to_string(), Value::from(merged));
        let rows = state.store.update(Table::CartItems, line_where, patch).await?;
        let updated = rows.into_iter().next().ok_or_else(|| ApiError::not_found("Cart item not found"))?;
        return Ok(ApiResponse::success(updated));
    }

    let mut row = Row::new();
    row.insert("cart_id".to_string(), Value::String(identity.id.clone()));
    row.insert("product_id".to_string(), product_id);
    row.insert("quantity".to_string(), Value::from(quantity));
    row.insert("price_at_add".to_string(), product.get("price").cloned().unwrap_or(Value::Null));

    let created = state
        .store
        .insert(Table::CartItems, vec![row])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal_server_error("Cart insert returned no row"))?;
    Ok(ApiResponse::created(created))
}

/// PATCH /api/cart/:id - set the quantity; zero or less removes the line
pub async fn update(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateCartLine>,
) -> ApiResult<Value> {
    let quantity = request
        .quantity
        .ok_or_else(|| ApiError::field_error("quantity", "quantity is required"))?;
    let line = json!({ "id": id, "cart_id": identity.id });

    if quantity <= 0 {
        let removed = state.store.delete(Table::CartItems, line).await?;
        if removed == 0 {
            return Err(ApiError::not_found("Cart item not found"));
        }
        return Ok(ApiResponse::success(json!({ "id": id, "removed": true })));
    }

    let mut patch = Row::new();
    patch.insert("quantity".to_string(), Value::from(quantity));
    let updated = state
        .store
        .update(Table::CartItems, line, patch)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Cart item not found"))?;
    Ok(ApiResponse::success(Value::Object(updated)))
}

/// DELETE /api/cart/:id
pub async fn remove(State(state): State<AppState>, identity: Identity, Path(id): Path<String>) -> ApiResult<Value> {
    let removed = state
        .store
        .delete(Table::CartItems, json!({ "id": id, "cart_id": identity.id }))
        .await?;
    if removed == 0 {
        return Err(ApiError::not_found("Cart item not found"));
    }
    Ok(ApiResponse::success(json!({ "ok": true })))
}
