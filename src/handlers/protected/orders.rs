use axum::extract::State;

use crate::app::AppState;
use crate::database::Row;
use crate::middleware::{ApiResponse, ApiResult, Identity, JsonBody};
use crate::services::checkout::{Checkout, CheckoutRequest};

/// POST /api/orders/create - turn the caller's cart into an order
pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    JsonBody(request): JsonBody<CheckoutRequest>,
) -> ApiResult<Row> {
    let checkout = Checkout::new(
        state.store.as_ref(),
        &state.config.schema,
        &state.config.storefront.currency_symbol,
    );
    let order = checkout.place_order(&identity.id, request).await?;
    Ok(ApiResponse::created(order))
}
