//! Checkout: cart → order → order lines → cart clear → notification + analytics.
//!
//! Only loading the cart and inserting the order can fail the request. Later
//! steps log and carry on; nothing is rolled back.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::config::{OrderItemLayout, SchemaConfig};
use crate::database::{where_eq, Row, Store, StoreError, Table};
use crate::error::ApiError;
use crate::filter::FilterData;

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub payment_method: Option<Value>,
    #[serde(default)]
    pub shipping_address: Option<Value>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart total out of range")]
    TotalOutOfRange,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart => ApiError::validation_error("Cart is empty", None),
            CheckoutError::TotalOutOfRange => ApiError::validation_error("Cart total out of range", None),
            CheckoutError::Store(e) => e.into(),
        }
    }
}

/// One cart row as far as checkout cares.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: Value,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl CartLine {
    pub fn from_row(row: &Row) -> Self {
        Self {
            product_id: row.get("product_id").cloned().unwrap_or(Value::Null),
            quantity: to_decimal(row.get("quantity")),
            price: to_decimal(row.get("price_at_add")),
        }
    }

    /// `None` when quantity × price does not fit in a `Decimal`.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }
}

/// Σ quantity × price over the lines, or `None` on overflow.
pub fn cart_total(lines: &[CartLine]) -> Option<Decimal> {
    lines
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.subtotal()?))
}

/// Numbers and numeric strings; anything else is zero.
pub fn to_decimal(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .unwrap_or(Decimal::ZERO),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Whole amounts serialize as integers, the rest as floats.
pub fn decimal_to_json(amount: Decimal) -> Value {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        if let Some(i) = normalized.to_i64() {
            return Value::from(i);
        }
    }
    normalized.to_f64().map(Value::from).unwrap_or(Value::Null)
}

pub struct Checkout<'a> {
    store: &'a dyn Store,
    schema: &'a SchemaConfig,
    currency_symbol: &'a str,
}

impl<'a> Checkout<'a> {
    pub fn new(store: &'a dyn Store, schema: &'a SchemaConfig, currency_symbol: &'a str) -> Self {
        Self { store, schema, currency_symbol }
    }

    /// Place an order from the caller's cart and return the stored order row.
    pub async fn place_order(&self, user_id: &str, request: CheckoutRequest) -> Result<Row, CheckoutError> {
        let cart = self
            .store
            .select(
                Table::CartItems,
                FilterData::new()
                    .select(&["id", "product_id", "quantity", "price_at_add"])
                    .where_clause(where_eq("cart_id", user_id)),
            )
            .await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let lines: Vec<CartLine> = cart.iter().map(CartLine::from_row).collect();
        let total = cart_total(&lines).ok_or(CheckoutError::TotalOutOfRange)?;
        let total_json = decimal_to_json(total);

        let mut order = Row::new();
        order.insert("user_id".to_string(), Value::String(user_id.to_string()));
        order.insert(self.schema.order_status_column.clone(), Value::String("pending".to_string()));
        order.insert("total_amount".to_string(), total_json.clone());
        order.insert("payment_method".to_string(), request.payment_method.unwrap_or(Value::Null));
        order.insert("shipping_address".to_string(), request.shipping_address.unwrap_or(Value::Null));

        let order = self
            .store
            .insert(Table::Orders, vec![order])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("order insert returned no row".to_string()))?;
        let order_id = order.get("id").cloned().unwrap_or(Value::Null);
        let order_id_text = match &order_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        tracing::info!(order_id = %order_id_text, user_id, total = %total, lines = lines.len(), "order created");

        self.insert_order_items(&order_id, &lines).await;

        if let Err(e) = self.store.delete(Table::CartItems, where_eq("cart_id", user_id)).await {
            tracing::warn!(order_id = %order_id_text, "cart clear failed after checkout: {}", e);
        }

        let short_id: String = order_id_text.chars().take(8).collect();
        let notification = json!({
            "user_id": user_id,
            "type": "order_status",
            "title": "Order Confirmed",
            "content": format!("Your order #{} has been confirmed. Total: {}{}", short_id, self.currency_symbol, total.normalize()),
            "related_id": order_id,
        });
        self.best_effort(Table::Notifications, notification).await;

        let event = json!({
            "event_type": "order_created",
            "user_id": user_id,
            "data": { "order_id": order_id, "total_amount": total_json },
        });
        self.best_effort(Table::AnalyticsEvents, event).await;

        Ok(order)
    }

    async fn insert_order_items(&self, order_id: &Value, lines: &[CartLine]) {
        let attempts: &[OrderItemLayout] = match self.schema.order_item_layout {
            OrderItemLayout::Standard => &[OrderItemLayout::Standard],
            OrderItemLayout::Legacy => &[OrderItemLayout::Legacy],
            OrderItemLayout::Auto => &[OrderItemLayout::Standard, OrderItemLayout::Legacy],
        };

        for layout in attempts {
            let rows = lines.iter().map(|line| order_item_row(*layout, order_id, line)).collect();
            match self.store.insert(Table::OrderItems, rows).await {
                Ok(_) => return,
                Err(e) => tracing::debug!(layout = ?layout, "order_items insert rejected: {}", e),
            }
        }
        tracing::warn!(order_id = %order_id, "order created without line items");
    }

    async fn best_effort(&self, table: Table, row: Value) {
        let Value::Object(row) = row else { return };
        if let Err(e) = self.store.insert(table, vec![row]).await {
            tracing::warn!(table = %table, "checkout side effect failed: {}", e);
        }
    }
}

fn order_item_row(layout: OrderItemLayout, order_id: &Value, line: &CartLine) -> Row {
    let (qty_col, price_col) = match layout {
        OrderItemLayout::Legacy => ("qty", "price"),
        _ => ("quantity", "unit_price"),
    };
    let mut row = Row::new();
    row.insert("order_id".to_string(), order_id.clone());
    row.insert("product_id".to_string(), line.product_id.clone());
    row.insert(qty_col.to_string(), decimal_to_json(line.quantity));
    row.insert(price_col.to_string(), decimal_to_json(line.price));
    row
}
