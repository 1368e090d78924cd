mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use storefront_api::database::{MemoryStore, Table};

fn seeded_orders() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(Table::Orders, vec![
        json!({ "id": "o-1", "user_id": "u-1", "status": "pending", "total_amount": 650 }),
        json!({ "id": "o-2", "user_id": "u-1", "status": "pending", "total_amount": 1800 }),
        json!({ "id": "o-3", "user_id": "u-2", "status": "shipped", "total_amount": 3200 }),
    ]);
    store.seed(Table::OrderItems, vec![
        json!({ "order_id": "o-1", "product_id": "p-1", "quantity": 1, "unit_price": 650 }),
    ]);
    store
}

#[tokio::test]
async fn orders_are_listed_newest_first_with_items() -> Result<()> {
    let app = TestApp::with_store(seeded_orders(), |_| {});
    let token = app.admin_token();

    let res = app.get("/api/admin/orders?limit=2", Some(&token)).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    let orders = res.body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["id"], "o-3");
    assert_eq!(orders[1]["id"], "o-2");

    let res = app.get("/api/admin/orders", Some(&token)).await?;
    let oldest = &res.body["data"][2];
    assert_eq!(oldest["id"], "o-1");
    assert_eq!(oldest["order_items"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn single_order_update() -> Result<()> {
    let app = TestApp::with_store(seeded_orders(), |_| {});
    let token = app.admin_token();

    let res = app
        .patch("/api/admin/orders/o-1", Some(&token), json!({ "status": "confirmed", "tracking_id": "TRK-1", "user_id": "hijack" }))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["data"]["status"], "confirmed");
    assert_eq!(res.body["data"]["tracking_id"], "TRK-1");
    assert_eq!(res.body["data"]["user_id"], "u-1");

    let res = app.patch("/api/admin/orders/o-1", Some(&token), json!({ "user_id": "x" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "No update fields provided");

    let res = app.patch("/api/admin/orders/missing", Some(&token), json!({ "status": "x" })).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn bulk_update_applies_to_every_id() -> Result<()> {
    let app = TestApp::with_store(seeded_orders(), |_| {});
    let token = app.admin_token();

    let res = app
        .patch("/api/admin/orders/bulk", Some(&token), json!({ "ids": ["o-1", "o-2"], "status": "shipped" }))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["data"].as_array().map(Vec::len), Some(2));
    assert!(app.rows(Table::Orders).iter().all(|o| o["status"] == "shipped"));

    let res = app.patch("/api/admin/orders/bulk", Some(&token), json!({ "ids": [], "status": "x" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "ids[] required");

    let res = app.patch("/api/admin/orders/bulk", Some(&token), json!({ "ids": ["o-1"], "tracking_id": "x" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "No update fields provided");
    Ok(())
}

#[tokio::test]
async fn bulk_update_accepts_numeric_ids() -> Result<()> {
    let store = seeded_orders();
    store.seed(Table::Orders, vec![json!({ "id": "42", "user_id": "u-3", "status": "pending", "total_amount": 650 })]);
    let app = TestApp::with_store(store, |_| {});
    let token = app.admin_token();

    let res = app
        .patch("/api/admin/orders/bulk", Some(&token), json!({ "ids": ["o-1", 42], "status": "cancelled" }))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["data"].as_array().map(Vec::len), Some(2));

    let cancelled: Vec<_> = app
        .rows(Table::Orders)
        .into_iter()
        .filter(|o| o["status"] == "cancelled")
        .filter_map(|o| o["id"].as_str().map(str::to_string))
        .collect();
    assert_eq!(cancelled, vec!["o-1".to_string(), "42".to_string()]);
    Ok(())
}

#[tokio::test]
async fn customers_come_from_profiles_with_order_counts() -> Result<()> {
    let store = seeded_orders();
    store.seed(Table::Profiles, vec![
        json!({ "id": "u-1", "email": "rina@shop.test", "full_name": "Rina Das" }),
        json!({ "id": "u-2", "email": "omar@shop.test", "full_name": "Omar Ali" }),
    ]);
    let app = TestApp::with_store(store, |_| {});

    let res = app.get("/api/admin/customers?q=rina&withOrderCounts=1", Some(&app.admin_token())).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["source"], "profiles");
    let rows = res.body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "u-1");
    assert_eq!(rows[0]["order_count"], 2);
    Ok(())
}

#[tokio::test]
async fn customers_fall_back_to_users() -> Result<()> {
    let store = MemoryStore::new().without_table(Table::Profiles);
    store.seed(Table::Users, vec![json!({ "id": "u-9", "email": "legacy@shop.test" })]);
    let app = TestApp::with_store(store, |_| {});

    let res = app.get("/api/admin/customers", Some(&app.admin_token())).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["source"], "users");
    assert_eq!(res.body["data"][0]["email"], "legacy@shop.test");
    Ok(())
}
