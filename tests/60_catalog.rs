mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use storefront_api::config::ImageColumn;
use storefront_api::database::{MemoryStore, Table};

#[tokio::test]
async fn category_lifecycle() -> Result<()> {
    let app = TestApp::new();
    let token = app.admin_token();

    let res = app
        .post("/api/admin/categories", Some(&token), json!({ "name": "Footwear", "display_order": 3, "bogus": 1 }))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED, "unexpected body: {}", res.body);
    assert!(res.body["data"].get("bogus").is_none());
    let id = res.body["data"]["id"].as_str().unwrap_or_default().to_string();

    let res = app.get("/api/admin/categories?q=foot", Some(&token)).await?;
    assert_eq!(res.body["data"].as_array().map(Vec::len), Some(1));

    let res = app.patch(&format!("/api/admin/categories/{}", id), Some(&token), json!({ "is_hidden": true })).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["is_hidden"], true);

    let res = app.delete(&format!("/api/admin/categories/{}", id), Some(&token)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"], json!({ "ok": true }));
    assert_eq!(app.rows(Table::Categories).len(), 2);
    Ok(())
}

#[tokio::test]
async fn subcategories_are_managed_under_admin() -> Result<()> {
    let app = TestApp::new();
    let token = app.admin_token();

    let res = app.post("/api/admin/subcategories", Some(&token), json!({ "name": "Hoodies" })).await?;
    assert_eq!(res.status, StatusCode::CREATED, "unexpected body: {}", res.body);

    let res = app.get("/api/admin/subcategories", Some(&token)).await?;
    assert_eq!(res.body["data"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn products_are_listed_with_their_category() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/api/admin/products?q=tee", Some(&app.admin_token())).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    let product = &res.body["data"][0];
    assert_eq!(product["name"], "Classic Tee");
    assert_eq!(product["categories"]["name"], "Apparel");
    assert_eq!(product["subcategories"]["name"], "T-Shirts");
    Ok(())
}

#[tokio::test]
async fn product_create_defaults_vendor_and_update_touches_fields() -> Result<()> {
    let app = TestApp::new();
    let token = app.admin_token();

    let res = app
        .post("/api/admin/products", Some(&token), json!({ "name": "Cap", "price": 400, "image": "cap.png" }))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED, "unexpected body: {}", res.body);
    assert_eq!(res.body["data"]["vendor_id"], "admin-1");
    let id = res.body["data"]["id"].as_str().unwrap_or_default().to_string();

    let res = app.patch(&format!("/api/admin/products/{}", id), Some(&token), json!({ "stock": 9 })).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["stock"], 9);

    let res = app.get(&format!("/api/admin/products/{}", id), Some(&token)).await?;
    assert_eq!(res.body["data"]["name"], "Cap");

    let res = app.patch(&format!("/api/admin/products/{}", id), Some(&token), json!({})).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.get("/api/admin/products/unknown", Some(&token)).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn product_image_falls_back_to_legacy_column() -> Result<()> {
    let store = MemoryStore::new().with_columns(
        Table::Products,
        &["id", "created_at", "updated_at", "vendor_id", "name", "price", "image"],
    );
    let app = TestApp::with_store(store, |config| config.schema.product_image_column = ImageColumn::Auto);

    let res = app
        .post("/api/admin/products", Some(&app.admin_token()), json!({ "name": "Mug", "price": 300, "image_url": "mug.png" }))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED, "unexpected body: {}", res.body);
    assert_eq!(res.body["data"]["image"], "mug.png");
    Ok(())
}

#[tokio::test]
async fn backend_errors_surface_as_400() -> Result<()> {
    let store = MemoryStore::new().with_read_only(Table::Categories);
    let app = TestApp::with_store(store, |_| {});

    let res = app.post("/api/admin/categories", Some(&app.admin_token()), json!({ "name": "X" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["success"], false);
    assert_eq!(res.body["code"], "BACKEND_ERROR");
    assert_eq!(res.body["error"], "permission denied for table categories");
    Ok(())
}

#[tokio::test]
async fn backend_error_messages_are_redacted_when_not_exposed() -> Result<()> {
    let store = MemoryStore::new().with_read_only(Table::Categories);
    let app = TestApp::with_store(store, |config| config.security.expose_backend_errors = false);

    let res = app.post("/api/admin/categories", Some(&app.admin_token()), json!({ "name": "X" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "BACKEND_ERROR");
    assert_eq!(res.body["error"], "The request could not be completed");

    // Other error codes pass through untouched
    let res = app.get("/api/admin/products/missing", Some(&app.admin_token())).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "NOT_FOUND");
    Ok(())
}
