mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::json;

use common::TestApp;
use storefront_api::database::{MemoryStore, Table};

#[tokio::test]
async fn public_map_and_single_flag() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/api/features", None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["squad_buys_enabled"], true);
    assert_eq!(res.body["ai_search_enabled"], false);

    let res = app.get("/api/features/elite_drops_enabled", None).await?;
    assert_eq!(res.body["data"], json!({ "feature_key": "elite_drops_enabled", "is_enabled": true }));

    let res = app.get("/api/features/does_not_exist", None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["is_enabled"], false);
    Ok(())
}

#[tokio::test]
async fn missing_flag_table_yields_empty_map() -> Result<()> {
    let app = TestApp::with_store(MemoryStore::new().without_table(Table::MasterConfig), |_| {});

    let res = app.get("/api/features", None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({}));
    Ok(())
}

#[tokio::test]
async fn admin_toggle_is_visible_publicly_at_once() -> Result<()> {
    let app = TestApp::new();
    let token = app.admin_token();

    // Prime the cache
    let res = app.get("/api/features", None).await?;
    assert_eq!(res.body["ai_search_enabled"], false);

    let res = app
        .patch("/api/admin/features/ai_search_enabled", Some(&token), json!({ "is_enabled": true }))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["demo"], false);
    assert_eq!(res.body["data"]["is_enabled"], true);

    let res = app.get("/api/features", None).await?;
    assert_eq!(res.body["ai_search_enabled"], true);

    let res = app.get("/api/admin/features", Some(&token)).await?;
    let keys: Vec<&str> = res.body["data"]
        .as_array()
        .map(|flags| flags.iter().filter_map(|f| f["feature_key"].as_str()).collect())
        .unwrap_or_default();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    Ok(())
}

#[tokio::test]
async fn toggle_validation() -> Result<()> {
    let app = TestApp::new();
    let token = app.admin_token();

    let res = app.patch("/api/admin/features/ai_search_enabled", Some(&token), json!({ "is_enabled": "yes" })).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.patch("/api/admin/features/unknown_flag", Some(&token), json!({ "is_enabled": true })).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn demo_toggle_is_not_persisted() -> Result<()> {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/api/admin/features/ai_search_enabled")
        .header("x-admin-demo", "1")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"is_enabled":true}"#))?;

    let res = app.send(request).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(res.body["demo"], true);
    assert_eq!(res.body["data"]["is_enabled"], true);

    let res = app.get("/api/features", None).await?;
    assert_eq!(res.body["ai_search_enabled"], false);
    Ok(())
}
