mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::TestApp;

fn names(body: &Value) -> Vec<String> {
    body["data"]["results"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["name"].as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn blank_query_returns_no_results() -> Result<()> {
    let app = TestApp::new();

    for uri in ["/api/search", "/api/search?q=", "/api/search?q=%20%20"] {
        let res = app.get(uri, None).await?;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["data"]["results"], json!([]), "{}", uri);
    }
    Ok(())
}

#[tokio::test]
async fn matches_name_or_description_case_insensitively() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/api/search?q=TEE", None).await?;
    assert_eq!(res.status, StatusCode::OK, "unexpected body: {}", res.body);
    assert_eq!(names(&res.body), vec!["Classic Tee"]);

    let result = &res.body["data"]["results"][0];
    for field in ["id", "name", "price", "category", "image_url", "rating"] {
        assert!(result.get(field).is_some(), "missing {}", field);
    }

    let res = app.get("/api/search?q=noise", None).await?;
    assert_eq!(names(&res.body), vec!["Wireless Earbuds"]);
    Ok(())
}

#[tokio::test]
async fn price_bounds_and_sorting() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/api/search?q=e&sort=price-high", None).await?;
    assert_eq!(names(&res.body), vec!["Wireless Earbuds", "Limited Hoodie", "Classic Tee"]);

    let res = app.get("/api/search?q=e&sort=price-low&maxPrice=2000", None).await?;
    assert_eq!(names(&res.body), vec!["Classic Tee", "Limited Hoodie"]);

    let res = app.get("/api/search?q=e&minPrice=1000&maxPrice=2000", None).await?;
    assert_eq!(names(&res.body), vec!["Limited Hoodie"]);

    let res = app.get("/api/search?q=e&sort=rating&limit=1", None).await?;
    assert_eq!(names(&res.body), vec!["Limited Hoodie"]);
    Ok(())
}

#[tokio::test]
async fn non_numeric_price_is_rejected() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/api/search?q=tee&minPrice=cheap", None).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "minPrice must be a number");
    Ok(())
}
