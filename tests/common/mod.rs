#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use storefront_api::auth::{generate_jwt, Claims};
use storefront_api::config::{AppConfig, Environment};
use storefront_api::database::{MemoryStore, Row, Table};
use storefront_api::events::{EventHub, NotifyingStore};
use storefront_api::{app, AppState};

pub const ADMIN_EMAIL: &str = "owner@shop.test";
pub const SECRET: &str = "integration-test-secret";

/// The router wired to an in-memory store, driven in-process.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub events: EventHub,
    pub config: AppConfig,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new().with_demo_data(), |_| {})
    }

    /// Build over `store`, letting the caller adjust the development config first.
    pub fn with_store(store: MemoryStore, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut config = AppConfig::for_environment(Environment::Development);
        config.security.jwt_secret = SECRET.to_string();
        config.security.jwt_audience = None;
        config.security.admin_allowlist = vec![ADMIN_EMAIL.to_string()];
        config.security.demo.enabled = true;
        configure(&mut config);

        let store = Arc::new(store);
        let events = EventHub::new(64);
        let notifying = NotifyingStore::new(store.clone(), events.clone());
        let state = AppState::new(Arc::new(notifying), events.clone(), config.clone());

        Self { store, events, config, router: app(state) }
    }

    pub fn token(&self, user_id: &str, email: Option<&str>) -> String {
        let claims = Claims::new(user_id, email.map(str::to_string), &self.config.security, 1);
        generate_jwt(&claims, &self.config.security).expect("token")
    }

    pub fn admin_token(&self) -> String {
        self.token("admin-1", Some(ADMIN_EMAIL))
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await.context("router call failed")?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok(TestResponse { status, body })
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<TestResponse> {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Result<TestResponse> {
        self.request(Method::DELETE, uri, token, None).await
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.store.rows(table)
    }

    /// Id of the first seeded product with the given name.
    pub fn product_id(&self, name: &str) -> String {
        self.rows(Table::Products)
            .into_iter()
            .find(|p| p.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|p| p.get("id").and_then(Value::as_str).map(str::to_string))
            .expect("seeded product")
    }
}
