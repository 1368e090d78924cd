use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, Environment};
use crate::database::Store;
use crate::events::EventHub;
use crate::handlers::{admin, protected, public};
use crate::middleware::{redact_backend_errors, require_admin, require_admin_or_demo, resolve_session};
use crate::services::features::{FeatureService, FlagCache};

/// Shared handler state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub features: Arc<FeatureService>,
    pub events: EventHub,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// `store` should already publish to `events` (see `NotifyingStore`).
    pub fn new(store: Arc<dyn Store>, events: EventHub, config: AppConfig) -> Self {
        let cache = FlagCache::new(config.features.cache_ttl_secs);
        let features = Arc::new(FeatureService::new(store.clone(), cache));
        Self { store, features, events, config: Arc::new(config) }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(public_routes())
        // Authenticated customers
        .merge(customer_routes())
        // Admin back-office
        .merge(admin_routes(&state))
        .merge(admin_feature_routes(&state))
        // Global middleware
        .layer(from_fn_with_state(state.clone(), resolve_session))
        .layer(from_fn_with_state(state.clone(), redact_backend_errors))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/features", get(public::features_get))
        .route("/api/features/:key", get(public::feature_get))
        .route("/api/search", get(public::search))
}

fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders/create", post(protected::orders::create))
        .route("/api/cart", get(protected::cart::list).post(protected::cart::add))
        .route("/api/cart/:id", patch(protected::cart::update).delete(protected::cart::remove))
        .route("/api/notifications", get(protected::notifications::list))
        .route("/api/notifications/create", post(protected::notifications::create))
        .route("/api/analytics/track", post(protected::analytics::track))
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/api/admin/categories", get(admin::categories::list).post(admin::categories::create))
        .route("/api/admin/categories/:id", patch(admin::categories::update).delete(admin::categories::remove))
        .route("/api/admin/subcategories", get(admin::subcategories::list).post(admin::subcategories::create))
        .route("/api/admin/subcategories/:id", patch(admin::subcategories::update).delete(admin::subcategories::remove))
        .route("/api/admin/products", get(admin::products::list).post(admin::products::create))
        .route(
            "/api/admin/products/:id",
            get(admin::products::show)
                .patch(admin::products::update)
                .delete(admin::products::remove),
        )
        // Orders and customers
        .route("/api/admin/orders", get(admin::orders::list))
        .route("/api/admin/orders/bulk", patch(admin::orders::bulk_update))
        .route("/api/admin/orders/:id", patch(admin::orders::update))
        .route("/api/admin/customers", get(admin::customers::list))
        // Live change feed
        .route("/api/admin/events", get(admin::events::stream))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
}

fn admin_feature_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/features", get(admin::features::list))
        .route("/api/admin/features/:key", patch(admin::features::toggle))
        .route_layer(from_fn_with_state(state.clone(), require_admin_or_demo))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}
