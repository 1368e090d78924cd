use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub features: FeatureConfig,
    pub schema: SchemaConfig,
    pub storefront: StorefrontConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub search_result_limit: i32,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub jwt_expiry_hours: u64,
    /// Lowercased emails or user ids. Non-empty means only these may use admin routes.
    pub admin_allowlist: Vec<String>,
    pub admin_trust_threshold: f64,
    pub expose_backend_errors: bool,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    pub enabled: bool,
    pub email: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub cache_ttl_secs: i64,
}

/// Column layout of the deployed database. Several schema generations exist in the wild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub order_status_column: String,
    pub order_item_layout: OrderItemLayout,
    pub product_image_column: ImageColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderItemLayout {
    /// quantity + unit_price
    Standard,
    /// qty + price
    Legacy,
    /// standard first, legacy when the insert is rejected
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageColumn {
    ImageUrl,
    Image,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    pub currency_symbol: String,
}

impl OrderItemLayout {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "legacy" => Some(Self::Legacy),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl ImageColumn {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image_url" => Some(Self::ImageUrl),
            "image" => Some(Self::Image),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::for_environment(environment).with_env_overrides()
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("STORE_BACKEND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "memory" => self.database.backend = StoreBackend::Memory,
                "postgres" => self.database.backend = StoreBackend::Postgres,
                other => tracing::warn!("Unknown STORE_BACKEND '{}', keeping {:?}", other, self.database.backend),
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // API overrides
        if let Some(v) = env::var("STOREFRONT_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_SEARCH_RESULT_LIMIT") {
            self.api.search_result_limit = v.parse().unwrap_or(self.api.search_result_limit);
        }
        if let Ok(v) = env::var("API_EVENT_BUFFER") {
            self.api.event_buffer = v.parse().unwrap_or(self.api.event_buffer);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_AUDIENCE") {
            self.security.jwt_audience = if v.trim().is_empty() { None } else { Some(v.trim().to_string()) };
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("ADMIN_EMAILS") {
            self.security.admin_allowlist = parse_allowlist(&v);
        }
        if let Ok(v) = env::var("SECURITY_ADMIN_TRUST_THRESHOLD") {
            self.security.admin_trust_threshold = v.parse().unwrap_or(self.security.admin_trust_threshold);
        }
        if let Ok(v) = env::var("SECURITY_EXPOSE_BACKEND_ERRORS") {
            self.security.expose_backend_errors = v.parse().unwrap_or(self.security.expose_backend_errors);
        }
        if let Ok(v) = env::var("ADMIN_DEMO_ENABLED") {
            self.security.demo.enabled = v.parse().unwrap_or(self.security.demo.enabled);
        }
        if let Ok(v) = env::var("ADMIN_DEMO_EMAIL") {
            self.security.demo.email = v.trim().to_lowercase();
        }

        // Feature flag cache
        if let Ok(v) = env::var("FEATURES_CACHE_TTL_SECS") {
            self.features.cache_ttl_secs = v.parse().unwrap_or(self.features.cache_ttl_secs);
        }

        // Schema variants
        if let Ok(v) = env::var("SCHEMA_ORDER_STATUS_COLUMN") {
            match v.trim() {
                "status" | "order_status" => self.schema.order_status_column = v.trim().to_string(),
                other => tracing::warn!("Unsupported SCHEMA_ORDER_STATUS_COLUMN '{}', keeping '{}'", other, self.schema.order_status_column),
            }
        }
        if let Ok(v) = env::var("SCHEMA_ORDER_ITEM_LAYOUT") {
            self.schema.order_item_layout = OrderItemLayout::parse(&v).unwrap_or(self.schema.order_item_layout);
        }
        if let Ok(v) = env::var("SCHEMA_PRODUCT_IMAGE_COLUMN") {
            self.schema.product_image_column = ImageColumn::parse(&v).unwrap_or(self.schema.product_image_column);
        }

        if let Ok(v) = env::var("STOREFRONT_CURRENCY_SYMBOL") {
            self.storefront.currency_symbol = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                search_result_limit: 10,
                event_buffer: 256,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: String::new(),
                jwt_audience: Some("authenticated".to_string()),
                jwt_expiry_hours: 24 * 7, // 1 week
                admin_allowlist: vec![],
                admin_trust_threshold: 90.0,
                expose_backend_errors: true,
                demo: DemoConfig::default(),
            },
            features: FeatureConfig { cache_ttl_secs: 60 },
            schema: SchemaConfig::default(),
            storefront: StorefrontConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                search_result_limit: 10,
                event_buffer: 512,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_audience: Some("authenticated".to_string()),
                jwt_expiry_hours: 24,
                admin_allowlist: vec![],
                admin_trust_threshold: 90.0,
                expose_backend_errors: true,
                demo: DemoConfig::default(),
            },
            features: FeatureConfig { cache_ttl_secs: 60 },
            schema: SchemaConfig::default(),
            storefront: StorefrontConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
                search_result_limit: 10,
                event_buffer: 1024,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_audience: Some("authenticated".to_string()),
                jwt_expiry_hours: 4,
                admin_allowlist: vec![],
                admin_trust_threshold: 90.0,
                expose_backend_errors: false,
                demo: DemoConfig::default(),
            },
            features: FeatureConfig { cache_ttl_secs: 60 },
            schema: SchemaConfig::default(),
            storefront: StorefrontConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email: "demo@storefront.local".to_string(),
            user_id: "demo-admin-user".to_string(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            order_status_column: "status".to_string(),
            order_item_layout: OrderItemLayout::Auto,
            product_image_column: ImageColumn::Auto,
        }
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self { currency_symbol: "৳".to_string() }
    }
}

/// Split a comma-separated allowlist, trimming and lowercasing entries and dropping blanks.
pub fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
