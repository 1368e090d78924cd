//! Table-level access to the storefront database.
//!
//! Rows travel as JSON objects because deployed schemas differ in column naming;
//! handlers pick the fields they understand and pass the rest through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::filter::FilterData;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Categories,
    Subcategories,
    Products,
    Orders,
    OrderItems,
    CartItems,
    Profiles,
    Users,
    Notifications,
    AnalyticsEvents,
    UserActivityLogs,
    MasterConfig,
}

impl Table {
    pub const ALL: [Table; 12] = [
        Table::Categories,
        Table::Subcategories,
        Table::Products,
        Table::Orders,
        Table::OrderItems,
        Table::CartItems,
        Table::Profiles,
        Table::Users,
        Table::Notifications,
        Table::AnalyticsEvents,
        Table::UserActivityLogs,
        Table::MasterConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Subcategories => "subcategories",
            Table::Products => "products",
            Table::Orders => "orders",
            Table::OrderItems => "order_items",
            Table::CartItems => "cart_items",
            Table::Profiles => "profiles",
            Table::Users => "users",
            Table::Notifications => "notifications",
            Table::AnalyticsEvents => "analytics_events",
            Table::UserActivityLogs => "user_activity_logs",
            Table::MasterConfig => "master_config",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        Table::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Key column used when a write event has to name the affected row.
    pub fn key_column(&self) -> &'static str {
        match self {
            Table::MasterConfig => "feature_key",
            _ => "id",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected the operation. The message is the backend's own.
    #[error("{0}")]
    Backend(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// True when the backend complained that `column` is not part of the table.
    pub fn is_missing_column(&self, column: &str) -> bool {
        let msg = self.to_string().to_lowercase();
        let col = column.to_lowercase();
        msg.contains(&col)
            && (msg.contains("does not exist")
                || msg.contains("schema cache")
                || msg.contains("could not find")
                || msg.contains("unknown column"))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StoreError::Backend(db.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<crate::filter::error::FilterError> for StoreError {
    fn from(err: crate::filter::error::FilterError) -> Self {
        StoreError::InvalidQuery(err.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Rows of `table` matching the filter (where, order, limit, select).
    async fn select(&self, table: Table, filter: FilterData) -> Result<Vec<Row>, StoreError>;

    /// Insert rows and return them as stored, including generated columns.
    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError>;

    /// Apply `patch` to every row matching `where_clause`, returning the updated rows.
    async fn update(&self, table: Table, where_clause: Value, patch: Row) -> Result<Vec<Row>, StoreError>;

    /// Delete rows matching `where_clause`, returning how many were removed.
    async fn delete(&self, table: Table, where_clause: Value) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Convenience for `{ column: value }` where clauses.
pub fn where_eq(column: &str, value: impl Into<Value>) -> Value {
    let mut map = Map::new();
    map.insert(column.to_string(), value.into());
    Value::Object(map)
}

/// Shared stores (e.g. a test keeping a handle on its `MemoryStore`).
#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn select(&self, table: Table, filter: FilterData) -> Result<Vec<Row>, StoreError> {
        (**self).select(table, filter).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        (**self).insert(table, rows).await
    }

    async fn update(&self, table: Table, where_clause: Value, patch: Row) -> Result<Vec<Row>, StoreError> {
        (**self).update(table, where_clause, patch).await
    }

    async fn delete(&self, table: Table, where_clause: Value) -> Result<u64, StoreError> {
        (**self).delete(table, where_clause).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_missing_column_messages() {
        let err = StoreError::Backend("column \"image_url\" of relation \"products\" does not exist".into());
        assert!(err.is_missing_column("image_url"));
        assert!(!err.is_missing_column("video_url"));

        let err = StoreError::Backend("Could not find the 'image_url' column of 'products' in the schema cache".into());
        assert!(err.is_missing_column("IMAGE_URL"));

        let err = StoreError::Backend("permission denied for table products".into());
        assert!(!err.is_missing_column("products"));
    }

    #[test]
    fn table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
        assert_eq!(Table::parse("pg_catalog"), None);
    }
}
