use axum::extract::{Query, State};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::app::AppState;
use crate::database::{where_eq, Row, Store, StoreError, Table};
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};

use super::utils::{clamp_limit, contains, enrichment_failed, ListQuery};

const PROFILE_SEARCH_COLUMNS: &[&str] = &["id", "full_name", "name", "email", "phone"];
const USER_SEARCH_COLUMNS: &[&str] = &["email", "phone"];

/// GET /api/admin/customers?q=&limit=&withOrderCounts=1
///
/// Reads `profiles` when that table is usable and falls back to the legacy
/// `users` table. The envelope's `source` names the table that answered.
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<Row>> {
    let limit = clamp_limit(query.limit.as_deref(), 200, 500);
    let term = query.term();
    let with_counts = query.with_order_counts.as_deref() == Some("1");
    let store = state.store.as_ref();

    let (mut rows, source) = match from_profiles(store, term, limit).await {
        Ok(rows) => (rows, "profiles"),
        Err(e) => {
            tracing::debug!("profiles unavailable for customer listing: {}", e);
            let filter = base_filter(limit, term.map(|t| any_column_contains(USER_SEARCH_COLUMNS, t)));
            (store.select(Table::Users, filter).await?, "users")
        }
    };

    if with_counts {
        attach_order_counts(store, &mut rows).await;
    }
    Ok(ApiResponse::success(rows).with_field("source", source))
}

async fn from_profiles(store: &dyn Store, term: Option<&str>, limit: i32) -> Result<Vec<Row>, StoreError> {
    let Some(term) = term else {
        return store.select(Table::Profiles, base_filter(limit, None)).await;
    };

    let filtered = base_filter(limit, Some(any_column_contains(PROFILE_SEARCH_COLUMNS, term)));
    match store.select(Table::Profiles, filtered).await {
        Ok(rows) => Ok(rows),
        Err(e) => {
            // Usually a search column missing from this schema; filter in-process instead
            tracing::debug!("profile search failed, filtering in-process: {}", e);
            let rows = store.select(Table::Profiles, base_filter(limit, None)).await?;
            let needle = term.to_lowercase();
            Ok(rows
                .into_iter()
                .filter(|row| Value::Object(row.clone()).to_string().to_lowercase().contains(&needle))
                .collect())
        }
    }
}

fn base_filter(limit: i32, where_clause: Option<Value>) -> FilterData {
    let filter = FilterData::new().order("created_at desc").limit(limit);
    match where_clause {
        Some(w) => filter.where_clause(w),
        None => filter,
    }
}

fn any_column_contains(columns: &[&str], term: &str) -> Value {
    let clauses: Vec<Value> = columns.iter().map(|c| where_eq(c, contains(term))).collect();
    json!({ "$or": clauses })
}

/// Best-effort `order_count` per customer.
async fn attach_order_counts(store: &dyn Store, rows: &mut [Row]) {
    let ids: Vec<Value> = rows.iter().filter_map(|r| r.get("id").cloned()).filter(|v| !v.is_null()).collect();
    if ids.is_empty() {
        return;
    }

    let filter = FilterData::new()
        .select(&["id", "user_id"])
        .where_clause(json!({ "user_id": { "$in": ids } }));
    let orders = match store.select(Table::Orders, filter).await {
        Ok(orders) => orders,
        Err(e) => return enrichment_failed("order_count", &e),
    };

    let mut counts: HashMap<String, u64> = HashMap::new();
    for order in &orders {
        if let Some(uid) = order.get("user_id").map(text) {
            *counts.entry(uid).or_default() += 1;
        }
    }
    for row in rows.iter_mut() {
        let count = row.get("id").map(text).and_then(|id| counts.get(&id).copied()).unwrap_or(0);
        row.insert("order_count".to_string(), Value::from(count));
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    #[tokio::test]
    async fn in_process_filter_when_search_column_is_missing() {
        let store = MemoryStore::new().with_columns(Table::Profiles, &["id", "email", "full_name", "created_at"]);
        store.seed(Table::Profiles, vec![
            json!({ "id": "u1", "email": "rina@shop.com", "full_name": "Rina Das" }),
            json!({ "id": "u2", "email": "omar@shop.com", "full_name": "Omar Ali" }),
        ]);

        let rows = from_profiles(&store, Some("RINA"), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "u1");
    }

    #[tokio::test]
    async fn counts_orders_per_customer() {
        let store = MemoryStore::new();
        store.seed(Table::Orders, vec![
            json!({ "user_id": "u1" }),
            json!({ "user_id": "u1" }),
            json!({ "user_id": "u3" }),
        ]);
        let mut rows = vec![
            json!({ "id": "u1" }).as_object().cloned().unwrap(),
            json!({ "id": "u2" }).as_object().cloned().unwrap(),
        ];
        attach_order_counts(&store, &mut rows).await;
        assert_eq!(rows[0]["order_count"], 2);
        assert_eq!(rows[1]["order_count"], 0);
    }
}
