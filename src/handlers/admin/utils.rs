use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::{Row, StoreError};
use crate::error::ApiError;

/// Query parameters shared by the admin list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub limit: Option<String>,
    pub category_id: Option<String>,
    #[serde(rename = "withOrderCounts")]
    pub with_order_counts: Option<String>,
}

impl ListQuery {
    /// Trimmed search term, if any.
    pub fn term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Copy the listed keys that are present in `body`. Nulls are kept so a
/// column can be cleared.
pub fn pick(body: &Value, keys: &[&str]) -> Row {
    let mut out = Row::new();
    if let Value::Object(map) = body {
        for key in keys {
            if let Some(v) = map.get(*key) {
                out.insert(key.to_string(), v.clone());
            }
        }
    }
    out
}

/// `limit` query value, defaulting when absent or unparseable, capped at `max`.
pub fn clamp_limit(raw: Option<&str>, default: i32, max: i32) -> i32 {
    let requested = raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| v.floor() as i64)
        .unwrap_or(default as i64);
    requested.min(max as i64) as i32
}

/// `{"$ilike": "%term%"}`
pub fn contains(term: &str) -> Value {
    json!({ "$ilike": format!("%{}%", term) })
}

/// First row of a write or lookup, or 404.
pub fn first_or_not_found(rows: Vec<Row>, what: &str) -> Result<Row, ApiError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(format!("{} not found", what)))
}

pub fn require_fields(patch: &Row) -> Result<(), ApiError> {
    if patch.is_empty() {
        Err(ApiError::bad_request("No update fields provided"))
    } else {
        Ok(())
    }
}

/// Product image regardless of which column the schema uses.
pub fn image_of(row: &Row) -> Value {
    ["image_url", "image"]
        .iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Log a best-effort enrichment failure.
pub fn enrichment_failed(what: &str, err: &StoreError) {
    tracing::debug!("{} skipped: {}", what, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_keeps_only_listed_keys() {
        let body = json!({ "name": "Tee", "id": "forged", "description": null });
        let row = pick(&body, &["name", "description", "slug"]);
        assert_eq!(Value::Object(row), json!({ "name": "Tee", "description": null }));
        assert!(pick(&json!([1, 2]), &["name"]).is_empty());
    }

    #[test]
    fn limits_default_and_cap() {
        assert_eq!(clamp_limit(None, 200, 500), 200);
        assert_eq!(clamp_limit(Some("50"), 200, 500), 50);
        assert_eq!(clamp_limit(Some("9000"), 200, 500), 500);
        assert_eq!(clamp_limit(Some("abc"), 100, 200), 100);
        assert_eq!(clamp_limit(Some("0"), 100, 200), 100);
    }

    #[test]
    fn list_query_term() {
        let q = ListQuery { q: Some("  ".into()), ..ListQuery::default() };
        assert_eq!(q.term(), None);
        let q = ListQuery { q: Some(" tee ".into()), ..ListQuery::default() };
        assert_eq!(q.term(), Some("tee"));
    }
}
