use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app::AppState;
use crate::database::{Row, Table};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::handlers::admin::utils::{clamp_limit, image_of};
use crate::middleware::{ApiResponse, ApiResult};

const MAX_SEARCH_RESULTS: i32 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "minPrice")]
    pub min_price: Option<String>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/search - product search by name/description with price and category filters
pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Value> {
    let term = query.q.as_deref().map(str::trim).unwrap_or("");
    if term.is_empty() {
        return Ok(ApiResponse::success(json!({ "results": [] })));
    }

    let filter = build_search_filter(&query, term, state.config.api.search_result_limit)?;
    let rows = state.store.select(Table::Products, filter).await?;
    let results: Vec<Value> = rows.iter().map(search_result).collect();

    Ok(ApiResponse::success(json!({ "results": results })))
}

pub fn build_search_filter(query: &SearchQuery, term: &str, default_limit: i32) -> Result<FilterData, ApiError> {
    let pattern = format!("%{}%", term);
    let mut clauses = vec![json!({
        "$or": [
            { "name": { "$ilike": pattern } },
            { "description": { "$ilike": pattern } },
        ]
    })];

    if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
        clauses.push(json!({ "category_id": category.trim() }));
    }

    let mut price = Map::new();
    if let Some(min) = parse_price(query.min_price.as_deref(), "minPrice")? {
        price.insert("$gte".to_string(), json!(min));
    }
    if let Some(max) = parse_price(query.max_price.as_deref(), "maxPrice")? {
        price.insert("$lte".to_string(), json!(max));
    }
    if !price.is_empty() {
        clauses.push(json!({ "price": Value::Object(price) }));
    }

    let order = match query.sort.as_deref() {
        Some("price-low") => "price asc",
        Some("price-high") => "price desc",
        Some("rating") => "rating desc",
        _ => "created_at desc",
    };

    Ok(FilterData::new()
        .where_clause(json!({ "$and": clauses }))
        .order(order)
        .limit(clamp_limit(query.limit.as_deref(), default_limit, MAX_SEARCH_RESULTS)))
}

fn parse_price(raw: Option<&str>, field: &str) -> Result<Option<f64>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ApiError::field_error(field, format!("{} must be a number", field))),
    }
}

/// `{id, name, price, category, image_url, rating}`
fn search_result(row: &Row) -> Value {
    json!({
        "id": row.get("id").cloned().unwrap_or(Value::Null),
        "name": row.get("name").cloned().unwrap_or(Value::Null),
        "price": row.get("price").cloned().unwrap_or(Value::Null),
        "category": row.get("category_id").cloned().unwrap_or(Value::Null),
        "image_url": image_of(row),
        "rating": row.get("rating").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(min: Option<&str>, max: Option<&str>, sort: Option<&str>) -> SearchQuery {
        SearchQuery {
            q: Some("tee".into()),
            min_price: min.map(String::from),
            max_price: max.map(String::from),
            sort: sort.map(String::from),
            ..SearchQuery::default()
        }
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let filter = build_search_filter(&query(Some("1000"), Some("2000"), None), "tee", 10).unwrap();
        let clauses = filter.where_clause.unwrap();
        assert_eq!(clauses["$and"][1], json!({ "price": { "$gte": 1000.0, "$lte": 2000.0 } }));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn sort_options() {
        let order = |s| build_search_filter(&query(None, None, s), "tee", 10).unwrap().order.unwrap();
        assert_eq!(order(Some("price-low")), json!("price asc"));
        assert_eq!(order(Some("price-high")), json!("price desc"));
        assert_eq!(order(Some("rating")), json!("rating desc"));
        assert_eq!(order(Some("relevance")), json!("created_at desc"));
        assert_eq!(order(None), json!("created_at desc"));
    }

    #[test]
    fn non_numeric_price_is_rejected() {
        let err = build_search_filter(&query(Some("cheap"), None, None), "tee", 10).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "minPrice must be a number");
    }

    #[test]
    fn results_prefer_image_url_then_image() {
        let row = json!({ "id": "p", "name": "Tee", "price": 5, "category_id": "c", "image": "a.png", "rating": 4 });
        let shaped = search_result(row.as_object().unwrap());
        assert_eq!(shaped["image_url"], "a.png");
        assert_eq!(shaped["category"], "c");
    }
}
