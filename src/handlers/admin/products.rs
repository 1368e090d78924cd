use axum::extract::{Path, Query, State};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use crate::app::AppState;
use crate::config::ImageColumn;
use crate::database::{where_eq, Row, Store, StoreError, Table};
use crate::filter::FilterData;
use crate::middleware::{AdminSession, ApiResponse, ApiResult, JsonBody};

use super::utils::{clamp_limit, contains, enrichment_failed, first_or_not_found, pick, require_fields, ListQuery};

const FIELDS: &[&str] = &[
    "vendor_id",
    "category_id",
    "subcategory_id",
    "name",
    "description",
    "price",
    "stock",
    "image_url",
    "image",
    "video_url",
    "assets_360",
    "authenticity_hash",
    "is_elite_drop",
    "rating",
    "reviews_count",
];

/// GET /api/admin/products?q=&limit=
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<Row>> {
    let mut filter = FilterData::new()
        .order("updated_at desc")
        .limit(clamp_limit(query.limit.as_deref(), 100, 200));
    if let Some(term) = query.term() {
        filter = filter.where_clause(json!({ "name": contains(term) }));
    }

    let mut rows = state.store.select(Table::Products, filter).await?;
    attach_parent(state.store.as_ref(), &mut rows, Table::Categories, "category_id", "categories").await;
    attach_parent(state.store.as_ref(), &mut rows, Table::Subcategories, "subcategory_id", "subcategories").await;
    Ok(ApiResponse::success(rows))
}

/// GET /api/admin/products/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Row> {
    let rows = state
        .store
        .select(Table::Products, FilterData::new().where_clause(where_eq("id", id.as_str())).limit(1))
        .await?;
    Ok(ApiResponse::success(first_or_not_found(rows, "Product")?))
}

/// POST /api/admin/products
pub async fn create(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let mut payload = pick(&body, FIELDS);
    if !payload.contains_key("vendor_id") {
        payload.insert("vendor_id".to_string(), Value::String(admin.user_id.clone()));
    }

    let store = state.store.clone();
    let rows = write_with_image(state.config.schema.product_image_column, payload, |row| {
        let store = store.clone();
        async move { store.insert(Table::Products, vec![row]).await }
    })
    .await?;

    let created = first_or_not_found(rows, "Product")?;
    tracing::info!(admin = %admin.user_id, id = ?created.get("id"), "product created");
    Ok(ApiResponse::created(created))
}

/// PATCH /api/admin/products/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Row> {
    let mut fields = FIELDS.to_vec();
    fields.push("updated_at");
    let patch = pick(&body, &fields);
    require_fields(&patch)?;

    let store = state.store.clone();
    let rows = write_with_image(state.config.schema.product_image_column, patch, |row| {
        let store = store.clone();
        let id = id.clone();
        async move { store.update(Table::Products, where_eq("id", id), row).await }
    })
    .await?;

    Ok(ApiResponse::success(first_or_not_found(rows, "Product")?))
}

/// DELETE /api/admin/products/:id
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.store.delete(Table::Products, where_eq("id", id.as_str())).await?;
    Ok(ApiResponse::success(json!({ "ok": true })))
}

/// Write a product payload under the configured image column. Bodies may send
/// either `image_url` or `image`; in `auto` mode `image_url` is tried first and
/// the write is repeated with `image` when that column does not exist.
pub async fn write_with_image<F, Fut>(column: ImageColumn, mut payload: Row, write: F) -> Result<Vec<Row>, StoreError>
where
    F: Fn(Row) -> Fut,
    Fut: Future<Output = Result<Vec<Row>, StoreError>>,
{
    let image_url = payload.remove("image_url");
    let image = payload.remove("image");
    let value = match (image_url, image) {
        (Some(url), _) if !url.is_null() => Some(url),
        (url, image) => image.or(url),
    };
    let Some(value) = value else {
        return write(payload).await;
    };

    let with_column = |name: &str| {
        let mut row = payload.clone();
        row.insert(name.to_string(), value.clone());
        row
    };

    match column {
        ImageColumn::ImageUrl => write(with_column("image_url")).await,
        ImageColumn::Image => write(with_column("image")).await,
        ImageColumn::Auto => match write(with_column("image_url")).await {
            Err(e) if e.is_missing_column("image_url") => {
                tracing::debug!("products.image_url missing, retrying with image");
                write(with_column("image")).await
            }
            other => other,
        },
    }
}

/// Best-effort `categories` / `subcategories` expansion, keyed by `fk`.
async fn attach_parent(store: &dyn Store, rows: &mut [Row], table: Table, fk: &str, field: &str) {
    let ids: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.get(fk).and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return;
    }

    let filter = FilterData::new().where_clause(json!({ "id": { "$in": ids.into_iter().collect::<Vec<_>>() } }));
    let parents = match store.select(table, filter).await {
        Ok(parents) => parents,
        Err(e) => return enrichment_failed(field, &e),
    };
    let by_id: HashMap<String, Row> = parents
        .into_iter()
        .filter_map(|p| Some((p.get("id")?.as_str()?.to_string(), p)))
        .collect();

    for row in rows.iter_mut() {
        let parent = row
            .get(fk)
            .and_then(Value::as_str)
            .and_then(|id| by_id.get(id))
            .cloned()
            .map(Value::Object)
            .unwrap_or(Value::Null);
        row.insert(field.to_string(), parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn auto_falls_back_to_image_column() {
        let store = MemoryStore::new().with_columns(Table::Products, &["name", "image", "vendor_id"]);
        let rows = write_with_image(ImageColumn::Auto, row(json!({ "name": "Tee", "image_url": "a.png" })), |r| {
            store.insert(Table::Products, vec![r])
        })
        .await
        .unwrap();
        assert_eq!(rows[0]["image"], "a.png");
        assert!(rows[0].get("image_url").is_none());
    }

    #[tokio::test]
    async fn image_body_field_is_written_as_image_url() {
        let store = MemoryStore::new();
        let rows = write_with_image(ImageColumn::Auto, row(json!({ "name": "Tee", "image": "b.png" })), |r| {
            store.insert(Table::Products, vec![r])
        })
        .await
        .unwrap();
        assert_eq!(rows[0]["image_url"], "b.png");
        assert!(rows[0].get("image").is_none());
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let store = MemoryStore::new().with_columns(Table::Products, &["image"]);
        let err = write_with_image(ImageColumn::Auto, row(json!({ "name": "Tee", "image_url": "a.png" })), |r| {
            store.insert(Table::Products, vec![r])
        })
        .await
        .unwrap_err();
        assert!(err.is_missing_column("name"));
    }

    #[tokio::test]
    async fn expansions_attach_parents() {
        let store = MemoryStore::new();
        store.seed(Table::Categories, vec![json!({ "id": "c1", "name": "Apparel" })]);
        let mut rows = vec![row(json!({ "id": "p1", "category_id": "c1" })), row(json!({ "id": "p2", "category_id": "gone" }))];

        attach_parent(&store, &mut rows, Table::Categories, "category_id", "categories").await;
        assert_eq!(rows[0]["categories"]["name"], "Apparel");
        assert_eq!(rows[1]["categories"], Value::Null);
    }
}
