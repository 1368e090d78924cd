use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::{Row, Store, StoreError, Table};
use crate::filter::FilterData;

pub type FlagMap = BTreeMap<String, bool>;

/// Time-boxed copy of the flag map.
///
/// `invalidate` bumps a generation counter, so `put_if_current` refuses a map
/// loaded before the latest invalidation.
pub struct FlagCache {
    ttl: Duration,
    entry: RwLock<Option<(FlagMap, DateTime<Utc>)>>,
    generation: AtomicU64,
}

impl FlagCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self { ttl: Duration::seconds(ttl_secs), entry: RwLock::new(None), generation: AtomicU64::new(0) }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cached map while `now` is before its expiry.
    pub async fn get(&self, now: DateTime<Utc>) -> Option<FlagMap> {
        match &*self.entry.read().await {
            Some((map, expires_at)) if now < *expires_at => Some(map.clone()),
            _ => None,
        }
    }

    pub async fn put(&self, map: FlagMap, now: DateTime<Utc>) {
        *self.entry.write().await = Some((map, now + self.ttl));
    }

    /// Store `map` only if nothing invalidated the cache since `generation`
    /// was read. Returns whether it was stored.
    pub async fn put_if_current(&self, map: FlagMap, now: DateTime<Utc>, generation: u64) -> bool {
        let mut entry = self.entry.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *entry = Some((map, now + self.ttl));
        true
    }

    pub async fn invalidate(&self) {
        let mut entry = self.entry.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *entry = None;
    }
}

/// Flag as shown on the admin features page.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureFlag {
    pub feature_key: String,
    pub is_enabled: bool,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,
}

/// Sample flags served to demo callers.
pub const DEMO_FEATURES: &[(&str, bool, &str)] = &[
    ("squad_buys_enabled", true, "Group buying with discounts"),
    ("partial_cod_enabled", true, "50% prepay, 50% on delivery"),
    ("ai_search_enabled", false, "AI-powered product search"),
    ("invoicing_enabled", true, "Automatic invoice generation"),
    ("blockchain_verify_enabled", false, "Product authenticity on-chain"),
    ("spy_dashboard_enabled", true, "Live activity feed for admins"),
    ("elite_drops_enabled", true, "Premium product drops"),
    ("live_chat_enabled", false, "Customer support chat"),
];

pub fn demo_features() -> Vec<FeatureFlag> {
    DEMO_FEATURES
        .iter()
        .map(|(key, enabled, description)| FeatureFlag {
            feature_key: key.to_string(),
            is_enabled: *enabled,
            metadata: json!({ "description": description }),
            updated_at: None,
        })
        .collect()
}

pub struct FeatureService {
    store: Arc<dyn Store>,
    cache: FlagCache,
}

impl FeatureService {
    pub fn new(store: Arc<dyn Store>, cache: FlagCache) -> Self {
        Self { store, cache }
    }

    /// `feature_key → is_enabled`, from cache when fresh. A failed load yields
    /// an empty map that is not cached.
    pub async fn flags(&self) -> FlagMap {
        self.flags_at(Utc::now()).await
    }

    pub async fn flags_at(&self, now: DateTime<Utc>) -> FlagMap {
        if let Some(map) = self.cache.get(now).await {
            return map;
        }

        let generation = self.cache.generation();
        let filter = FilterData::new().select(&["feature_key", "is_enabled"]);
        match self.store.select(Table::MasterConfig, filter).await {
            Ok(rows) => {
                let map: FlagMap = rows
                    .iter()
                    .filter_map(|row| {
                        let key = row.get("feature_key")?.as_str()?.to_string();
                        Some((key, row.get("is_enabled").and_then(Value::as_bool).unwrap_or(false)))
                    })
                    .collect();
                if !self.cache.put_if_current(map.clone(), now, generation).await {
                    tracing::debug!("Flag map invalidated during load; not caching");
                }
                map
            }
            Err(e) => {
                tracing::warn!("Failed to load feature flags: {}", e);
                FlagMap::new()
            }
        }
    }

    /// Missing keys are disabled.
    pub async fn is_enabled(&self, key: &str) -> bool {
        self.flags().await.get(key).copied().unwrap_or(false)
    }

    /// Full rows for the admin page, ordered by key.
    pub async fn list(&self) -> Result<Vec<FeatureFlag>, StoreError> {
        let rows = self.store.select(Table::MasterConfig, FilterData::new().order("feature_key asc")).await?;
        Ok(rows.into_iter().map(to_feature_flag).collect())
    }

    /// Persist a toggle and drop the cached map. `None` when the key does not exist.
    pub async fn set_enabled(&self, key: &str, enabled: bool, updated_by: &str) -> Result<Option<FeatureFlag>, StoreError> {
        let mut patch = Row::new();
        patch.insert("is_enabled".to_string(), Value::Bool(enabled));
        patch.insert("updated_by".to_string(), Value::String(updated_by.to_string()));

        let rows = self
            .store
            .update(Table::MasterConfig, json!({ "feature_key": key }), patch)
            .await?;
        self.cache.invalidate().await;
        Ok(rows.into_iter().next().map(to_feature_flag))
    }
}

fn to_feature_flag(row: Row) -> FeatureFlag {
    FeatureFlag {
        feature_key: row.get("feature_key").and_then(Value::as_str).unwrap_or_default().to_string(),
        is_enabled: row.get("is_enabled").and_then(Value::as_bool).unwrap_or(false),
        metadata: row.get("metadata").cloned().unwrap_or_else(|| json!({})),
        updated_at: row.get("updated_at").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed(Table::MasterConfig, vec![
            json!({ "feature_key": "squad_buys_enabled", "is_enabled": true }),
            json!({ "feature_key": "ai_search_enabled", "is_enabled": false }),
        ]);
        store
    }

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let cache = FlagCache::new(60);
        let now = Utc::now();
        let mut map = FlagMap::new();
        map.insert("a".into(), true);
        cache.put(map, now).await;

        assert!(cache.get(now + Duration::seconds(59)).await.is_some());
        assert!(cache.get(now + Duration::seconds(60)).await.is_none());
    }

    #[tokio::test]
    async fn loads_started_before_an_invalidation_are_not_cached() {
        let cache = FlagCache::new(60);
        let now = Utc::now();
        let mut stale = FlagMap::new();
        stale.insert("a".into(), false);

        let generation = cache.generation();
        cache.invalidate().await;
        assert!(!cache.put_if_current(stale, now, generation).await);
        assert!(cache.get(now).await.is_none());

        let mut fresh = FlagMap::new();
        fresh.insert("a".into(), true);
        assert!(cache.put_if_current(fresh, now, cache.generation()).await);
        assert_eq!(cache.get(now).await.and_then(|m| m.get("a").copied()), Some(true));
    }

    #[tokio::test]
    async fn serves_cached_flags_until_expiry() {
        let store = seeded();
        let service = FeatureService::new(store.clone(), FlagCache::new(60));
        let now = Utc::now();

        assert_eq!(service.flags_at(now).await.get("squad_buys_enabled"), Some(&true));

        // Changed behind the service's back: cached value still served
        store
            .update(Table::MasterConfig, json!({ "feature_key": "squad_buys_enabled" }), json!({ "is_enabled": false }).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(service.flags_at(now + Duration::seconds(30)).await.get("squad_buys_enabled"), Some(&true));
        assert_eq!(service.flags_at(now + Duration::seconds(61)).await.get("squad_buys_enabled"), Some(&false));
    }

    #[tokio::test]
    async fn missing_keys_are_disabled() {
        let service = FeatureService::new(seeded(), FlagCache::new(60));
        assert!(service.is_enabled("squad_buys_enabled").await);
        assert!(!service.is_enabled("ai_search_enabled").await);
        assert!(!service.is_enabled("does_not_exist").await);
    }

    #[tokio::test]
    async fn load_failures_are_not_cached() {
        let store = Arc::new(MemoryStore::new().without_table(Table::MasterConfig));
        let service = FeatureService::new(store, FlagCache::new(60));
        assert!(service.flags().await.is_empty());
        assert!(service.cache.get(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn toggles_invalidate_the_cache() {
        let service = FeatureService::new(seeded(), FlagCache::new(3600));
        assert!(!service.is_enabled("ai_search_enabled").await);

        let flag = service.set_enabled("ai_search_enabled", true, "admin-1").await.unwrap().unwrap();
        assert!(flag.is_enabled);
        assert!(service.is_enabled("ai_search_enabled").await);

        assert!(service.set_enabled("nope", true, "admin-1").await.unwrap().is_none());
    }
}
