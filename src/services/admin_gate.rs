//! Admin authorization.
//!
//! Policy, first match wins:
//! 1. no identity: 401
//! 2. non-empty allowlist: caller email or id must be listed, else 403
//! 3. `profiles` row: role admin/owner, `is_admin`, or trust score at the threshold
//! 4. legacy `users.is_admin`
//! 5. otherwise 403
//!
//! Lookup failures in steps 3 and 4 count as "no signal".

use serde_json::Value;

use crate::config::SecurityConfig;
use crate::database::{where_eq, Row, Store, Table};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::session::Identity;

pub const DENIED_MESSAGE: &str = "Forbidden (admin only). Set ADMIN_EMAILS or add profiles.is_admin/role.";

/// What granted admin access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminSignal {
    Allowlist,
    ProfileRole,
    ProfileFlag,
    TrustScore,
    LegacyFlag,
}

#[derive(Debug)]
pub enum GateDecision {
    Allowed(AdminSignal),
    Denied(ApiError),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed(_))
    }
}

pub async fn evaluate(caller: Option<&Identity>, security: &SecurityConfig, store: &dyn Store) -> GateDecision {
    let Some(identity) = caller else {
        return GateDecision::Denied(ApiError::unauthorized("Unauthorized"));
    };

    if !security.admin_allowlist.is_empty() {
        let email = identity.email.as_deref().unwrap_or("").to_lowercase();
        let id = identity.id.to_lowercase();
        let listed = security
            .admin_allowlist
            .iter()
            .any(|entry| (!email.is_empty() && *entry == email) || *entry == id);
        return if listed {
            GateDecision::Allowed(AdminSignal::Allowlist)
        } else {
            tracing::info!(user_id = %identity.id, "admin access denied: not in allowlist");
            GateDecision::Denied(ApiError::forbidden("Forbidden"))
        };
    }

    if let Some(profile) = lookup(store, Table::Profiles, &identity.id).await {
        if let Some(signal) = profile_signal(&profile, security.admin_trust_threshold) {
            return GateDecision::Allowed(signal);
        }
    }

    if let Some(user) = lookup(store, Table::Users, &identity.id).await {
        if user.get("is_admin").and_then(Value::as_bool) == Some(true) {
            return GateDecision::Allowed(AdminSignal::LegacyFlag);
        }
    }

    tracing::info!(user_id = %identity.id, "admin access denied: no admin signal");
    GateDecision::Denied(ApiError::forbidden(DENIED_MESSAGE))
}

fn profile_signal(profile: &Row, trust_threshold: f64) -> Option<AdminSignal> {
    let role = profile.get("role").and_then(Value::as_str).map(|r| r.to_lowercase());
    if matches!(role.as_deref(), Some("admin") | Some("owner")) {
        return Some(AdminSignal::ProfileRole);
    }
    if profile.get("is_admin").and_then(Value::as_bool) == Some(true) {
        return Some(AdminSignal::ProfileFlag);
    }
    let trust = match profile.get("trust_score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match trust {
        Some(score) if score >= trust_threshold => Some(AdminSignal::TrustScore),
        _ => None,
    }
}

async fn lookup(store: &dyn Store, table: Table, id: &str) -> Option<Row> {
    let filter = FilterData::new().where_clause(where_eq("id", id)).limit(1);
    match store.select(table, filter).await {
        Ok(rows) => rows.into_iter().next(),
        Err(e) => {
            tracing::debug!(table = %table, "admin signal lookup failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Environment};
    use crate::database::MemoryStore;
    use serde_json::json;

    fn security(allowlist: &[&str]) -> SecurityConfig {
        let mut security = AppConfig::for_environment(Environment::Development).security;
        security.admin_allowlist = allowlist.iter().map(|s| s.to_string()).collect();
        security
    }

    fn identity(id: &str, email: &str) -> Identity {
        Identity { id: id.to_string(), email: Some(email.to_string()) }
    }

    #[tokio::test]
    async fn anonymous_is_unauthorized() {
        let store = MemoryStore::new();
        match evaluate(None, &security(&[]), &store).await {
            GateDecision::Denied(err) => assert_eq!(err.status_code(), 401),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn allowlist_short_circuits_profile_role() {
        let store = MemoryStore::new();
        store.seed(Table::Profiles, vec![json!({ "id": "u1", "role": "admin" })]);

        let decision = evaluate(Some(&identity("u1", "staff@shop.com")), &security(&["owner@shop.com"]), &store).await;
        match decision {
            GateDecision::Denied(err) => {
                assert_eq!(err.status_code(), 403);
                assert_eq!(err.message(), "Forbidden");
            }
            other => panic!("expected denial, got {:?}", other),
        }

        let decision = evaluate(Some(&identity("u2", "Owner@Shop.com")), &security(&["owner@shop.com"]), &store).await;
        assert!(matches!(decision, GateDecision::Allowed(AdminSignal::Allowlist)));
    }

    #[tokio::test]
    async fn allowlist_accepts_user_ids() {
        let store = MemoryStore::new();
        let decision = evaluate(Some(&identity("abc-123", "x@y.z")), &security(&["abc-123"]), &store).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn profile_signals_in_order() {
        let store = MemoryStore::new();
        store.seed(Table::Profiles, vec![
            json!({ "id": "owner", "role": "OWNER" }),
            json!({ "id": "flagged", "role": "customer", "is_admin": true }),
            json!({ "id": "trusted", "trust_score": 90 }),
            json!({ "id": "almost", "trust_score": "89.5" }),
        ]);
        let sec = security(&[]);
        assert!(matches!(evaluate(Some(&identity("owner", "a@b.c")), &sec, &store).await, GateDecision::Allowed(AdminSignal::ProfileRole)));
        assert!(matches!(evaluate(Some(&identity("flagged", "a@b.c")), &sec, &store).await, GateDecision::Allowed(AdminSignal::ProfileFlag)));
        assert!(matches!(evaluate(Some(&identity("trusted", "a@b.c")), &sec, &store).await, GateDecision::Allowed(AdminSignal::TrustScore)));
        assert!(!evaluate(Some(&identity("almost", "a@b.c")), &sec, &store).await.is_allowed());
    }

    #[tokio::test]
    async fn legacy_users_flag_and_lookup_failures() {
        let store = MemoryStore::new().without_table(Table::Profiles);
        store.seed(Table::Users, vec![json!({ "id": "legacy", "is_admin": true })]);
        let sec = security(&[]);

        assert!(matches!(evaluate(Some(&identity("legacy", "a@b.c")), &sec, &store).await, GateDecision::Allowed(AdminSignal::LegacyFlag)));
        match evaluate(Some(&identity("nobody", "a@b.c")), &sec, &store).await {
            GateDecision::Denied(err) => assert_eq!(err.message(), DENIED_MESSAGE),
            other => panic!("expected denial, got {:?}", other),
        }
    }
}
