use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::decode_jwt;
use crate::error::ApiError;

pub const DEMO_HEADER: &str = "x-admin-demo";

/// Authenticated user behind a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
}

/// Who is calling. Resolved once per request and stored in extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(Identity),
    /// Demo-mode bypass identity; only honoured by demo-aware routes.
    Demo(Identity),
}

impl Caller {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Caller::User(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Resolve the caller from the bearer token (or the demo header) and attach it
/// to the request. Never rejects; routes decide what they require.
pub async fn resolve_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let caller = resolve_caller(&state, request.headers());
    request.extensions_mut().insert(caller);
    next.run(request).await
}

fn resolve_caller(state: &AppState, headers: &HeaderMap) -> Caller {
    let security = &state.config.security;

    if let Some(token) = extract_bearer(headers) {
        match decode_jwt(token, security) {
            Ok(claims) => {
                return Caller::User(Identity {
                    id: claims.sub,
                    email: claims.email.map(|e| e.to_lowercase()),
                })
            }
            Err(e) => tracing::debug!("ignoring bearer token: {}", e),
        }
    }

    let demo_requested = headers
        .get(DEMO_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false);
    if demo_requested && security.demo.enabled {
        return Caller::Demo(Identity {
            id: security.demo.user_id.clone(),
            email: Some(security.demo.email.clone()),
        });
    }

    Caller::Anonymous
}

/// Extract JWT token from Authorization header
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get("authorization")?.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ").or_else(|| auth_str.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Handlers taking an `Identity` reject anonymous and demo callers with 401.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .and_then(Caller::identity)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn only_users_have_identity() {
        let id = Identity { id: "u".into(), email: None };
        assert!(Caller::User(id.clone()).identity().is_some());
        assert!(Caller::Demo(id).identity().is_none());
        assert!(Caller::Anonymous.identity().is_none());
    }
}
