use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::session::Caller;
use crate::services::admin_gate::{self, GateDecision};

/// Admin context attached by the gate middleware.
#[derive(Clone, Debug)]
pub struct AdminSession {
    pub user_id: String,
    pub email: Option<String>,
    pub demo_mode: bool,
}

/// Gate for `/api/admin/*`. Demo callers are treated as anonymous.
pub async fn require_admin(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let caller = request.extensions().get::<Caller>().cloned().unwrap_or(Caller::Anonymous);

    match admit(&state, &caller).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Gate for the admin feature-flag routes, which also serve demo callers.
pub async fn require_admin_or_demo(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let caller = request.extensions().get::<Caller>().cloned().unwrap_or(Caller::Anonymous);

    let admitted = match &caller {
        Caller::Demo(identity) => Ok(AdminSession {
            user_id: identity.id.clone(),
            email: identity.email.clone(),
            demo_mode: true,
        }),
        _ => admit(&state, &caller).await,
    };

    match admitted {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

async fn admit(state: &AppState, caller: &Caller) -> Result<AdminSession, ApiError> {
    let identity = caller.identity();
    match admin_gate::evaluate(identity, &state.config.security, state.store.as_ref()).await {
        GateDecision::Allowed(signal) => {
            // evaluate only allows callers that have an identity
            let identity = identity.ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
            tracing::debug!(user_id = %identity.id, signal = ?signal, "admin access granted");
            Ok(AdminSession {
                user_id: identity.id.clone(),
                email: identity.email.clone(),
                demo_mode: false,
            })
        }
        GateDecision::Denied(err) => Err(err),
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminSession>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}
