//! Bearer-token guard for axum routes
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{middleware::from_fn_with_state, routing::get, Router};
//! use token_gate::auth::{AuthorizationService, Gate};
//! use token_gate::middleware::{require_client, AuthenticatedClient, RouteGuard};
//!
//! async fn whoami(AuthenticatedClient(client): AuthenticatedClient) -> String {
//!     client.permissions().to_string()
//! }
//!
//! let mut service = AuthorizationService::new();
//! service.register_token("mytoken");
//! let gate = Gate::new(Arc::new(service));
//!
//! let app: Router = Router::new()
//!     .route("/admin", get(whoami))
//!     .route_layer(from_fn_with_state(
//!         RouteGuard::with_permissions(gate, ["admin"]),
//!         require_client,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::auth::{Client, Decision, Gate, PermissionSet};

/// Gate plus the permissions a group of routes requires
#[derive(Debug, Clone)]
pub struct RouteGuard {
    gate: Gate,
    required: Arc<PermissionSet>,
}

impl RouteGuard {
    /// Let any known client through
    pub fn protect(gate: Gate) -> Self {
        Self {
            gate,
            required: Arc::new(PermissionSet::new()),
        }
    }

    /// Let through known clients holding all of `required`
    pub fn with_permissions<I, S>(gate: Gate, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gate,
            required: Arc::new(required.into_iter().collect()),
        }
    }

    pub fn required(&self) -> &PermissionSet {
        &self.required
    }
}

/// The client a request was authorized as, set by [`require_client`]
#[derive(Debug, Clone)]
pub struct AuthenticatedClient(pub Arc<Client>);

impl<S> FromRequestParts<S> for AuthenticatedClient
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedClient>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The scheme is matched case-insensitively. Returns `None` for a missing
/// header, another scheme or an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware rejecting requests the guard's gate does not allow
///
/// Unknown or missing credentials get 401 with a `WWW-Authenticate`
/// challenge, missing permissions get 403. A failing resolver is answered
/// with the [`AppError`](crate::AppError) response.
pub async fn require_client(
    State(guard): State<RouteGuard>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        debug!(path = %req.uri().path(), "Missing or malformed bearer credential");
        return unauthorized();
    };

    match guard.gate.check(&token, &guard.required).await {
        Ok(Decision::Allowed(client)) => {
            req.extensions_mut().insert(AuthenticatedClient(client));
            next.run(req).await
        }
        Ok(Decision::Unauthenticated) => unauthorized(),
        Ok(Decision::Forbidden { .. }) => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        Err(err) => err.into_response(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized",
    )
        .into_response()
}
