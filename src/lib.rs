//! Bearer-token authorization for request handlers
//!
//! Tokens resolve to clients through a static registry, falling back to an
//! optional caller-supplied resolver fronted by a TTL cache. A [`Gate`]
//! turns a token and a set of required permissions into a [`Decision`], and
//! [`middleware::RouteGuard`] applies that decision to axum routes.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod observability;

pub use auth::{
    AuthorizationComponents, AuthorizationService, CacheConfig, CacheStats, Client,
    ClientProvider, ClientResolver, Decision, Gate, PermissionSet, TtlCache,
};
pub use config::{load_config, GateConfig};
pub use error::AppError;
