//! Request-time authorization decisions
//!
//! The [`Gate`] resolves a bearer token through the
//! [`AuthorizationService`] and checks the resolved client against the
//! permissions a route requires.
//!
//! ```rust
//! use std::sync::Arc;
//! use token_gate::auth::{AuthorizationService, Client, Gate};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), token_gate::AppError> {
//! let mut service = AuthorizationService::new();
//! service.register_client(Client::new("789").with_permissions(["create", "read"]));
//! let gate = Gate::new(Arc::new(service));
//!
//! assert!(gate.protect("789").await?.is_allowed());
//! assert!(!gate.protect_with_permissions("789", ["backup"]).await?.is_allowed());
//! assert!(!gate.protect("unknown").await?.is_allowed());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::audit::{audit_gate_decision, AuditEntry};
use super::client::Client;
use super::permissions::PermissionSet;
use super::service::AuthorizationService;
use crate::error::AppError;
use crate::logging::redact_token;
use crate::observability::metrics::{record_gate_decision, LookupSource};

const OUTCOME_ERROR: &str = "error";

/// Outcome of a gate check
///
/// Denials are values, not errors. An `Err` from [`Gate::check`] means the
/// client could not be looked up at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Token resolved and every required permission is held
    Allowed(Arc<Client>),
    /// Token unknown to both the registry and the provider
    Unauthenticated,
    /// Token resolved but some required permissions are missing
    Forbidden { missing: Vec<String> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The resolved client when the request was allowed
    pub fn client(&self) -> Option<&Arc<Client>> {
        match self {
            Decision::Allowed(client) => Some(client),
            _ => None,
        }
    }

    /// Label used in logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allowed(_) => "allowed",
            Decision::Unauthenticated => "unauthenticated",
            Decision::Forbidden { .. } => "forbidden",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Forbidden { missing } => {
                write!(f, "forbidden (missing: {})", missing.join(", "))
            }
            other => f.write_str(other.outcome()),
        }
    }
}

/// Decides whether a token may proceed
///
/// Cheap to clone; every clone shares the same service.
#[derive(Debug, Clone)]
pub struct Gate {
    service: Arc<AuthorizationService>,
}

impl Gate {
    pub fn new(service: Arc<AuthorizationService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<AuthorizationService> {
        &self.service
    }

    /// Allow any known client
    pub async fn protect(&self, token: &str) -> Result<Decision, AppError> {
        self.check(token, &PermissionSet::new()).await
    }

    /// Allow known clients holding every permission in `required`
    pub async fn protect_with_permissions<I, S>(
        &self,
        token: &str,
        required: I,
    ) -> Result<Decision, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: PermissionSet = required.into_iter().collect();
        self.check(token, &required).await
    }

    /// Resolve `token` and check it against `required`
    ///
    /// An empty `required` set is satisfied by any known client. Every
    /// decision, including lookup failures, is written to the audit log.
    pub async fn check(&self, token: &str, required: &PermissionSet) -> Result<Decision, AppError> {
        let started = Instant::now();

        let (client, source) = match self.service.resolve_with_source(token).await {
            Ok(resolved) => resolved,
            Err(err) => {
                let elapsed = started.elapsed();
                record_gate_decision(OUTCOME_ERROR, elapsed);
                audit_gate_decision(&AuditEntry::new(
                    token,
                    required,
                    OUTCOME_ERROR,
                    LookupSource::Resolver,
                    elapsed,
                ));
                return Err(err);
            }
        };

        let decision = match client {
            None => Decision::Unauthenticated,
            Some(client) => {
                let missing = client.permissions().missing(required);
                if missing.is_empty() {
                    Decision::Allowed(client)
                } else {
                    Decision::Forbidden { missing }
                }
            }
        };

        let elapsed = started.elapsed();
        record_gate_decision(decision.outcome(), elapsed);

        let missing = match &decision {
            Decision::Forbidden { missing } => missing.clone(),
            _ => Vec::new(),
        };
        audit_gate_decision(
            &AuditEntry::new(token, required, decision.outcome(), source, elapsed)
                .with_missing(missing),
        );

        debug!(
            token = %redact_token(token),
            required = %required,
            decision = %decision,
            "Gate check complete"
        );

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ClientProvider;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn gate_with(configure: impl FnOnce(&mut AuthorizationService)) -> Gate {
        let mut service = AuthorizationService::new();
        configure(&mut service);
        Gate::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_plain_token_passes_protect_only() {
        let gate = gate_with(|service| {
            service.register_token("mytoken");
        });

        let decision = gate.protect("mytoken").await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.client().unwrap().token(), "mytoken");

        let decision = gate.protect_with_permissions("mytoken", ["admin"]).await.unwrap();
        assert_eq!(
            decision,
            Decision::Forbidden {
                missing: vec!["admin".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_permission_subset_checks() {
        let gate = gate_with(|service| {
            service.register_client(
                Client::new("789").with_permissions(["create", "read", "update", "delete"]),
            );
        });

        let allowed = gate
            .protect_with_permissions("789", ["create", "read"])
            .await
            .unwrap();
        assert!(allowed.is_allowed());

        let denied = gate
            .protect_with_permissions("789", ["read", "backup"])
            .await
            .unwrap();
        assert_eq!(
            denied,
            Decision::Forbidden {
                missing: vec!["backup".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let gate = gate_with(|service| {
            service.register_token("mytoken");
        });

        assert_eq!(gate.protect("other").await.unwrap(), Decision::Unauthenticated);
        assert_eq!(
            gate.protect_with_permissions("other", ["read"]).await.unwrap(),
            Decision::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_empty_registry_denies_everyone() {
        let gate = gate_with(|_| {});
        assert_eq!(gate.protect("").await.unwrap(), Decision::Unauthenticated);
    }

    #[tokio::test]
    async fn test_provider_clients_are_checked() {
        let gate = gate_with(|service| {
            service.set_client_provider(
                ClientProvider::from_fn(|token: String| async move {
                    Ok((token == "dyn").then(|| Client::new(token).with_permission("read")))
                })
                .with_cache(Some(Duration::from_secs(30)), 100),
            );
        });

        assert!(gate.protect_with_permissions("dyn", ["read"]).await.unwrap().is_allowed());
        assert!(!gate.protect_with_permissions("dyn", ["write"]).await.unwrap().is_allowed());
        assert_eq!(gate.protect("nope").await.unwrap(), Decision::Unauthenticated);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_provider_fault_is_returned_and_audited() {
        let gate = gate_with(|service| {
            service.set_client_provider(ClientProvider::from_fn(|_token: String| async move {
                Err(AppError::resolver(anyhow::anyhow!("backend down")))
            }));
        });

        let err = gate.protect("dyn-token-value").await.unwrap_err();
        assert!(matches!(err, AppError::Resolver(_)));
        assert!(logs_contain("outcome=error"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_decisions_are_audited_without_raw_token() {
        let gate = gate_with(|service| {
            service.register_client(Client::new("audited-secret-token").with_permission("read"));
        });

        gate.protect_with_permissions("audited-secret-token", ["read", "backup"])
            .await
            .unwrap();

        assert!(logs_contain("Gate decision"));
        assert!(logs_contain("outcome=forbidden"));
        assert!(logs_contain("missing=backup"));
        assert!(logs_contain("audi****"));
        assert!(!logs_contain("audited-secret-token"));
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Unauthenticated.to_string(), "unauthenticated");
        assert_eq!(
            Decision::Allowed(Arc::new(Client::new("x"))).to_string(),
            "allowed"
        );
        assert_eq!(
            Decision::Forbidden {
                missing: vec!["admin".to_string(), "backup".to_string()]
            }
            .to_string(),
            "forbidden (missing: admin, backup)"
        );
    }
}
