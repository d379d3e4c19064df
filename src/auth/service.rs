use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::client::Client;
use super::provider::ClientProvider;
use crate::config::GateConfig;
use crate::error::AppError;
use crate::logging::redact_token;
use crate::observability::metrics::{record_client_lookup, LookupSource};

/// Registry of known clients with an optional fallback provider
///
/// Built once through the `&mut self` registration methods, then shared as
/// `Arc<AuthorizationService>`. Once shared it can no longer be mutated, so
/// concurrent resolution needs no locking on the static map.
///
/// Registering a token that already exists replaces the previous client;
/// permissions are never merged.
#[derive(Default)]
pub struct AuthorizationService {
    clients: HashMap<String, Arc<Client>>,
    provider: Option<ClientProvider>,
}

impl AuthorizationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a service holding the tokens and clients listed in configuration
    ///
    /// Plain tokens are registered first, so a client entry with the same
    /// token wins.
    pub fn from_config(config: &GateConfig) -> Self {
        let mut service = Self::new();
        service
            .register_tokens(config.tokens.iter().cloned())
            .register_clients(config.clients.iter().cloned());

        debug!(
            registered = service.registered_count(),
            "Authorization service built from configuration"
        );
        service
    }

    /// Register a token with no permissions
    pub fn register_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.register_client(Client::new(token))
    }

    pub fn register_tokens<I, S>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            self.register_token(token);
        }
        self
    }

    pub fn register_client(&mut self, client: Client) -> &mut Self {
        let token = client.token().to_string();
        if self.clients.insert(token, Arc::new(client)).is_some() {
            debug!("Replaced previously registered client");
        }
        self
    }

    pub fn register_clients<I>(&mut self, clients: I) -> &mut Self
    where
        I: IntoIterator<Item = Client>,
    {
        for client in clients {
            self.register_client(client);
        }
        self
    }

    /// Set the fallback provider, replacing any previous one
    ///
    /// A replaced provider is dropped together with its cache, which also
    /// ends its janitor.
    pub fn set_client_provider(&mut self, provider: ClientProvider) -> &mut Self {
        if let Some(previous) = self.provider.replace(provider) {
            previous.stop_janitor();
            debug!("Replaced client provider");
        }
        self
    }

    pub fn client_provider(&self) -> Option<&ClientProvider> {
        self.provider.as_ref()
    }

    /// Number of statically registered clients
    pub fn registered_count(&self) -> usize {
        self.clients.len()
    }

    /// Find the client for a token
    ///
    /// The static registry is checked first and the provider is only
    /// consulted on a miss. An unknown token is `Ok(None)`; an `Err` only
    /// comes from a failing provider.
    pub async fn resolve(&self, token: &str) -> Result<Option<Arc<Client>>, AppError> {
        let (client, _) = self.resolve_with_source(token).await?;
        Ok(client)
    }

    pub(crate) async fn resolve_with_source(
        &self,
        token: &str,
    ) -> Result<(Option<Arc<Client>>, LookupSource), AppError> {
        if let Some(client) = self.clients.get(token) {
            debug!(token = %redact_token(token), source = "static", "Client resolved");
            record_client_lookup(LookupSource::Static, true);
            return Ok((Some(Arc::clone(client)), LookupSource::Static));
        }

        let Some(provider) = &self.provider else {
            debug!(token = %redact_token(token), source = "none", "Token not registered");
            record_client_lookup(LookupSource::None, false);
            return Ok((None, LookupSource::None));
        };

        let (client, source) = provider.lookup(token).await?;
        debug!(
            token = %redact_token(token),
            source = source.as_str(),
            found = client.is_some(),
            "Client resolved through provider"
        );
        Ok((client, source))
    }
}

impl fmt::Debug for AuthorizationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationService")
            .field("registered", &self.clients.len())
            .field("provider", &self.provider)
            .finish()
    }
}
