//! Wiring of the authorization components
//!
//! Builds the service, provider and gate from a [`GateConfig`] so that an
//! application can construct everything once at startup and inject the
//! resulting [`Gate`] into its handlers.

use std::sync::Arc;

use tracing::info;

use super::cache::CacheStats;
use super::gate::Gate;
use super::provider::{ClientProvider, ClientResolver};
use super::service::AuthorizationService;
use crate::config::GateConfig;
use crate::error::AppError;

/// Bundle of the authorization components sharing one service
#[derive(Debug, Clone)]
pub struct AuthorizationComponents {
    pub service: Arc<AuthorizationService>,
    pub gate: Gate,
}

impl AuthorizationComponents {
    /// Build components from configuration
    ///
    /// When a resolver is given it becomes the fallback provider, cached
    /// according to `config.cache`. A cached provider also gets its janitor
    /// started, which requires a running Tokio runtime.
    pub fn from_config(
        config: &GateConfig,
        resolver: Option<Arc<dyn ClientResolver>>,
    ) -> Result<Self, AppError> {
        let mut service = AuthorizationService::from_config(config);

        if let Some(resolver) = resolver {
            let mut provider = ClientProvider::from_resolver(resolver);
            if let Some(cache_config) = config.cache.cache_config() {
                provider = provider.with_cache_config(cache_config);
                provider.start_janitor()?;
            }
            service.set_client_provider(provider);
        }

        let components = Self::from_service(service);
        info!(
            registered = components.service.registered_count(),
            provider = components.service.client_provider().is_some(),
            cached = components
                .service
                .client_provider()
                .is_some_and(ClientProvider::is_cached),
            "Authorization components ready"
        );
        Ok(components)
    }

    /// Wrap an already configured service
    pub fn from_service(service: AuthorizationService) -> Self {
        let service = Arc::new(service);
        let gate = Gate::new(Arc::clone(&service));
        Self { service, gate }
    }

    /// Stop background work owned by the components
    pub fn shutdown(&self) {
        if let Some(provider) = self.service.client_provider() {
            provider.stop_janitor();
        }
    }

    /// Get component statistics for monitoring
    pub async fn get_stats(&self) -> AuthorizationStats {
        let provider = self.service.client_provider();
        let cache = match provider {
            Some(provider) => provider.cache_stats().await,
            None => None,
        };

        AuthorizationStats {
            registered_clients: self.service.registered_count(),
            provider_configured: provider.is_some(),
            janitor_running: provider.is_some_and(ClientProvider::is_janitor_running),
            cache,
        }
    }
}

/// Statistics about the authorization system
#[derive(Debug, Clone)]
pub struct AuthorizationStats {
    pub registered_clients: usize,
    pub provider_configured: bool,
    pub janitor_running: bool,
    pub cache: Option<CacheStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Client, FnResolver};
    use crate::config::CacheSettings;

    fn resolver() -> Arc<dyn ClientResolver> {
        Arc::new(FnResolver::new(|token: String| async move {
            Ok((token == "dynamic").then(|| Client::new(token).with_permission("read")))
        }))
    }

    #[tokio::test]
    async fn test_static_only_components() {
        let config = GateConfig {
            tokens: vec!["mytoken".to_string()],
            ..GateConfig::default()
        };

        let components = AuthorizationComponents::from_config(&config, None).unwrap();
        assert!(components.gate.protect("mytoken").await.unwrap().is_allowed());

        let stats = components.get_stats().await;
        assert_eq!(stats.registered_clients, 1);
        assert!(!stats.provider_configured);
        assert!(!stats.janitor_running);
        assert!(stats.cache.is_none());
    }

    #[tokio::test]
    async fn test_cached_provider_starts_janitor() {
        let config = GateConfig::default();
        let components = AuthorizationComponents::from_config(&config, Some(resolver())).unwrap();

        assert!(components.gate.protect("dynamic").await.unwrap().is_allowed());
        assert!(!components.gate.protect("other").await.unwrap().is_allowed());

        let stats = components.get_stats().await;
        assert!(stats.provider_configured);
        assert!(stats.janitor_running);
        assert_eq!(stats.cache.unwrap().entries, 2);

        components.shutdown();
        assert!(!components.get_stats().await.janitor_running);
    }

    #[tokio::test]
    async fn test_disabled_cache_leaves_provider_uncached() {
        let config = GateConfig {
            cache: CacheSettings {
                enabled: false,
                ..CacheSettings::default()
            },
            ..GateConfig::default()
        };

        let components = AuthorizationComponents::from_config(&config, Some(resolver())).unwrap();
        let stats = components.get_stats().await;

        assert!(stats.provider_configured);
        assert!(!stats.janitor_running);
        assert!(stats.cache.is_none());
    }

    #[test]
    fn test_cached_provider_requires_runtime() {
        let result = AuthorizationComponents::from_config(&GateConfig::default(), Some(resolver()));
        assert!(matches!(result, Err(AppError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_clones_share_service() {
        let mut service = AuthorizationService::new();
        service.register_token("mytoken");
        let components = AuthorizationComponents::from_service(service);
        let cloned = components.clone();

        assert!(Arc::ptr_eq(&components.service, &cloned.service));
        assert!(Arc::ptr_eq(components.gate.service(), &components.service));
    }
}
