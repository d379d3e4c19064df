//! Fallback client lookup with optional caching
//!
//! A [`ClientProvider`] wraps a caller-supplied [`ClientResolver`], typically
//! a database or remote service call, and optionally puts a [`TtlCache`] in
//! front of it.
//!
//! # Caching policy
//!
//! Found *and* not-found outcomes are cached under the token with the same
//! TTL, so repeated requests with an invalid token do not reach the
//! resolver again until the entry expires. Resolver failures are never
//! cached. Concurrent lookups of the same uncached token may each call the
//! resolver.
//!
//! ```rust
//! use token_gate::auth::{Client, ClientProvider};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), token_gate::AppError> {
//! let provider = ClientProvider::from_fn(|token: String| async move {
//!     Ok((token == "db-token").then(|| Client::new(token).with_permission("read")))
//! })
//! .with_cache(Some(Duration::from_secs(60)), 1_000);
//!
//! assert!(provider.get("db-token").await?.is_some());
//! assert!(provider.get("unknown").await?.is_none());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::cache::{CacheConfig, CacheStats, TtlCache};
use super::client::Client;
use crate::error::AppError;
use crate::logging::{redact_token, sanitize_log_message};
use crate::observability::metrics::{record_client_lookup, record_resolver_error, LookupSource};

/// Source of clients for tokens that are not statically registered
///
/// Return `Ok(None)` for an unknown token. An `Err` is surfaced to the
/// caller of the lookup and is not cached.
#[async_trait]
pub trait ClientResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<Client>, AppError>;
}

/// Adapter turning an async closure into a [`ClientResolver`]
pub struct FnResolver<F> {
    f: F,
}

impl<F> FnResolver<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Client>, AppError>> + Send + 'static,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ClientResolver for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Client>, AppError>> + Send + 'static,
{
    async fn resolve(&self, token: &str) -> Result<Option<Client>, AppError> {
        (self.f)(token.to_string()).await
    }
}

type LookupCache = TtlCache<String, Option<Arc<Client>>>;

/// Fallback lookup consulted when a token is not statically registered
pub struct ClientProvider {
    resolver: Arc<dyn ClientResolver>,
    cache: Option<LookupCache>,
}

impl ClientProvider {
    /// Create an uncached provider; every lookup calls the resolver
    pub fn new<R>(resolver: R) -> Self
    where
        R: ClientResolver + 'static,
    {
        Self::from_resolver(Arc::new(resolver))
    }

    pub fn from_resolver(resolver: Arc<dyn ClientResolver>) -> Self {
        Self {
            resolver,
            cache: None,
        }
    }

    /// Create an uncached provider from an async closure
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Client>, AppError>> + Send + 'static,
    {
        Self::new(FnResolver::new(f))
    }

    /// Attach a cache with the given TTL (`None` = never expire) and size
    /// limit (`0` = unbounded)
    pub fn with_cache(self, ttl: Option<Duration>, max_entries: usize) -> Self {
        self.with_cache_config(CacheConfig {
            max_entries,
            default_ttl: ttl,
            ..CacheConfig::default()
        })
    }

    /// Attach a cache built from a full configuration, replacing any
    /// previous one
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        if let Some(previous) = self.cache.take() {
            previous.stop_janitor();
        }
        self.cache = Some(TtlCache::new(config));
        self
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        }
    }

    /// Look up a token through the cache, falling back to the resolver
    pub async fn get(&self, token: &str) -> Result<Option<Arc<Client>>, AppError> {
        let (client, _) = self.lookup(token).await?;
        Ok(client)
    }

    /// Like [`get`](Self::get), also reporting which layer answered
    pub(crate) async fn lookup(
        &self,
        token: &str,
    ) -> Result<(Option<Arc<Client>>, LookupSource), AppError> {
        let Some(cache) = &self.cache else {
            let client = self.call_resolver(token).await?;
            return Ok((client, LookupSource::Resolver));
        };

        if let Some(cached) = cache.get(token).await {
            debug!(
                token = %redact_token(token),
                found = cached.is_some(),
                "Client served from cache"
            );
            record_client_lookup(LookupSource::Cache, cached.is_some());
            return Ok((cached, LookupSource::Cache));
        }

        let client = self.call_resolver(token).await?;
        cache.set(token.to_string(), client.clone()).await;
        Ok((client, LookupSource::Resolver))
    }

    async fn call_resolver(&self, token: &str) -> Result<Option<Arc<Client>>, AppError> {
        match self.resolver.resolve(token).await {
            Ok(client) => {
                debug!(
                    token = %redact_token(token),
                    found = client.is_some(),
                    "Client resolver returned"
                );
                record_client_lookup(LookupSource::Resolver, client.is_some());
                Ok(client.map(Arc::new))
            }
            Err(err) => {
                warn!(
                    token = %redact_token(token),
                    error = %sanitize_log_message(&err.to_string()),
                    "Client resolver failed"
                );
                record_resolver_error();
                Err(err)
            }
        }
    }

    /// Start the cache janitor; a no-op when no cache is attached
    pub fn start_janitor(&self) -> Result<(), AppError> {
        match &self.cache {
            Some(cache) => cache.start_janitor(),
            None => Ok(()),
        }
    }

    /// Stop the cache janitor. Safe to call when never started or uncached.
    pub fn stop_janitor(&self) -> bool {
        match &self.cache {
            Some(cache) => cache.stop_janitor(),
            None => false,
        }
    }

    pub fn is_janitor_running(&self) -> bool {
        self.cache.as_ref().is_some_and(TtlCache::is_janitor_running)
    }
}

impl fmt::Debug for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProvider")
            .field("cache", &self.cache.as_ref().map(TtlCache::config))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Resolver backed by a fixed map that counts its calls
    struct CountingResolver {
        calls: Arc<AtomicUsize>,
        known: HashMap<String, Client>,
    }

    impl CountingResolver {
        fn new(clients: Vec<Client>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let known = clients
                .into_iter()
                .map(|client| (client.token().to_string(), client))
                .collect();
            (
                Self {
                    calls: calls.clone(),
                    known,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl ClientResolver for CountingResolver {
        async fn resolve(&self, token: &str) -> Result<Option<Client>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.known.get(token).cloned())
        }
    }

    #[tokio::test]
    async fn test_uncached_provider_calls_resolver_every_time() {
        let (resolver, calls) = CountingResolver::new(vec![Client::new("known")]);
        let provider = ClientProvider::new(resolver);

        assert!(!provider.is_cached());
        for _ in 0..3 {
            let client = provider.get("known").await.unwrap();
            assert_eq!(client.unwrap().token(), "known");
        }
        assert!(provider.get("unknown").await.unwrap().is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(provider.cache_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_cached_positive_lookup() {
        let (resolver, calls) =
            CountingResolver::new(vec![Client::new("known").with_permission("read")]);
        let provider = ClientProvider::new(resolver).with_cache(Some(Duration::from_secs(60)), 100);

        let first = provider.get("known").await.unwrap().unwrap();
        let second = provider.get("known").await.unwrap().unwrap();

        assert!(second.has_permission("read"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_results_are_cached() {
        let (resolver, calls) = CountingResolver::new(vec![]);
        let provider = ClientProvider::new(resolver).with_cache(Some(Duration::from_secs(60)), 100);

        assert!(provider.get("bogus").await.unwrap().is_none());
        assert!(provider.get("bogus").await.unwrap().is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = provider.cache_stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_call_resolver_again() {
        let (resolver, calls) = CountingResolver::new(vec![Client::new("known")]);
        let provider = ClientProvider::new(resolver).with_cache(Some(Duration::from_secs(10)), 100);

        provider.get("known").await.unwrap();
        provider.get("bogus").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(10)).await;

        provider.get("known").await.unwrap();
        provider.get("bogus").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_from_fn_resolver() {
        let provider = ClientProvider::from_fn(|token: String| async move {
            if token.starts_with("svc-") {
                Ok(Some(Client::new(token).with_permission("service")))
            } else {
                Ok(None)
            }
        });

        let client = provider.get("svc-billing").await.unwrap().unwrap();
        assert!(client.has_permission("service"));
        assert!(provider.get("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resolver_errors_are_propagated_and_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = ClientProvider::from_fn(move |token: String| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::resolver(anyhow::anyhow!(
                    "database timeout for token={}",
                    token
                )))
            }
        })
        .with_cache(Some(Duration::from_secs(60)), 100);

        let err = provider.get("flaky-token-123").await.unwrap_err();
        assert!(matches!(err, AppError::Resolver(_)));
        assert!(provider.get("flaky-token-123").await.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cache_stats().await.unwrap().entries, 0);

        assert!(logs_contain("Client resolver failed"));
        assert!(!logs_contain("flaky-token-123"));
    }

    #[tokio::test]
    async fn test_cache_capacity_applies_to_lookups() {
        let (resolver, calls) = CountingResolver::new(vec![]);
        let provider = ClientProvider::new(resolver).with_cache(None, 2);

        for token in ["a", "b", "c"] {
            provider.get(token).await.unwrap();
        }
        assert_eq!(provider.cache_stats().await.unwrap().entries, 2);

        // "a" was evicted and has to be resolved again
        provider.get("a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_lookup_reports_source() {
        let (resolver, _) = CountingResolver::new(vec![Client::new("known")]);
        let provider = ClientProvider::new(resolver).with_cache(None, 0);

        let (_, source) = provider.lookup("known").await.unwrap();
        assert_eq!(source, LookupSource::Resolver);
        let (_, source) = provider.lookup("known").await.unwrap();
        assert_eq!(source, LookupSource::Cache);
    }

    #[tokio::test]
    async fn test_janitor_controls() {
        let (resolver, _) = CountingResolver::new(vec![]);
        let uncached = ClientProvider::new(resolver);

        // No cache: both are no-ops
        assert!(uncached.start_janitor().is_ok());
        assert!(!uncached.is_janitor_running());
        assert!(!uncached.stop_janitor());

        let (resolver, _) = CountingResolver::new(vec![]);
        let cached = ClientProvider::new(resolver).with_cache(Some(Duration::from_secs(1)), 10);

        assert!(!cached.stop_janitor());
        cached.start_janitor().unwrap();
        cached.start_janitor().unwrap();
        assert!(cached.is_janitor_running());
        assert!(cached.stop_janitor());
        assert!(!cached.is_janitor_running());
    }

    #[tokio::test]
    async fn test_replacing_cache_starts_empty() {
        let (resolver, calls) = CountingResolver::new(vec![Client::new("known")]);
        let provider = ClientProvider::new(resolver).with_cache(None, 10);
        provider.get("known").await.unwrap();

        let provider = provider.with_cache(None, 10);
        provider.get("known").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
