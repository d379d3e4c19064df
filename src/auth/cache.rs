//! Bounded key/value cache with per-entry expiration
//!
//! The cache backs the fallback client lookup: it remembers both found and
//! not-found outcomes so that a slow or abusable resolver is not called on
//! every request.
//!
//! - Entries expire after their TTL; an expired entry is never returned even
//!   if it has not been physically removed yet
//! - When `max_entries` is exceeded the least recently used entries are
//!   evicted until the cache is back at its limit
//! - An optional janitor task periodically removes expired entries so that a
//!   quiet cache does not hold on to dead entries between accesses
//! - Reads share the lock; inserts, evictions and sweeps are exclusive
//!
//! # Recency index
//!
//! Every entry has exactly one slot in an ordered index keyed by logical
//! tick. A hit only raises the entry's atomic `last_used` under the shared
//! lock; its index slot is moved lazily when eviction reaches it. Evicting
//! at capacity is therefore `O(log n)` amortized instead of a scan.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::AppError;
use crate::observability::metrics::{record_cache_evictions, record_cache_expired};

/// `max_entries` value that disables capacity eviction
pub const UNBOUNDED: usize = 0;

/// Configuration for a [`TtlCache`]
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction, [`UNBOUNDED`] for no limit
    pub max_entries: usize,
    /// TTL applied by [`TtlCache::set`], `None` means entries never expire
    pub default_ttl: Option<Duration>,
    /// Interval between janitor sweeps
    pub janitor_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Some(Duration::from_secs(300)), // 5 minutes
            janitor_interval: Duration::from_secs(60),
        }
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,
    /// Total number of cache misses, including reads of expired entries
    pub misses: u64,
    /// Current number of stored entries, expired-but-unswept included
    pub entries: u64,
    /// Hit rate as percentage (0.0 - 100.0)
    pub hit_rate: f64,
    /// Number of entries evicted due to capacity
    pub evictions: u64,
    /// Number of expired entries physically removed
    pub expired: u64,
}

impl CacheStats {
    /// Calculate hit rate from hits and misses
    pub fn calculate_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Option<Duration>,
    /// Logical clock value of the last insert or hit
    last_used: AtomicU64,
    /// Slot in the recency index, never above `last_used`
    indexed_at: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>, tick: u64) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
            last_used: AtomicU64::new(tick),
            indexed_at: tick,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.inserted_at) >= ttl,
            None => false,
        }
    }
}

/// Entries plus their recency index, guarded by one lock
struct Store<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    recency: BTreeMap<u64, K>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn insert(&mut self, key: K, entry: CacheEntry<V>) {
        self.recency.insert(entry.indexed_at, key.clone());
        if let Some(previous) = self.map.insert(key, entry) {
            self.recency.remove(&previous.indexed_at);
        }
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.map.remove(key)?;
        self.recency.remove(&entry.indexed_at);
        Some(entry)
    }

    /// Remove the entry with the smallest `last_used`
    ///
    /// Slots left behind by hits are moved up to the entry's current tick
    /// and the scan continues. Ticks are unique, so the first slot whose
    /// entry was not touched since indexing belongs to the LRU entry.
    fn pop_lru(&mut self) -> Option<K> {
        while let Some((tick, key)) = self.recency.pop_first() {
            let Some(entry) = self.map.get_mut(&key) else {
                continue;
            };

            let last_used = entry.last_used.load(Ordering::Relaxed);
            if last_used > tick {
                entry.indexed_at = last_used;
                self.recency.insert(last_used, key);
                continue;
            }

            self.map.remove(&key);
            return Some(key);
        }
        None
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        let recency = &mut self.recency;
        self.map.retain(|_, entry| {
            let expired = entry.is_expired_at(now);
            if expired {
                recency.remove(&entry.indexed_at);
            }
            !expired
        });
        before - self.map.len()
    }
}

struct CacheInner<K, V> {
    config: CacheConfig,
    entries: RwLock<Store<K, V>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Next value of the recency clock, strictly increasing
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn janitor_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.janitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evict least recently used entries until the cache is within its limit
    fn evict_over_capacity(&self, store: &mut Store<K, V>) -> usize {
        let max = self.config.max_entries;
        if max == UNBOUNDED {
            return 0;
        }

        let mut evicted = 0;
        while store.len() > max && store.pop_lru().is_some() {
            evicted += 1;
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            record_cache_evictions(evicted as u64);
        }
        evicted
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed = self.entries.write().await.remove_expired(now);

        if removed > 0 {
            self.expired.fetch_add(removed as u64, Ordering::Relaxed);
            record_cache_expired(removed as u64);
        }
        removed
    }
}

impl<K, V> Drop for CacheInner<K, V> {
    fn drop(&mut self) {
        let slot = self.janitor.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// Bounded key/value store with per-entry TTL and LRU eviction
///
/// Cloning is cheap and every clone shares the same entries and janitor.
pub struct TtlCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. The janitor is not started.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: RwLock::new(Store::new()),
                clock: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                expired: AtomicU64::new(0),
                janitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get a live value; absent and expired entries are both a miss
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.inner.entries.read().await;
        let now = Instant::now();

        match entries.map.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                // Concurrent hits may finish out of order, never move recency back
                entry.last_used.fetch_max(self.inner.tick(), Ordering::Relaxed);
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite using the configured default TTL
    pub async fn set(&self, key: K, value: V) {
        let ttl = self.inner.config.default_ttl;
        self.set_with_ttl(key, value, ttl).await;
    }

    /// Insert or overwrite with an explicit TTL, `None` for no expiration
    ///
    /// Overwriting restarts the entry's TTL. If the insert pushes the cache
    /// over `max_entries`, exactly enough least recently used entries are
    /// evicted to get back to the limit.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut entries = self.inner.entries.write().await;
        let entry = CacheEntry::new(value, ttl, self.inner.tick());
        entries.insert(key, entry);

        let evicted = self.inner.evict_over_capacity(&mut entries);
        if evicted > 0 {
            debug!(
                evicted,
                max_entries = self.inner.config.max_entries,
                "Cache over capacity, evicted LRU entries"
            );
        }
    }

    /// Physically remove an entry, returning whether one was stored
    pub async fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.entries.write().await.remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run one janitor sweep now, returning the number of entries removed
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);

        CacheStats {
            hits,
            misses,
            entries: self.len().await as u64,
            hit_rate: CacheStats::calculate_hit_rate(hits, misses),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
        }
    }

    /// Start the background sweep at the configured interval
    ///
    /// Calling this while a sweep is running replaces it, so at most one
    /// janitor task exists per cache. The task only holds a weak reference
    /// to the cache and ends once the last handle is dropped.
    pub fn start_janitor(&self) -> Result<(), AppError> {
        let interval = self.inner.config.janitor_interval;
        if interval.is_zero() {
            return Err(AppError::Config(
                "janitor interval must be greater than zero".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Runtime(format!("janitor requires a Tokio runtime: {}", e)))?;

        let handle = runtime.spawn(janitor_loop(Arc::downgrade(&self.inner), interval));

        if let Some(previous) = self.inner.janitor_slot().replace(handle) {
            previous.abort();
            debug!("Replaced running cache janitor");
        }

        debug!(interval_ms = interval.as_millis() as u64, "Cache janitor started");
        Ok(())
    }

    /// Stop the background sweep. Safe to call repeatedly or when never started.
    ///
    /// Returns whether a janitor was running. Reads keep applying lazy
    /// expiration afterwards.
    pub fn stop_janitor(&self) -> bool {
        match self.inner.janitor_slot().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                debug!("Cache janitor stopped");
                was_running
            }
            None => false,
        }
    }

    pub fn is_janitor_running(&self) -> bool {
        self.inner
            .janitor_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Background task that periodically removes expired entries
async fn janitor_loop<K, V>(cache: Weak<CacheInner<K, V>>, period: Duration)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        let Some(inner) = cache.upgrade() else {
            break;
        };
        let removed = inner.purge_expired().await;
        drop(inner);

        if removed > 0 {
            debug!(removed, "Janitor removed expired cache entries");
        }
    }
}
