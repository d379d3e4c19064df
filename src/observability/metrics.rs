//! Metrics for authorization decisions and client lookups
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.
//!
//! # Cardinality
//!
//! Labels are drawn from small fixed sets. Tokens and permission labels are
//! never used as label values.

use std::time::Duration;

use metrics::{counter, histogram};

/// Where a resolved client came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Statically registered client
    Static,
    /// Served from the provider cache, found or not-found
    Cache,
    /// Freshly fetched from the fallback resolver
    Resolver,
    /// Nothing registered and no provider configured
    None,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSource::Static => "static",
            LookupSource::Cache => "cache",
            LookupSource::Resolver => "resolver",
            LookupSource::None => "none",
        }
    }
}

/// Record the outcome of a gate check
pub fn record_gate_decision(outcome: &'static str, duration: Duration) {
    counter!("gate_decision_total", "outcome" => outcome).increment(1);
    histogram!("gate_decision_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record which layer answered a client lookup
pub fn record_client_lookup(source: LookupSource, found: bool) {
    let found = if found { "true" } else { "false" };
    counter!(
        "client_lookup_total",
        "source" => source.as_str(),
        "found" => found
    )
    .increment(1);
}

pub fn record_cache_evictions(count: u64) {
    counter!("ttl_cache_evictions_total").increment(count);
}

pub fn record_cache_expired(count: u64) {
    counter!("ttl_cache_expired_total").increment(count);
}

/// Record a failed call to the fallback resolver
pub fn record_resolver_error() {
    counter!("client_resolver_errors_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_source_labels() {
        assert_eq!(LookupSource::Static.as_str(), "static");
        assert_eq!(LookupSource::Cache.as_str(), "cache");
        assert_eq!(LookupSource::Resolver.as_str(), "resolver");
        assert_eq!(LookupSource::None.as_str(), "none");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // No global recorder installed; the facade must silently discard
        record_gate_decision("allowed", Duration::from_millis(3));
        record_client_lookup(LookupSource::Cache, false);
        record_cache_evictions(2);
        record_cache_expired(5);
        record_resolver_error();
    }
}
