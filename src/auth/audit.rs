use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::permissions::PermissionSet;
use crate::logging::redact_token;
use crate::observability::metrics::LookupSource;

/// One gate decision as written to the audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Redacted token, never the raw credential
    pub token: String,
    pub required: Vec<String>,
    pub outcome: String, // "allowed", "unauthenticated", "forbidden", "error"
    pub missing: Vec<String>,
    pub source: String, // "static", "cache", "resolver", "none"
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn new(
        token: &str,
        required: &PermissionSet,
        outcome: &str,
        source: LookupSource,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            token: redact_token(token),
            required: required.iter().map(str::to_string).collect(),
            outcome: outcome.to_string(),
            missing: Vec::new(),
            source: source.as_str().to_string(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing = missing;
        self
    }
}

pub fn audit_gate_decision(entry: &AuditEntry) {
    info!(
        target: "audit",
        audit_type = "gate",
        timestamp = %entry.timestamp.to_rfc3339(),
        token = %entry.token,
        required = %entry.required.join(","),
        outcome = %entry.outcome,
        missing = %entry.missing.join(","),
        source = %entry.source,
        duration_ms = entry.duration_ms,
        "Gate decision"
    );
}
