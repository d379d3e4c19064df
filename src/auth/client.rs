use std::fmt;

use serde::{Deserialize, Serialize};

use super::permissions::PermissionSet;
use crate::logging::redact_token;

/// A caller identified by its bearer token, with the permissions it holds
///
/// Clients are immutable once handed to a registry or cache; the `with_*`
/// helpers consume and return the value so they read as a builder.
///
/// ```rust
/// use token_gate::auth::Client;
///
/// let client = Client::new("789").with_permissions(["create", "read"]);
/// assert!(client.has_permission("read"));
/// assert!(!client.has_permission("delete"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    token: String,
    #[serde(default)]
    permissions: PermissionSet,
}

impl Client {
    /// Create a client with no permissions
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            permissions: PermissionSet::new(),
        }
    }

    pub fn with_permission(mut self, label: impl Into<String>) -> Self {
        self.permissions.insert(label);
        self
    }

    pub fn with_permissions<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(labels);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn has_permission(&self, label: &str) -> bool {
        self.permissions.contains(label)
    }
}

// Tokens are credentials, keep them out of debug output
impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &redact_token(&self.token))
            .field("permissions", &self.permissions)
            .finish()
    }
}
