//! Permission labels and the satisfaction relation
//!
//! Permissions are plain string labels with no required format. A route
//! declares the set it requires, a client holds the set it was granted, and
//! access is granted when every required label is held.
//!
//! ```rust
//! use token_gate::auth::PermissionSet;
//!
//! let granted = PermissionSet::from(["create", "read", "update", "delete"]);
//!
//! assert!(granted.satisfies(&PermissionSet::from(["create", "read"])));
//! assert!(!granted.satisfies(&PermissionSet::from(["read", "backup"])));
//! assert!(granted.satisfies(&PermissionSet::new()));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A set of permission labels
///
/// Ordering carries no meaning; labels are kept sorted only so that
/// logs and serialised output are stable. Duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    labels: BTreeSet<String>,
}

impl PermissionSet {
    /// Create an empty permission set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label, returning `false` if it was already present
    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.labels.insert(label.into())
    }

    /// Check whether a single label is held
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Check whether this set holds every label in `required`
    ///
    /// An empty `required` set is satisfied by any set, including an
    /// empty one.
    pub fn satisfies(&self, required: &PermissionSet) -> bool {
        required.labels.is_subset(&self.labels)
    }

    /// Labels of `required` that this set does not hold, in sorted order
    pub fn missing(&self, required: &PermissionSet) -> Vec<String> {
        required.labels.difference(&self.labels).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", joined.join(", "))
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for PermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.labels.extend(iter.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> From<Vec<S>> for PermissionSet {
    fn from(labels: Vec<S>) -> Self {
        labels.into_iter().collect()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for PermissionSet {
    fn from(labels: [S; N]) -> Self {
        labels.into_iter().collect()
    }
}
