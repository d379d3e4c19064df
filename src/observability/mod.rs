//! Observability for the authorization layer
//!
//! Structured logging lives in [`crate::logging`]; this module holds the
//! metrics recorded along the decision path.

pub mod metrics;

pub use self::metrics::*;
