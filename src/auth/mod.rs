pub mod audit;
pub mod cache;
pub mod client;
pub mod components;
pub mod gate;
pub mod permissions;
pub mod provider;
pub mod service;

pub use audit::*;
pub use cache::*;
pub use client::Client;
pub use components::*;
pub use gate::{Decision, Gate};
pub use permissions::PermissionSet;
pub use provider::{ClientProvider, ClientResolver, FnResolver};
pub use service::AuthorizationService;
