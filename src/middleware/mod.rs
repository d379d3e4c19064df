//! HTTP integration of the gate

pub mod protect;

pub use protect::*;
