//! Domain layer - Core types and port definitions
//!
//! This module defines the types the reconciliation core works with and the
//! traits (ports) that store and watch adapters implement.

pub mod ports;

pub use ports::*;
