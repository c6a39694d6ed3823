//! Utility types and functions shared across FirmSwap components.
//!
//! - [`sig_down`] - Graceful shutdown signal handling
//! - [`telemetry`] - OpenTelemetry tracing setup

pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
