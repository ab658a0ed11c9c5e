//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliation outcomes, requeues, rejected instances
//! - `resource_metrics` - Writes issued against managed resources

pub mod controller_metrics;
pub mod registry;
pub mod resource_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use resource_metrics::*;
