//! # Controller
//!
//! Reconciliation of IstioCSR resources into a running istio-csr agent.
//!
//! - `store` - The object store seam in front of the API server
//! - `resources` - Managed kinds, templates, diffing and create-or-apply
//! - `reconciler` - The per-instance state machine
//! - `events` - Kubernetes Events on the IstioCSR
//! - `retry` - Conflict retry with backoff
//! - `server` - Metrics and probe endpoints

pub mod events;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod server;
pub mod store;
