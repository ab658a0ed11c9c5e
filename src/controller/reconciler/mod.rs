//! # Reconciler
//!
//! Drives one IstioCSR towards its desired state per pass.
//!
//! ## Sub-modules
//!
//! - `types` - Reconciler context and pass outcome
//! - `reconcile` - The per-instance state machine and the controller entry point
//! - `admission` - Singleton admission across all IstioCSRs
//! - `converge` - Ordered convergence of the managed resources
//! - `validation` - Issuer, key and root CA checks
//! - `status` - Conditions and status writes
//! - `metadata` - Finalizer and annotation writes

pub mod admission;
pub mod converge;
pub mod metadata;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

pub use reconcile::reconcile;
pub use types::{Outcome, Reconciler};
