//! Reconciliation scenarios
//!
//! - Fresh install and steady state
//! - Drift correction
//! - Singleton admission
//! - Failure handling and conditions
//! - Deletion

pub mod admission;
pub mod convergence;
pub mod failures;
pub mod lifecycle;
