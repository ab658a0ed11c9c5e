//! # istio-csr Controller
//!
//! A Kubernetes controller that deploys and keeps converged the cert-manager
//! istio-csr agent from a single `IstioCSR` custom resource.
//!
//! ## Overview
//!
//! For the one admitted `IstioCSR` in the cluster the controller:
//!
//! 1. **Validates** the cert-manager issuer reference and key settings
//! 2. **Converges** NetworkPolicies, Service, ServiceAccount, RBAC, the istiod
//!    Certificate, the CA ConfigMap and the agent Deployment, in that order
//! 3. **Reports** progress through Ready/Degraded conditions and Events
//!
//! Any further `IstioCSR` is rejected and left untouched.
//!
//! ## Features
//!
//! - **Drift correction**: only the fields the controller sets are compared,
//!   server defaults never cause rewrites
//! - **Generated-name RBAC**: cluster-scoped RBAC names are cached in status and
//!   recovered by label when the cache is lost
//! - **Classified errors**: irrecoverable configuration errors stop retries,
//!   transient API failures are requeued
//! - **Prometheus metrics**: reconciliation outcomes and resource writes
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod runtime;

pub use crd::{Condition, IstioCSR, IstioCSRSpec, IstioCSRStatus};
pub use error::{ClientError, ErrorReason, ReconcileError, StatusCategory};
