//! # Reconciler Configuration
//!
//! Operand image, default resource labels, requeue delay and the
//! optimistic-concurrency retry policy.

use super::var_or_default;
use crate::constants::*;
use crate::controller::retry::RetryPolicy;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Environment variable carrying the operand image
pub const IMAGE_ENV: &str = "RELATED_IMAGE_CERT_MANAGER_ISTIOCSR";

/// Environment variable carrying the operand version label value
pub const VERSION_ENV: &str = "OPERAND_IMAGE_VERSION";

/// Environment variable carrying extra default labels (`k=v,k2=v2`)
pub const DEFAULT_LABELS_ENV: &str = "ISTIO_CSR_DEFAULT_LABELS";

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Operand image; a pass fails Irrecoverably while this is unset
    pub istio_csr_image: Option<String>,
    /// Labels applied to every managed resource before CR-provided labels
    pub default_labels: BTreeMap<String, String>,
    /// Delay before a RetryRequired pass is retried
    pub requeue_delay: Duration,
    /// Namespace holding the CA secrets of ClusterIssuers
    pub cluster_resource_namespace: String,
    /// Retry policy for update calls rejected with a conflict
    pub conflict_retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            istio_csr_image: None,
            default_labels: builtin_labels(None),
            requeue_delay: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            cluster_resource_namespace: DEFAULT_CLUSTER_RESOURCE_NAMESPACE.to_string(),
            conflict_retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let version = lookup(VERSION_ENV).filter(|v| !v.trim().is_empty());
        let mut default_labels = builtin_labels(version.as_deref());
        if let Some(raw) = lookup(DEFAULT_LABELS_ENV) {
            match parse_label_list(&raw) {
                Ok(extra) => default_labels.extend(extra),
                Err(e) => warn!("Ignoring {}: {}", DEFAULT_LABELS_ENV, e),
            }
        }

        let retry_defaults = RetryPolicy::default();
        Self {
            istio_csr_image: lookup(IMAGE_ENV).filter(|v| !v.trim().is_empty()),
            default_labels,
            requeue_delay: Duration::from_secs(var_or_default(
                &lookup,
                "ISTIO_CSR_REQUEUE_SECS",
                DEFAULT_REQUEUE_SECS,
            )),
            cluster_resource_namespace: lookup("CLUSTER_RESOURCE_NAMESPACE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CLUSTER_RESOURCE_NAMESPACE.to_string()),
            conflict_retry: RetryPolicy {
                max_attempts: var_or_default(
                    &lookup,
                    "CONFLICT_RETRY_MAX_ATTEMPTS",
                    retry_defaults.max_attempts,
                ),
                initial_delay: Duration::from_millis(var_or_default(
                    &lookup,
                    "CONFLICT_RETRY_INITIAL_DELAY_MS",
                    DEFAULT_CONFLICT_RETRY_INITIAL_DELAY_MS,
                )),
                max_delay: Duration::from_millis(var_or_default(
                    &lookup,
                    "CONFLICT_RETRY_MAX_DELAY_MS",
                    DEFAULT_CONFLICT_RETRY_MAX_DELAY_MS,
                )),
                ..retry_defaults
            },
        }
    }
}

fn builtin_labels(version: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (APP_LABEL.to_string(), ISTIO_CSR_NAME.to_string()),
        (
            "app.kubernetes.io/name".to_string(),
            ISTIO_CSR_NAME.to_string(),
        ),
        (
            "app.kubernetes.io/instance".to_string(),
            ISTIO_CSR_NAME.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "cert-manager-operator".to_string(),
        ),
        (
            "app.kubernetes.io/part-of".to_string(),
            "cert-manager-operator".to_string(),
        ),
    ]);
    if let Some(version) = version {
        labels.insert("app.kubernetes.io/version".to_string(), version.to_string());
    }
    labels
}

/// Parse `key=value` pairs separated by commas
pub fn parse_label_list(raw: &str) -> Result<BTreeMap<String, String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(format!("malformed label '{pair}', expected key=value")),
        })
        .collect()
}
