//! # Generated Name Resolution
//!
//! ClusterRole and ClusterRoleBinding are created with `generateName`, so
//! their names cannot be derived from the IstioCSR. The resolved name is
//! cached in status and recovered as follows:
//!
//! - a cached name that still exists is used as is
//! - otherwise objects carrying the ownership labels are listed:
//!   none means create, one is adopted, more than one is an error that
//!   needs manual cleanup

use super::{ObjectKey, ResourceKind};
use crate::controller::store::ObjectStore;
use crate::error::ReconcileError;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resolve the name of a generated-name object
///
/// Returns `Ok(None)` when no object exists and one must be created.
pub async fn resolve_generated_name(
    store: &dyn ObjectStore,
    kind: ResourceKind,
    cached: Option<&str>,
    selector: &BTreeMap<String, String>,
) -> Result<Option<String>, ReconcileError> {
    if let Some(name) = cached.filter(|n| !n.is_empty()) {
        let exists = store
            .fetch(kind, &ObjectKey::cluster(name))
            .await
            .map_err(|e| {
                ReconcileError::from_client_error(e, format!("failed to check if {kind} {name} exists"))
            })?
            .is_some();
        if exists {
            debug!(kind = %kind, name, "Using cached generated name");
            return Ok(Some(name.to_string()));
        }
        info!(kind = %kind, name, "Cached generated name no longer exists, resolving again");
    }

    let found = store.list(kind, selector).await.map_err(|e| {
        ReconcileError::from_client_error(e, format!("failed to list {kind} objects"))
    })?;

    match found.as_slice() {
        [] => Ok(None),
        [only] => {
            let name = only.name().unwrap_or_default().to_string();
            info!(kind = %kind, name = %name, "Adopting existing resource");
            Ok(Some(name))
        }
        many => {
            let names: Vec<&str> = many.iter().filter_map(|o| o.name()).collect();
            Err(ReconcileError::irrecoverable(format!(
                "found {} {kind} objects matching {selector:?} ({}); remove the duplicates",
                many.len(),
                names.join(", ")
            )))
        }
    }
}
