//! # IstioCSR Metadata
//!
//! Finalizer and annotation writes on the IstioCSR itself. Each write is
//! applied to a freshly fetched copy and retried on conflict.

use crate::constants::*;
use crate::controller::resources::ObjectKey;
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::controller::store::ObjectStore;
use crate::crd::IstioCSR;
use crate::error::{ClientError, ReconcileError, StatusCategory};
use std::collections::BTreeMap;

/// Apply `mutate` to the latest IstioCSR and write it back if it changed
///
/// `mutate` returns false when there is nothing to write.
pub async fn update_metadata<F>(
    store: &dyn ObjectStore,
    retry: &RetryPolicy,
    istio_csr: &IstioCSR,
    operation: &str,
    mutate: F,
) -> Result<IstioCSR, ReconcileError>
where
    F: Fn(&mut IstioCSR) -> bool,
{
    let key = istio_csr_key(istio_csr);
    let mutate = &mutate;
    retry_on_conflict(retry, operation, || {
        let key = key.clone();
        async move {
            let mut latest = store.get_istio_csr(&key).await?.ok_or_else(|| {
                ClientError::new(StatusCategory::NotFound, format!("istiocsr {key} not found"))
            })?;
            if !mutate(&mut latest) {
                return Ok(latest);
            }
            store.update_istio_csr(&latest).await
        }
    })
    .await
    .map_err(|e| ReconcileError::from_client_error(e, format!("failed to {operation}")))
}

pub fn istio_csr_key(istio_csr: &IstioCSR) -> ObjectKey {
    ObjectKey {
        namespace: istio_csr.metadata.namespace.clone(),
        name: istio_csr.metadata.name.clone().unwrap_or_default(),
    }
}

pub fn add_finalizer(istio_csr: &mut IstioCSR) -> bool {
    if istio_csr.has_finalizer(FINALIZER) {
        return false;
    }
    istio_csr
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    true
}

pub fn remove_finalizer(istio_csr: &mut IstioCSR) -> bool {
    let Some(finalizers) = istio_csr.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    finalizers.len() != before
}

/// Idempotently add an annotation with value "true"
pub fn add_annotation(istio_csr: &mut IstioCSR, key: &str) -> bool {
    if istio_csr.has_annotation(key) {
        return false;
    }
    istio_csr
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), "true".to_string());
    true
}
