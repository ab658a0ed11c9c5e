//! # Watch Loop
//!
//! Runs `kube::runtime::Controller` over IstioCSRs in all namespaces.
//!
//! The managed kinds are watched as well, filtered on the `app` label, and
//! mapped back to their IstioCSR through the watched-by label, so drift or
//! deletion of any managed object triggers a new pass.

use super::error_policy::handle_reconciliation_error;
use crate::constants::*;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::cert_manager::Certificate;
use crate::crd::IstioCSR;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{Api, ListParams};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// IstioCSR owning a managed object, read from its watched-by label
pub fn owner_of<K: Resource>(object: K) -> Option<ObjectRef<IstioCSR>> {
    let value = object.meta().labels.as_ref()?.get(WATCH_LABEL)?;
    let (namespace, name) = value.split_once('_')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some(ObjectRef::new(name).within(namespace))
}

/// Run the controller until a shutdown signal is received
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let istio_csrs: Api<IstioCSR> = Api::all(client.clone());
    match istio_csrs.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("IstioCSR CRD is queryable"),
        Err(e) => {
            error!("IstioCSR CRD is not queryable; {:?}. Is the CRD installed?", e);
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }

    let managed = watcher::Config::default().labels(&format!("{APP_LABEL}={ISTIO_CSR_NAME}"));

    Controller::new(istio_csrs, watcher::Config::default())
        .watches(
            Api::<NetworkPolicy>::all(client.clone()),
            managed.clone(),
            owner_of::<NetworkPolicy>,
        )
        .watches(
            Api::<Service>::all(client.clone()),
            managed.clone(),
            owner_of::<Service>,
        )
        .watches(
            Api::<ServiceAccount>::all(client.clone()),
            managed.clone(),
            owner_of::<ServiceAccount>,
        )
        .watches(
            Api::<ClusterRole>::all(client.clone()),
            managed.clone(),
            owner_of::<ClusterRole>,
        )
        .watches(
            Api::<ClusterRoleBinding>::all(client.clone()),
            managed.clone(),
            owner_of::<ClusterRoleBinding>,
        )
        .watches(
            Api::<Role>::all(client.clone()),
            managed.clone(),
            owner_of::<Role>,
        )
        .watches(
            Api::<RoleBinding>::all(client.clone()),
            managed.clone(),
            owner_of::<RoleBinding>,
        )
        .watches(
            Api::<Certificate>::all(client.clone()),
            managed.clone(),
            owner_of::<Certificate>,
        )
        .watches(
            Api::<ConfigMap>::all(client.clone()),
            managed.clone(),
            owner_of::<ConfigMap>,
        )
        .watches(
            Api::<Deployment>::all(client),
            managed,
            owner_of::<Deployment>,
        )
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(resource = %object, "Reconciled"),
                Err(e) => warn!("Controller stream error: {}", e),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller shut down");
    Ok(())
}
