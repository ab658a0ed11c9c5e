//! Controller entry point, deletion and vanished instances

use crate::common::*;
use istio_csr_controller::constants::*;
use istio_csr_controller::controller::events::reasons;
use istio_csr_controller::controller::reconciler::{reconcile, Outcome};
use istio_csr_controller::controller::resources::ResourceKind;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn deleted_instance_releases_its_finalizer() {
    let harness = Harness::new(config(Some(IMAGE)));
    let mut cr = istio_csr(NAMESPACE, 1_000);
    cr.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    cr.metadata.deletion_timestamp = Some(created_at(2_000));
    harness.store.insert_istio_csr(cr);

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("finalization succeeds");

    assert_eq!(outcome, Outcome::Done);
    assert!(harness.store.istio_csr(NAMESPACE, "default").is_none());
    let ops: Vec<WriteOp> = harness.store.writes().into_iter().map(|w| w.op).collect();
    assert_eq!(ops, vec![WriteOp::UpdateIstioCSR]);
    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].warning);
    assert_eq!(events[0].reason, reasons::REMOVE_DEPLOYMENT);
}

#[tokio::test]
async fn deletion_leaves_managed_resources_in_place() {
    let harness = Harness::with_instance();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("install succeeds");

    let mut cr = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .expect("instance exists");
    cr.metadata.deletion_timestamp = Some(created_at(2_000));
    harness.store.insert_istio_csr(cr);

    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("finalization succeeds");

    assert!(harness.store.istio_csr(NAMESPACE, "default").is_none());
    assert_eq!(harness.store.objects_of(ResourceKind::Deployment).len(), 1);
    assert_eq!(harness.store.objects_of(ResourceKind::ClusterRole).len(), 1);
}

#[tokio::test]
async fn vanished_instance_ends_the_pass_quietly() {
    let harness = Harness::new(config(Some(IMAGE)));

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("nothing to do");

    assert_eq!(outcome, Outcome::Done);
    assert!(harness.store.writes().is_empty());
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn controller_entry_point_maps_outcomes_to_actions() {
    let harness = Harness::with_instance();
    let cr = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .expect("instance exists");

    let action = reconcile(Arc::new(cr), harness.reconciler.clone())
        .await
        .expect("pass succeeds");
    assert_eq!(action, Action::await_change());

    let retrying = Harness::new(config(Some(IMAGE)));
    let mut cr = istio_csr(NAMESPACE, 1_000);
    cr.spec.istio_csr_config.cert_manager.issuer_ref.name = "missing".to_string();
    retrying.store.insert_istio_csr(cr.clone());

    let action = reconcile(Arc::new(cr), retrying.reconciler.clone())
        .await
        .expect("retryable failures requeue");
    assert_eq!(action, Action::requeue(Duration::from_secs(30)));
}
