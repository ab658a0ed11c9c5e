//! Singleton admission across several IstioCSRs

use crate::common::*;
use istio_csr_controller::constants::*;
use istio_csr_controller::controller::events::reasons;
use istio_csr_controller::controller::reconciler::status::find_condition;
use istio_csr_controller::controller::reconciler::Outcome;
use istio_csr_controller::controller::resources::ResourceKind;
use istio_csr_controller::error::{ReconcileError, StatusCategory};

fn assert_rejected(harness: &Harness, namespace: &str, result: Result<Outcome, ReconcileError>) {
    let err = result.expect_err("instance must be rejected");
    assert!(err.is_multiple_instance(), "unexpected reason: {err}");

    let cr = harness
        .store
        .istio_csr(namespace, "default")
        .expect("instance exists");
    assert!(cr.has_annotation(REJECT_MULTIPLE_INSTANCE_ANNOTATION));
    assert!(!cr.has_annotation(PROCESSED_ANNOTATION));
    let status = cr.status.expect("status written");
    let ready = find_condition(&status.conditions, CONDITION_READY).expect("ready condition");
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some(REASON_MULTIPLE_INSTANCE));
}

#[tokio::test]
async fn only_the_oldest_instance_is_reconciled() {
    let harness = Harness::new(config(Some(IMAGE)));
    harness.store.insert_istio_csr(istio_csr("first", 100));
    harness.store.insert_istio_csr(istio_csr("second", 200));
    harness.store.insert_istio_csr(istio_csr("third", 300));

    for namespace in ["second", "third"] {
        let result = harness
            .reconciler
            .reconcile_istio_csr(&Harness::key(namespace))
            .await;
        assert_rejected(&harness, namespace, result);
    }
    assert!(harness.store.objects_of(ResourceKind::Deployment).is_empty());
    let warnings = harness
        .events
        .events()
        .into_iter()
        .filter(|e| e.warning && e.reason == reasons::MULTIPLE_INSTANCES)
        .count();
    assert_eq!(warnings, 2);

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key("first"))
        .await
        .expect("oldest instance is admitted");
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(harness.store.objects_of(ResourceKind::Deployment).len(), 1);
}

#[tokio::test]
async fn instances_created_at_the_same_instant_are_all_rejected() {
    let harness = Harness::new(config(Some(IMAGE)));
    harness.store.insert_istio_csr(istio_csr("left", 100));
    harness.store.insert_istio_csr(istio_csr("right", 100));

    for namespace in ["left", "right"] {
        let result = harness
            .reconciler
            .reconcile_istio_csr(&Harness::key(namespace))
            .await;
        assert_rejected(&harness, namespace, result);
    }
    assert!(harness.store.objects_of(ResourceKind::Deployment).is_empty());
}

#[tokio::test]
async fn rejected_instance_stays_rejected_without_further_writes() {
    let harness = Harness::new(config(Some(IMAGE)));
    harness.store.insert_istio_csr(istio_csr("first", 100));
    harness.store.insert_istio_csr(istio_csr("second", 200));
    let key = Harness::key("second");
    let _ = harness.reconciler.reconcile_istio_csr(&key).await;
    harness.store.clear_writes();

    let result = harness.reconciler.reconcile_istio_csr(&key).await;

    assert_rejected(&harness, "second", result);
    assert!(
        harness.store.writes().is_empty(),
        "unexpected writes: {:?}",
        harness.store.writes()
    );
}

#[tokio::test]
async fn unpersisted_rejection_is_retried() {
    let harness = Harness::new(config(Some(IMAGE)));
    harness.store.insert_istio_csr(istio_csr("first", 100));
    harness.store.insert_istio_csr(istio_csr("second", 200));
    harness.store.fail_status_writes(Some(StatusCategory::Timeout));
    let key = Harness::key("second");

    let err = harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect_err("instance must be rejected");
    assert!(err.is_retry_required(), "unexpected reason: {err}");

    harness.store.fail_status_writes(None);
    let result = harness.reconciler.reconcile_istio_csr(&key).await;
    assert_rejected(&harness, "second", result);
}
