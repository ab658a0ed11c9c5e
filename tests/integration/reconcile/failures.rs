//! Failure classification and condition reporting

use crate::common::*;
use istio_csr_controller::config::IMAGE_ENV;
use istio_csr_controller::constants::*;
use istio_csr_controller::controller::reconciler::status::find_condition;
use istio_csr_controller::controller::reconciler::Outcome;
use istio_csr_controller::controller::resources::{ObjectKey, ResourceKind};
use istio_csr_controller::crd::cert_manager::{IssuerConfig, IssuerKind};
use istio_csr_controller::crd::{Condition, IstioCSR};
use istio_csr_controller::error::StatusCategory;
use std::time::Duration;

fn conditions(harness: &Harness) -> Vec<Condition> {
    harness
        .store
        .istio_csr(NAMESPACE, "default")
        .and_then(|cr| cr.status)
        .map(|s| s.conditions)
        .unwrap_or_default()
}

fn condition(harness: &Harness, type_: &str) -> Condition {
    find_condition(&conditions(harness), type_)
        .cloned()
        .unwrap_or_else(|| panic!("{type_} condition missing"))
}

/// Harness whose only IstioCSR references an issuer that does not exist
fn harness_without_issuer() -> Harness {
    let harness = Harness::new(config(Some(IMAGE)));
    let mut cr = istio_csr(NAMESPACE, 1_000);
    cr.spec.istio_csr_config.cert_manager.issuer_ref.name = "missing".to_string();
    harness.store.insert_istio_csr(cr);
    harness
}

fn managed_creates(harness: &Harness) -> usize {
    harness
        .store
        .writes()
        .iter()
        .filter(|w| matches!(w.op, WriteOp::Create(_)))
        .count()
}

#[tokio::test]
async fn missing_image_degrades_the_instance() {
    let harness = Harness::new(config(None));
    harness.store.insert_istio_csr(istio_csr(NAMESPACE, 1_000));

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("pass must fail");

    assert!(err.is_irrecoverable());
    let degraded = condition(&harness, CONDITION_DEGRADED);
    assert_eq!(degraded.status, "True");
    assert_eq!(degraded.reason.as_deref(), Some(REASON_FAILED));
    let message = degraded.message.unwrap_or_default();
    assert!(message.starts_with("reconciliation failed with irrecoverable error not retrying"));
    assert!(message.contains(IMAGE_ENV));
    let ready = condition(&harness, CONDITION_READY);
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some(REASON_FAILED));
    assert_eq!(managed_creates(&harness), 0);
}

#[tokio::test]
async fn missing_issuer_is_retried_after_the_requeue_delay() {
    let harness = harness_without_issuer();

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("retryable failures are recorded, not returned");

    assert_eq!(outcome, Outcome::RequeueAfter(Duration::from_secs(30)));
    let ready = condition(&harness, CONDITION_READY);
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some(REASON_IN_PROGRESS));
    assert!(ready
        .message
        .unwrap_or_default()
        .starts_with("reconciliation failed, retrying"));
    assert_eq!(condition(&harness, CONDITION_DEGRADED).status, "False");
    assert_eq!(managed_creates(&harness), 0);
}

#[tokio::test]
async fn repeated_failure_does_not_rewrite_conditions() {
    let harness = harness_without_issuer();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("first pass requeues");
    let first = conditions(&harness);
    harness.store.clear_writes();

    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("second pass requeues");

    assert_eq!(conditions(&harness), first);
    assert!(!harness
        .store
        .writes()
        .iter()
        .any(|w| w.op == WriteOp::UpdateIstioCSRStatus));
}

#[tokio::test]
async fn failed_status_write_turns_a_requeue_into_an_error() {
    let harness = harness_without_issuer();
    harness.store.fail_status_writes(Some(StatusCategory::Timeout));

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("status write failure must surface");

    assert!(err.is_retry_required());
    assert!(err.message().contains("failed to update istiocsr status"));
}

#[tokio::test]
async fn transient_create_failure_keeps_earlier_resources() {
    let harness = Harness::with_instance();
    harness
        .store
        .fail_creates_of(ResourceKind::ServiceAccount, StatusCategory::Timeout);

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("retryable failures are recorded, not returned");

    assert!(matches!(outcome, Outcome::RequeueAfter(_)));
    assert!(harness
        .store
        .object(
            ResourceKind::Service,
            &ObjectKey::namespaced(NAMESPACE, ISTIO_CSR_NAME)
        )
        .is_some());
    assert!(harness.store.objects_of(ResourceKind::Deployment).is_empty());
    let ready = condition(&harness, CONDITION_READY);
    assert_eq!(ready.reason.as_deref(), Some(REASON_IN_PROGRESS));
    assert!(ready.message.unwrap_or_default().contains("ServiceAccount"));

    let cr = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .expect("instance exists");
    assert!(!cr.has_annotation(PROCESSED_ANNOTATION));
}

#[tokio::test]
async fn forbidden_create_is_irrecoverable() {
    let harness = Harness::with_instance();
    harness
        .store
        .fail_creates_of(ResourceKind::Certificate, StatusCategory::Forbidden);

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("pass must fail");

    assert!(err.is_irrecoverable());
    assert_eq!(condition(&harness, CONDITION_DEGRADED).status, "True");
    assert!(harness.store.objects_of(ResourceKind::Deployment).is_empty());
}

#[tokio::test]
async fn acme_issuer_is_rejected_before_anything_is_written() {
    let harness = Harness::new(config(Some(IMAGE)));
    harness.store.insert_issuer(
        IssuerKind::ClusterIssuer,
        ObjectKey::cluster("letsencrypt"),
        IssuerConfig {
            acme: Some(serde_json::json!({"server": "https://acme.example.com"})),
            ..Default::default()
        },
    );
    let mut cr: IstioCSR = istio_csr(NAMESPACE, 1_000);
    cr.spec.istio_csr_config.cert_manager.issuer_ref.name = "letsencrypt".to_string();
    cr.spec.istio_csr_config.cert_manager.issuer_ref.kind = "ClusterIssuer".to_string();
    harness.store.insert_istio_csr(cr);

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("pass must fail");

    assert!(err.is_irrecoverable());
    assert!(err.message().contains("ACME"));
    assert_eq!(managed_creates(&harness), 0);
}

#[tokio::test]
async fn invalid_key_size_is_irrecoverable() {
    let harness = Harness::new(config(Some(IMAGE)));
    let mut cr = istio_csr(NAMESPACE, 1_000);
    cr.spec.istio_csr_config.istiod_tls_config.private_key_algorithm = "ECDSA".to_string();
    cr.spec.istio_csr_config.istiod_tls_config.private_key_size = 2048;
    harness.store.insert_istio_csr(cr);

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("pass must fail");

    assert!(err.is_irrecoverable());
    assert_eq!(managed_creates(&harness), 0);
    assert_eq!(condition(&harness, CONDITION_DEGRADED).status, "True");
}
