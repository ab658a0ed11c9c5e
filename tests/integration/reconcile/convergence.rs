//! Fresh install, steady state and drift correction

use crate::common::*;
use istio_csr_controller::constants::*;
use istio_csr_controller::controller::events::reasons;
use istio_csr_controller::controller::reconciler::status::find_condition;
use istio_csr_controller::controller::reconciler::Outcome;
use istio_csr_controller::controller::resources::{ManagedObject, ObjectKey, ResourceKind};
use istio_csr_controller::controller::store::ObjectStore;
use k8s_openapi::api::rbac::v1::ClusterRole;
use std::collections::BTreeMap;

fn creates(store: &InMemoryStore) -> Vec<ResourceKind> {
    store
        .writes()
        .into_iter()
        .filter_map(|w| match w.op {
            WriteOp::Create(kind) => Some(kind),
            _ => None,
        })
        .collect()
}

fn deployment_key() -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, ISTIO_CSR_NAME)
}

fn container_args(object: &ManagedObject) -> Vec<String> {
    let ManagedObject::Deployment(deployment) = object else {
        panic!("expected a deployment, got {:?}", object.kind());
    };
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
        .and_then(|c| c.args.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn fresh_instance_creates_every_resource_in_order() {
    let harness = Harness::with_instance();

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("pass succeeds");
    assert_eq!(outcome, Outcome::Done);

    assert_eq!(
        creates(&harness.store),
        vec![
            ResourceKind::NetworkPolicy,
            ResourceKind::NetworkPolicy,
            ResourceKind::NetworkPolicy,
            ResourceKind::Service,
            ResourceKind::ServiceAccount,
            ResourceKind::ClusterRole,
            ResourceKind::ClusterRoleBinding,
            ResourceKind::Role,
            ResourceKind::RoleBinding,
            ResourceKind::Role,
            ResourceKind::RoleBinding,
            ResourceKind::Certificate,
            ResourceKind::ConfigMap,
            ResourceKind::Deployment,
        ]
    );

    let cr = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .expect("instance still exists");
    assert!(cr.has_finalizer(FINALIZER));
    assert!(cr.has_annotation(PROCESSED_ANNOTATION));

    let status = cr.status.expect("status written");
    let ready = find_condition(&status.conditions, CONDITION_READY).expect("ready condition");
    assert_eq!(ready.status, "True");
    assert_eq!(ready.reason.as_deref(), Some(REASON_READY));
    assert_eq!(ready.message.as_deref(), Some("reconciliation successful"));
    let degraded =
        find_condition(&status.conditions, CONDITION_DEGRADED).expect("degraded condition");
    assert_eq!(degraded.status, "False");

    assert_eq!(
        status.istio_csr_grpc_endpoint.as_deref(),
        Some("cert-manager-istio-csr.istio-csr.svc:443")
    );
    assert_eq!(status.istio_csr_image.as_deref(), Some(IMAGE));
    assert_eq!(status.service_account.as_deref(), Some(ISTIO_CSR_NAME));

    let role_name = status.cluster_role.expect("cluster role name cached");
    assert!(role_name.starts_with(ISTIO_CSR_GENERATE_NAME));
    let binding_name = status
        .cluster_role_binding
        .expect("cluster role binding name cached");
    let binding = harness
        .store
        .object(ResourceKind::ClusterRoleBinding, &ObjectKey::cluster(&binding_name))
        .expect("binding stored");
    let ManagedObject::ClusterRoleBinding(binding) = binding else {
        panic!("expected a cluster role binding");
    };
    assert_eq!(binding.role_ref.name, role_name);

    let ca = harness
        .store
        .object(
            ResourceKind::ConfigMap,
            &ObjectKey::namespaced(NAMESPACE, CA_CONFIG_MAP_NAME),
        )
        .expect("CA ConfigMap stored");
    let ManagedObject::ConfigMap(ca) = ca else {
        panic!("expected a config map");
    };
    assert_eq!(
        ca.data.and_then(|d| d.get(CA_CONFIG_MAP_KEY).cloned()).as_deref(),
        Some(CA_PEM)
    );

    let emitted = harness.events.reasons();
    assert!(emitted.iter().any(|r| r == reasons::RESOURCE_CREATED));
    assert!(!emitted.iter().any(|r| r == reasons::RESOURCE_ALREADY_EXISTS));
}

#[tokio::test]
async fn converged_instance_is_left_untouched() {
    let harness = Harness::with_instance();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("first pass succeeds");
    let before = harness.store.istio_csr(NAMESPACE, "default");
    harness.store.clear_writes();

    let outcome = harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("second pass succeeds");

    assert_eq!(outcome, Outcome::Done);
    assert!(
        harness.store.writes().is_empty(),
        "unexpected writes: {:?}",
        harness.store.writes()
    );
    let after = harness.store.istio_csr(NAMESPACE, "default");
    assert_eq!(
        after.and_then(|cr| cr.metadata.resource_version),
        before.and_then(|cr| cr.metadata.resource_version)
    );
}

#[tokio::test]
async fn drifted_deployment_is_updated_alone() {
    let harness = Harness::with_instance();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("first pass succeeds");
    let desired_args = container_args(
        &harness
            .store
            .object(ResourceKind::Deployment, &deployment_key())
            .expect("deployment stored"),
    );

    harness
        .store
        .tamper(ResourceKind::Deployment, &deployment_key(), |object| {
            if let ManagedObject::Deployment(deployment) = object {
                if let Some(container) = deployment
                    .spec
                    .as_mut()
                    .and_then(|s| s.template.spec.as_mut())
                    .and_then(|s| s.containers.first_mut())
                {
                    container.args = Some(vec!["--log-level=5".to_string()]);
                }
            }
        });
    harness.store.clear_writes();

    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("drift pass succeeds");

    let ops: Vec<WriteOp> = harness.store.writes().into_iter().map(|w| w.op).collect();
    assert_eq!(ops, vec![WriteOp::Update(ResourceKind::Deployment)]);
    let restored = harness
        .store
        .object(ResourceKind::Deployment, &deployment_key())
        .expect("deployment stored");
    assert_eq!(container_args(&restored), desired_args);
    assert!(harness
        .events
        .reasons()
        .iter()
        .any(|r| r == reasons::RESOURCE_RECONCILED));
}

#[tokio::test]
async fn server_defaulted_fields_do_not_count_as_drift() {
    let harness = Harness::with_instance();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("first pass succeeds");

    harness
        .store
        .tamper(ResourceKind::Deployment, &deployment_key(), |object| {
            if let ManagedObject::Deployment(deployment) = object {
                if let Some(spec) = deployment.spec.as_mut() {
                    spec.progress_deadline_seconds = Some(600);
                    spec.revision_history_limit = Some(10);
                    if let Some(container) = spec
                        .template
                        .spec
                        .as_mut()
                        .and_then(|s| s.containers.first_mut())
                    {
                        container.termination_message_path =
                            Some("/dev/termination-log".to_string());
                    }
                }
                deployment.metadata.uid = Some("server-assigned".to_string());
            }
        });
    harness.store.clear_writes();

    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("pass succeeds");
    assert!(harness.store.writes().is_empty());
}

#[tokio::test]
async fn lost_generated_names_are_recovered_by_label() {
    let harness = Harness::with_instance();
    let key = Harness::key(NAMESPACE);
    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("first pass succeeds");

    let mut cr = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .expect("instance exists");
    let mut status = cr.status.clone().expect("status written");
    let role_name = status.cluster_role.take().expect("cluster role cached");
    status.cluster_role_binding = None;
    cr.status = Some(status);
    harness
        .store
        .update_istio_csr_status(&cr)
        .await
        .expect("status reset");
    harness.store.clear_writes();

    harness
        .reconciler
        .reconcile_istio_csr(&key)
        .await
        .expect("pass succeeds");

    assert!(!harness
        .store
        .writes()
        .iter()
        .any(|w| matches!(w.op, WriteOp::Create(_))));
    assert_eq!(harness.store.objects_of(ResourceKind::ClusterRole).len(), 1);
    let status = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .and_then(|cr| cr.status)
        .expect("status written");
    assert_eq!(status.cluster_role.as_deref(), Some(role_name.as_str()));
    assert!(status.cluster_role_binding.is_some());
}

#[tokio::test]
async fn ambiguous_cluster_role_identity_is_irrecoverable() {
    let harness = Harness::with_instance();
    let owned_by = BTreeMap::from([
        (APP_LABEL.to_string(), ISTIO_CSR_NAME.to_string()),
        (WATCH_LABEL.to_string(), format!("{NAMESPACE}_default")),
    ]);
    for suffix in ["aaaaa", "bbbbb"] {
        let mut role = ClusterRole::default();
        role.metadata.name = Some(format!("{ISTIO_CSR_GENERATE_NAME}{suffix}"));
        role.metadata.labels = Some(owned_by.clone());
        harness.store.seed(role.into());
    }

    let err = harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect_err("duplicates must fail the pass");

    assert!(err.is_irrecoverable(), "unexpected reason: {err}");
    assert!(err.message().contains("aaaaa"));
    assert!(err.message().contains("bbbbb"));
    let created = creates(&harness.store);
    assert!(!created.contains(&ResourceKind::ClusterRole));
    assert!(!created.contains(&ResourceKind::ClusterRoleBinding));
    assert!(!created.contains(&ResourceKind::Deployment));
    assert_eq!(harness.store.objects_of(ResourceKind::ClusterRole).len(), 2);

    let status = harness
        .store
        .istio_csr(NAMESPACE, "default")
        .and_then(|cr| cr.status)
        .expect("status written");
    let degraded =
        find_condition(&status.conditions, CONDITION_DEGRADED).expect("degraded condition");
    assert_eq!(degraded.status, "True");
    assert_eq!(degraded.reason.as_deref(), Some(REASON_FAILED));
}

#[tokio::test]
async fn objects_from_a_prior_installation_are_reported_and_adopted() {
    let harness = Harness::with_instance();
    let mut leftover = k8s_openapi::api::core::v1::ServiceAccount::default();
    leftover.metadata.name = Some(ISTIO_CSR_NAME.to_string());
    leftover.metadata.namespace = Some(NAMESPACE.to_string());
    harness.store.seed(leftover.into());

    harness
        .reconciler
        .reconcile_istio_csr(&Harness::key(NAMESPACE))
        .await
        .expect("pass succeeds");

    let warnings: Vec<_> = harness
        .events
        .events()
        .into_iter()
        .filter(|e| e.warning && e.reason == reasons::RESOURCE_ALREADY_EXISTS)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(harness
        .store
        .writes()
        .iter()
        .any(|w| w.op == WriteOp::Update(ResourceKind::ServiceAccount)));
}
