//! # istio-csr Deployment
//!
//! The workload itself. The template provides the container shape (ports,
//! probe, security context); the IstioCSR provides image, arguments and
//! scheduling. When a root CA is copied into the CA ConfigMap it is mounted
//! into the container and passed as `--root-ca-file`.

use super::{DesiredContext, ManagedResourceSpec};
use crate::constants::*;
use crate::error::ReconcileError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, Volume, VolumeMount};

/// Mode of the mounted CA file; also what the API server defaults it to
const CA_FILE_MODE: i32 = 0o644;

pub fn desired_deployment(
    spec: &ManagedResourceSpec<Deployment>,
    ctx: &DesiredContext<'_>,
    image: &str,
    ca_configured: bool,
) -> Result<Deployment, ReconcileError> {
    let config = &ctx.istio_csr.spec.istio_csr_config;
    let mut deployment = ctx.instantiate(spec);

    let pod = deployment
        .spec
        .as_mut()
        .map(|s| &mut s.template)
        .ok_or_else(|| ReconcileError::irrecoverable("deployment template has no spec"))?;

    let pod_meta = pod.metadata.get_or_insert_with(Default::default);
    let mut pod_labels = pod_meta.labels.take().unwrap_or_default();
    pod_labels.extend(ctx.labels.clone());
    pod_meta.labels = Some(pod_labels);

    let pod_spec = pod
        .spec
        .as_mut()
        .ok_or_else(|| ReconcileError::irrecoverable("deployment template has no pod spec"))?;
    pod_spec.service_account_name = Some(ISTIO_CSR_NAME.to_string());
    if let Some(node_selector) = &config.node_selector {
        pod_spec.node_selector = Some(node_selector.clone());
    }
    if let Some(affinity) = &config.affinity {
        pod_spec.affinity = Some(affinity.clone());
    }
    if let Some(tolerations) = &config.tolerations {
        pod_spec.tolerations = Some(tolerations.clone());
    }
    if ca_configured {
        pod_spec.volumes = Some(vec![ca_volume()?]);
    }

    let container = pod_spec
        .containers
        .iter_mut()
        .find(|c| c.name == ISTIO_CSR_CONTAINER_NAME)
        .ok_or_else(|| {
            ReconcileError::irrecoverable(format!(
                "deployment template has no {ISTIO_CSR_CONTAINER_NAME} container"
            ))
        })?;
    container.image = Some(image.to_string());
    container.args = Some(container_args(ctx, ca_configured));
    if let Some(resources) = &config.resources {
        container.resources = Some(resources.clone());
    }
    if ca_configured {
        container.volume_mounts = Some(vec![VolumeMount {
            name: CA_VOLUME_NAME.to_string(),
            mount_path: CA_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]);
    }

    Ok(deployment)
}

fn ca_volume() -> Result<Volume, ReconcileError> {
    let source: ConfigMapVolumeSource = serde_json::from_value(serde_json::json!({
        "name": CA_CONFIG_MAP_NAME,
        "defaultMode": CA_FILE_MODE,
    }))
    .map_err(|e| ReconcileError::irrecoverable("failed to build CA volume").with_cause(e))?;
    Ok(Volume {
        name: CA_VOLUME_NAME.to_string(),
        config_map: Some(source),
        ..Default::default()
    })
}

/// Command line of the istio-csr agent
fn container_args(ctx: &DesiredContext<'_>, ca_configured: bool) -> Vec<String> {
    let config = &ctx.istio_csr.spec.istio_csr_config;
    let tls = &config.istiod_tls_config;
    let issuer = &config.cert_manager.issuer_ref;
    let server = ctx.istio_csr.server();

    let mut args = vec![
        format!("--log-level={}", config.log_level),
        format!("--log-format={}", config.log_format),
        format!("--metrics-port={ISTIO_CSR_METRICS_PORT}"),
        format!("--readiness-probe-port={ISTIO_CSR_READINESS_PORT}"),
        "--readiness-probe-path=/readyz".to_string(),
        format!("--certificate-namespace={}", ctx.istio_namespace),
        "--issuer-enabled=true".to_string(),
        format!("--issuer-name={}", issuer.name),
        format!("--issuer-kind={}", issuer.kind),
        format!("--issuer-group={}", issuer.group),
        "--preserve-certificate-requests=false".to_string(),
        format!(
            "--serving-certificate-dns-names={}.{}.svc",
            ISTIO_CSR_NAME, ctx.namespace
        ),
        format!("--serving-certificate-duration={}", tls.certificate_duration),
        format!("--trust-domain={}", tls.trust_domain),
        format!("--cluster-id={}", server.cluster_id),
        format!(
            "--max-client-certificate-duration={}",
            tls.max_certificate_duration
        ),
        format!("--serving-address=0.0.0.0:{ISTIO_CSR_GRPC_TARGET_PORT}"),
        format!("--serving-certificate-key-size={}", tls.private_key_size),
        format!(
            "--serving-signature-algorithm={}",
            tls.private_key_algorithm.to_uppercase()
        ),
        "--enable-client-cert-authenticator=false".to_string(),
        format!("--leader-election-namespace={}", ctx.namespace),
        "--disable-kubernetes-client-rate-limiter=false".to_string(),
        format!("--runtime-issuance-config-map-namespace={}", ctx.namespace),
        "--istiod-cert-enabled=false".to_string(),
        format!(
            "--istiod-cert-istio-revisions={}",
            config.istio.revisions.join(",")
        ),
    ];
    if let Some(selector) = &config.istio_data_plane_namespace_selector {
        args.push(format!("--istio-data-plane-namespace-selector={selector}"));
    }
    if ca_configured {
        args.push(format!(
            "--root-ca-file={CA_MOUNT_PATH}/{CA_CONFIG_MAP_KEY}"
        ));
    }
    args
}
