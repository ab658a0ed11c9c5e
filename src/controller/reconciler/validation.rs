//! # Validation
//!
//! Checks the engine performs itself before converging anything:
//!
//! - the issuer reference points at a cert-manager `Issuer` or `ClusterIssuer`
//! - the private key algorithm, size and signature algorithm are compatible
//! - the referenced issuer exists and is not an ACME issuer
//!
//! It also resolves the root CA certificate handed to the istio-csr agent.

use crate::constants::*;
use crate::controller::resources::{ManagedObject, ObjectKey, ResourceKind};
use crate::controller::store::ObjectStore;
use crate::crd::cert_manager::{IssuerConfig, IssuerKind};
use crate::crd::{IstioCSR, IstiodTLSConfig};
use crate::error::ReconcileError;
use tracing::debug;

const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

const RSA_KEY_SIZES: &[i32] = &[2048, 4096, 8192];
const ECDSA_KEY_SIZES: &[i32] = &[256, 384];

const RSA_SIGNATURE_ALGORITHMS: &[&str] = &["SHA256WithRSA", "SHA384WithRSA", "SHA512WithRSA"];
const ECDSA_SIGNATURE_ALGORITHMS: &[&str] =
    &["ECDSAWithSHA256", "ECDSAWithSHA384", "ECDSAWithSHA512"];

/// Keys tried, in order, in the secret of a CA issuer
const CA_SECRET_KEYS: &[&str] = &["ca.crt", "tls.crt"];

/// Validate `issuerRef.group` and `issuerRef.kind`
pub fn validate_issuer_ref(istio_csr: &IstioCSR) -> Result<IssuerKind, ReconcileError> {
    let issuer_ref = &istio_csr.spec.istio_csr_config.cert_manager.issuer_ref;
    if issuer_ref.group != CERT_MANAGER_GROUP {
        return Err(ReconcileError::irrecoverable(format!(
            "spec.istioCSRConfig.certManager.issuerRef.group must be {CERT_MANAGER_GROUP}, got {:?}",
            issuer_ref.group
        )));
    }
    IssuerKind::parse(&issuer_ref.kind).ok_or_else(|| {
        ReconcileError::irrecoverable(format!(
            "spec.istioCSRConfig.certManager.issuerRef.kind must be Issuer or ClusterIssuer, got {:?}",
            issuer_ref.kind
        ))
    })
}

/// Validate the private key settings of the istiod certificate
pub fn validate_private_key(tls: &IstiodTLSConfig) -> Result<(), ReconcileError> {
    let algorithm = tls.private_key_algorithm.to_ascii_uppercase();
    let (sizes, signatures) = match algorithm.as_str() {
        "RSA" => (RSA_KEY_SIZES, RSA_SIGNATURE_ALGORITHMS),
        "ECDSA" => (ECDSA_KEY_SIZES, ECDSA_SIGNATURE_ALGORITHMS),
        other => {
            return Err(ReconcileError::irrecoverable(format!(
                "unsupported private key algorithm {other:?}, must be RSA or ECDSA"
            )))
        }
    };

    if !sizes.contains(&tls.private_key_size) {
        return Err(ReconcileError::irrecoverable(format!(
            "private key size {} is not valid for {algorithm}, allowed sizes are {sizes:?}",
            tls.private_key_size
        )));
    }

    if let Some(signature) = tls.signature_algorithm.as_deref() {
        if !signatures.contains(&signature) {
            return Err(ReconcileError::irrecoverable(format!(
                "signature algorithm {signature:?} is not compatible with {algorithm} keys, allowed are {signatures:?}"
            )));
        }
    }
    Ok(())
}

/// Fetch the referenced issuer and reject ACME issuers
pub async fn fetch_issuer(
    store: &dyn ObjectStore,
    istio_csr: &IstioCSR,
    kind: IssuerKind,
    istio_namespace: &str,
) -> Result<IssuerConfig, ReconcileError> {
    let name = &istio_csr.spec.istio_csr_config.cert_manager.issuer_ref.name;
    let key = match kind {
        IssuerKind::Issuer => ObjectKey::namespaced(istio_namespace, name.as_str()),
        IssuerKind::ClusterIssuer => ObjectKey::cluster(name.as_str()),
    };
    let kind_name = kind.as_str();

    let issuer = store
        .get_issuer(kind, &key)
        .await
        .map_err(|e| {
            ReconcileError::from_client_error(e, format!("failed to fetch {kind_name} {key}"))
        })?
        .ok_or_else(|| ReconcileError::retry_required(format!("{kind_name} {key} not found")))?;

    if issuer.acme.is_some() {
        return Err(ReconcileError::irrecoverable(format!(
            "{kind_name} {key} is an ACME issuer, which cannot sign istio workload certificates"
        )));
    }
    Ok(issuer)
}

/// Root CA certificate to distribute, if one can be determined
///
/// An explicit `istioCACertificate` ConfigMap reference wins; otherwise the
/// CA of a CA issuer is used. Other issuer types yield `None`.
pub async fn resolve_root_ca(
    store: &dyn ObjectStore,
    istio_csr: &IstioCSR,
    kind: IssuerKind,
    issuer: &IssuerConfig,
    istio_namespace: &str,
    cluster_resource_namespace: &str,
) -> Result<Option<String>, ReconcileError> {
    if let Some(reference) = &istio_csr.spec.istio_csr_config.cert_manager.istio_ca_certificate {
        let namespace = reference
            .namespace
            .clone()
            .or_else(|| istio_csr.metadata.namespace.clone())
            .unwrap_or_default();
        let key = ObjectKey::namespaced(namespace, reference.name.as_str());
        let config_map = match store.fetch(ResourceKind::ConfigMap, &key).await {
            Ok(Some(ManagedObject::ConfigMap(cm))) => cm,
            Ok(_) => {
                return Err(ReconcileError::retry_required(format!(
                    "CA certificate ConfigMap {key} not found"
                )))
            }
            Err(e) => {
                return Err(ReconcileError::from_client_error(
                    e,
                    format!("failed to fetch CA certificate ConfigMap {key}"),
                ))
            }
        };
        let pem = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(&reference.key))
            .ok_or_else(|| {
                ReconcileError::irrecoverable(format!(
                    "CA certificate ConfigMap {key} has no key {:?}",
                    reference.key
                ))
            })?;
        if !pem.contains(PEM_CERTIFICATE_MARKER) {
            return Err(ReconcileError::irrecoverable(format!(
                "key {:?} of ConfigMap {key} does not hold a PEM encoded certificate",
                reference.key
            )));
        }
        debug!(config_map = %key, "Using CA certificate from ConfigMap");
        return Ok(Some(pem.clone()));
    }

    let Some(ca) = &issuer.ca else {
        debug!("Issuer is not a CA issuer, no root CA to distribute");
        return Ok(None);
    };

    let namespace = match kind {
        IssuerKind::Issuer => istio_namespace,
        IssuerKind::ClusterIssuer => cluster_resource_namespace,
    };
    let key = ObjectKey::namespaced(namespace, ca.secret_name.as_str());
    let secret = store
        .get_secret(&key)
        .await
        .map_err(|e| ReconcileError::from_client_error(e, format!("failed to fetch CA secret {key}")))?
        .ok_or_else(|| ReconcileError::retry_required(format!("CA secret {key} not found")))?;

    let data = secret.data.unwrap_or_default();
    let pem = CA_SECRET_KEYS
        .iter()
        .find_map(|k| data.get(*k))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        .filter(|pem| !pem.trim().is_empty())
        .ok_or_else(|| {
            ReconcileError::irrecoverable(format!(
                "CA secret {key} has neither ca.crt nor tls.crt"
            ))
        })?;
    Ok(Some(pem))
}
