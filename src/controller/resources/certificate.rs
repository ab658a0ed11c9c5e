//! # istiod Certificate
//!
//! cert-manager Certificate for istiod, issued by the issuer the IstioCSR
//! references and written to the `istiod-tls` secret in the istio namespace.

use super::{DesiredContext, ManagedResourceSpec};
use crate::crd::cert_manager::{CertIssuerReference, Certificate, CertificatePrivateKey};

/// Service account of istiod, embedded in the certificate SPIFFE URI
const ISTIOD_SERVICE_ACCOUNT: &str = "istiod-service-account";

pub fn desired_certificate(
    spec: &ManagedResourceSpec<Certificate>,
    ctx: &DesiredContext<'_>,
) -> Certificate {
    let config = &ctx.istio_csr.spec.istio_csr_config;
    let tls = &config.istiod_tls_config;
    let issuer = &config.cert_manager.issuer_ref;

    let mut certificate = ctx.instantiate(spec);
    let cert_spec = &mut certificate.spec;
    cert_spec.common_name = Some(
        tls.common_name
            .clone()
            .unwrap_or_else(|| format!("istiod.{}.svc", ctx.istio_namespace)),
    );
    cert_spec.dns_names = dns_names(&config.istio.revisions, &tls.certificate_dns_names, ctx);
    cert_spec.uris = vec![format!(
        "spiffe://{}/ns/{}/sa/{}",
        tls.trust_domain, ctx.istio_namespace, ISTIOD_SERVICE_ACCOUNT
    )];
    cert_spec.duration = Some(tls.certificate_duration.clone());
    cert_spec.renew_before = Some(tls.certificate_renew_before.clone());
    cert_spec.issuer_ref = CertIssuerReference {
        name: issuer.name.clone(),
        kind: Some(issuer.kind.clone()),
        group: Some(issuer.group.clone()),
    };
    let rotation_policy = cert_spec
        .private_key
        .as_ref()
        .and_then(|k| k.rotation_policy.clone());
    cert_spec.private_key = Some(CertificatePrivateKey {
        algorithm: Some(tls.private_key_algorithm.to_uppercase()),
        size: Some(tls.private_key_size),
        rotation_policy,
    });
    cert_spec.signature_algorithm = tls.signature_algorithm.clone();
    certificate
}

/// `istiod[-<revision>].<istio namespace>.svc` for every revision followed by
/// the user-provided names, without duplicates
fn dns_names(revisions: &[String], extra: &[String], ctx: &DesiredContext<'_>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let generated = revisions.iter().map(|revision| {
        if revision.is_empty() || revision == "default" {
            format!("istiod.{}.svc", ctx.istio_namespace)
        } else {
            format!("istiod-{}.{}.svc", revision, ctx.istio_namespace)
        }
    });
    for name in generated.chain(extra.iter().cloned()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
