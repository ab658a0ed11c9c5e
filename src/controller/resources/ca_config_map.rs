//! ConfigMap carrying a copy of the issuer's root CA, mounted by the
//! istio-csr pods and passed as `--root-ca-file`.

use super::{DesiredContext, ManagedResourceSpec};
use crate::constants::CA_CONFIG_MAP_KEY;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;

pub fn desired_ca_config_map(
    spec: &ManagedResourceSpec<ConfigMap>,
    ctx: &DesiredContext<'_>,
    ca_pem: &str,
) -> ConfigMap {
    let mut config_map = ctx.instantiate(spec);
    config_map.data = Some(BTreeMap::from([(
        CA_CONFIG_MAP_KEY.to_string(),
        ca_pem.to_string(),
    )]));
    config_map
}
