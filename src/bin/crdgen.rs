//! Prints the IstioCSR CustomResourceDefinition as YAML.
//!
//! ```sh
//! cargo run --bin crdgen > config/crd/istiocsr.yaml
//! ```

use istio_csr_controller::crd::IstioCSR;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&IstioCSR::crd())?);
    Ok(())
}
