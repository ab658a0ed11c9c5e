//! # istio-csr Controller
//!
//! Binary entry point. See the library documentation for an overview.

use anyhow::Result;
use istio_csr_controller::runtime::initialization::initialize;
use istio_csr_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime
    let init_result = initialize().await?;

    // Run the watch loop
    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
