//! # Resource Metrics
//!
//! Writes issued against managed resources, labelled by kind and operation.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static RESOURCE_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "istio_csr_resource_writes_total",
            "Total number of create/update calls issued for managed resources",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create RESOURCE_WRITES_TOTAL metric - this should never happen")
});

static STATUS_WRITE_ERRORS_TOTAL: LazyLock<prometheus::IntCounter> = LazyLock::new(|| {
    prometheus::IntCounter::new(
        "istio_csr_status_write_errors_total",
        "Total number of failed IstioCSR status writes",
    )
    .expect("Failed to create STATUS_WRITE_ERRORS_TOTAL metric - this should never happen")
});

pub(crate) fn register_resource_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RESOURCE_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITE_ERRORS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_resource_writes(kind: &str, operation: &str) {
    RESOURCE_WRITES_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_status_write_errors() {
    STATUS_WRITE_ERRORS_TOTAL.inc();
}
