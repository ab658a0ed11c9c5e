//! # Constants
//!
//! Well-known names, labels, annotations and defaults shared across the controller.

/// Name used for the operand's namespaced objects (Deployment, Service, ServiceAccount)
pub const ISTIO_CSR_NAME: &str = "cert-manager-istio-csr";

/// Prefix for the generated names of cluster-scoped RBAC objects
pub const ISTIO_CSR_GENERATE_NAME: &str = "cert-manager-istio-csr-";

/// ConfigMap holding the copied root CA certificate mounted by the operand
pub const CA_CONFIG_MAP_NAME: &str = "cert-manager-istio-csr-issuer-ca-copy";

/// Key under which the root CA is stored in the CA ConfigMap
pub const CA_CONFIG_MAP_KEY: &str = "ca-cert.pem";

/// Directory where the CA ConfigMap is mounted in the operand container
pub const CA_MOUNT_PATH: &str = "/var/run/configmaps/istio-csr";

/// Volume name for the CA ConfigMap
pub const CA_VOLUME_NAME: &str = "root-ca";

/// Name of the istiod serving certificate
pub const ISTIOD_CERTIFICATE_NAME: &str = "istiod";

/// Secret written by cert-manager for the istiod certificate
pub const ISTIOD_CERTIFICATE_SECRET_NAME: &str = "istiod-tls";

/// Container name inside the operand Deployment
pub const ISTIO_CSR_CONTAINER_NAME: &str = "cert-manager-istio-csr";

/// Port the operand serves gRPC on inside the pod
pub const ISTIO_CSR_GRPC_TARGET_PORT: i32 = 6443;

/// Metrics port of the operand
pub const ISTIO_CSR_METRICS_PORT: i32 = 9402;

/// Readiness probe port of the operand
pub const ISTIO_CSR_READINESS_PORT: i32 = 6060;

/// Finalizer added to every admitted IstioCSR
pub const FINALIZER: &str = "istiocsr.openshift.operator.io/istio-csr-controller";

/// Annotation recording that the first convergence pass completed
pub const PROCESSED_ANNOTATION: &str = "operator.openshift.io/istio-csr-processed";

/// Annotation marking an instance rejected by singleton admission
pub const REJECT_MULTIPLE_INSTANCE_ANNOTATION: &str =
    "operator.openshift.io/istio-csr-reject-multiple-instance";

/// Label linking a managed resource back to the IstioCSR that owns it
/// Value format: `<namespace>_<name>`
pub const WATCH_LABEL: &str = "istiocsr.openshift.operator.io/watched-by";

/// Label carried by every managed resource
pub const APP_LABEL: &str = "app";

/// Field manager / event reporter name
pub const CONTROLLER_NAME: &str = "cert-manager-istio-csr-controller";

/// cert-manager API group accepted in issuerRef.group
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Condition types
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_DEGRADED: &str = "Degraded";

/// Condition reasons
pub const REASON_READY: &str = "Ready";
pub const REASON_FAILED: &str = "Failed";
pub const REASON_IN_PROGRESS: &str = "Progressing";
pub const REASON_MULTIPLE_INSTANCE: &str = "MultipleInstance";

/// Default requeue delay for RetryRequired failures
pub const DEFAULT_REQUEUE_SECS: u64 = 30;

/// Default namespace where ClusterIssuer secrets live
pub const DEFAULT_CLUSTER_RESOURCE_NAMESPACE: &str = "cert-manager";

/// Default optimistic-concurrency retry policy
pub const DEFAULT_CONFLICT_RETRY_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONFLICT_RETRY_INITIAL_DELAY_MS: u64 = 10;
pub const DEFAULT_CONFLICT_RETRY_MAX_DELAY_MS: u64 = 1000;

/// Default HTTP server settings
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before the watch loop restarts after a stream error
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;
