//! Shared fixtures for the reconciliation integration tests
//!
//! [`InMemoryStore`] stands in for the API server: it assigns resource
//! versions and generated names, rejects stale updates with a conflict and
//! records every write so tests can assert on exactly what a pass did.

#![allow(dead_code, reason = "each test binary uses a different subset of the helpers")]

use async_trait::async_trait;
use istio_csr_controller::config::ControllerConfig;
use istio_csr_controller::controller::events::EventPublisher;
use istio_csr_controller::controller::reconciler::Reconciler;
use istio_csr_controller::controller::resources::{
    matches_selector, ManagedObject, ObjectKey, ResourceKind,
};
use istio_csr_controller::controller::retry::RetryPolicy;
use istio_csr_controller::controller::store::ObjectStore;
use istio_csr_controller::crd::cert_manager::{CaIssuer, IssuerConfig, IssuerKind};
use istio_csr_controller::crd::{IstioCSR, IstioCSRSpec};
use istio_csr_controller::error::{ClientError, StatusCategory};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::runtime::events::EventType;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "istio-csr";
pub const ISTIO_NAMESPACE: &str = "istio-system";
pub const ISSUER_NAME: &str = "istio-ca";
pub const CA_SECRET_NAME: &str = "istio-ca-keypair";
pub const IMAGE: &str = "registry.example.com/cert-manager/cert-manager-istio-csr:v0.14.0";
pub const CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIRAO\n-----END CERTIFICATE-----\n";

/// Kind of write observed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create(ResourceKind),
    Update(ResourceKind),
    UpdateIstioCSR,
    UpdateIstioCSRStatus,
}

#[derive(Debug, Clone)]
pub struct Write {
    pub op: WriteOp,
    pub key: ObjectKey,
}

#[derive(Default)]
struct State {
    next_version: u64,
    objects: BTreeMap<(ResourceKind, ObjectKey), ManagedObject>,
    istio_csrs: BTreeMap<ObjectKey, IstioCSR>,
    issuers: Vec<(IssuerKind, ObjectKey, IssuerConfig)>,
    secrets: BTreeMap<ObjectKey, Secret>,
    writes: Vec<Write>,
    failing_creates: HashMap<ResourceKind, StatusCategory>,
    failing_status_writes: Option<StatusCategory>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory API server double
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("store lock poisoned")
    }

    /// Store an IstioCSR as if a user had applied it
    pub fn insert_istio_csr(&self, mut istio_csr: IstioCSR) {
        let mut state = self.lock();
        istio_csr.metadata.resource_version = Some(state.bump());
        let key = key_of_istio_csr(&istio_csr);
        state.istio_csrs.insert(key, istio_csr);
    }

    /// Store a managed object directly, bypassing the write log
    pub fn seed(&self, mut object: ManagedObject) {
        let mut state = self.lock();
        let version = state.bump();
        object.set_resource_version(Some(version));
        state.objects.insert((object.kind(), object.key()), object);
    }

    /// Replace a stored object out of band, as another client would
    pub fn tamper<F>(&self, kind: ResourceKind, key: &ObjectKey, mutate: F)
    where
        F: FnOnce(&mut ManagedObject),
    {
        let mut state = self.lock();
        let version = state.bump();
        let object = state
            .objects
            .get_mut(&(kind, key.clone()))
            .expect("object to tamper with");
        mutate(object);
        object.set_resource_version(Some(version));
    }

    pub fn insert_issuer(&self, kind: IssuerKind, key: ObjectKey, config: IssuerConfig) {
        self.lock().issuers.push((kind, key, config));
    }

    pub fn insert_secret(&self, key: ObjectKey, secret: Secret) {
        self.lock().secrets.insert(key, secret);
    }

    pub fn fail_creates_of(&self, kind: ResourceKind, category: StatusCategory) {
        self.lock().failing_creates.insert(kind, category);
    }

    pub fn fail_status_writes(&self, category: Option<StatusCategory>) {
        self.lock().failing_status_writes = category;
    }

    pub fn object(&self, kind: ResourceKind, key: &ObjectKey) -> Option<ManagedObject> {
        self.lock().objects.get(&(kind, key.clone())).cloned()
    }

    pub fn objects_of(&self, kind: ResourceKind) -> Vec<ManagedObject> {
        self.lock()
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    pub fn istio_csr(&self, namespace: &str, name: &str) -> Option<IstioCSR> {
        self.lock()
            .istio_csrs
            .get(&ObjectKey::namespaced(namespace, name))
            .cloned()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

fn key_of_istio_csr(istio_csr: &IstioCSR) -> ObjectKey {
    ObjectKey {
        namespace: istio_csr.metadata.namespace.clone(),
        name: istio_csr.metadata.name.clone().unwrap_or_default(),
    }
}

fn not_found(what: impl std::fmt::Display) -> ClientError {
    ClientError::new(StatusCategory::NotFound, format!("{what} not found"))
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn fetch(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, ClientError> {
        Ok(self.object(kind, key))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, ClientError> {
        Ok(self
            .objects_of(kind)
            .into_iter()
            .filter(|o| matches_selector(o.labels(), selector))
            .collect())
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError> {
        let mut state = self.lock();
        let kind = object.kind();
        if let Some(category) = state.failing_creates.get(&kind) {
            return Err(ClientError::new(*category, format!("injected {kind} create failure")));
        }

        let mut created = object.clone();
        if created.name().unwrap_or_default().is_empty() {
            let prefix = created.meta().generate_name.clone().ok_or_else(|| {
                ClientError::new(StatusCategory::Invalid, "name or generateName is required")
            })?;
            let suffix = state.next_version + 1;
            created.meta_mut().name = Some(format!("{prefix}{suffix:05x}"));
        }
        let key = created.key();
        if state.objects.contains_key(&(kind, key.clone())) {
            return Err(ClientError::new(
                StatusCategory::Conflict,
                format!("{kind} {key} already exists"),
            ));
        }
        let version = state.bump();
        created.set_resource_version(Some(version));
        state.objects.insert((kind, key.clone()), created.clone());
        state.writes.push(Write {
            op: WriteOp::Create(kind),
            key,
        });
        Ok(created)
    }

    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError> {
        let mut state = self.lock();
        let kind = object.kind();
        let key = object.key();
        let current = state
            .objects
            .get(&(kind, key.clone()))
            .ok_or_else(|| not_found(format!("{kind} {key}")))?;
        if current.resource_version() != object.resource_version() {
            return Err(ClientError::new(
                StatusCategory::Conflict,
                format!("{kind} {key} has been modified"),
            ));
        }
        let mut updated = object.clone();
        let version = state.bump();
        updated.set_resource_version(Some(version));
        state.objects.insert((kind, key.clone()), updated.clone());
        state.writes.push(Write {
            op: WriteOp::Update(kind),
            key,
        });
        Ok(updated)
    }

    async fn get_istio_csr(&self, key: &ObjectKey) -> Result<Option<IstioCSR>, ClientError> {
        Ok(self.lock().istio_csrs.get(key).cloned())
    }

    async fn list_istio_csrs(&self) -> Result<Vec<IstioCSR>, ClientError> {
        Ok(self.lock().istio_csrs.values().cloned().collect())
    }

    async fn update_istio_csr(&self, istio_csr: &IstioCSR) -> Result<IstioCSR, ClientError> {
        let mut state = self.lock();
        let key = key_of_istio_csr(istio_csr);
        let current = state
            .istio_csrs
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(format!("istiocsr {key}")))?;
        if current.metadata.resource_version != istio_csr.metadata.resource_version {
            return Err(ClientError::new(
                StatusCategory::Conflict,
                format!("istiocsr {key} has been modified"),
            ));
        }

        // The main resource endpoint ignores status
        let mut updated = istio_csr.clone();
        updated.status = current.status;
        updated.metadata.resource_version = Some(state.bump());
        state.writes.push(Write {
            op: WriteOp::UpdateIstioCSR,
            key: key.clone(),
        });

        let released = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
        if released {
            state.istio_csrs.remove(&key);
        } else {
            state.istio_csrs.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_istio_csr_status(
        &self,
        istio_csr: &IstioCSR,
    ) -> Result<IstioCSR, ClientError> {
        let mut state = self.lock();
        if let Some(category) = state.failing_status_writes {
            return Err(ClientError::new(category, "injected status write failure"));
        }
        let key = key_of_istio_csr(istio_csr);
        let version = state.bump();
        let current = state
            .istio_csrs
            .get_mut(&key)
            .ok_or_else(|| not_found(format!("istiocsr {key}")))?;
        current.status = istio_csr.status.clone();
        current.metadata.resource_version = Some(version);
        let updated = current.clone();
        state.writes.push(Write {
            op: WriteOp::UpdateIstioCSRStatus,
            key,
        });
        Ok(updated)
    }

    async fn get_issuer(
        &self,
        kind: IssuerKind,
        key: &ObjectKey,
    ) -> Result<Option<IssuerConfig>, ClientError> {
        Ok(self
            .lock()
            .issuers
            .iter()
            .find(|(k, stored, _)| {
                *k == kind
                    && stored.name == key.name
                    && (kind == IssuerKind::ClusterIssuer || stored.namespace == key.namespace)
            })
            .map(|(_, _, config)| config.clone()))
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, ClientError> {
        Ok(self.lock().secrets.get(key).cloned())
    }
}

/// Event captured by [`RecordingEventPublisher`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .lock()
            .expect("events lock poisoned")
            .push(RecordedEvent {
                warning: matches!(type_, EventType::Warning),
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
    }
}

/// Creation time `secs` seconds after the epoch
pub fn created_at(secs: i64) -> Time {
    let rfc3339 = chrono::DateTime::from_timestamp(secs, 0)
        .expect("valid timestamp")
        .to_rfc3339();
    serde_json::from_value(serde_json::json!(rfc3339)).expect("valid time")
}

/// IstioCSR named `default` in `namespace`, signed by the CA issuer
pub fn istio_csr(namespace: &str, created_secs: i64) -> IstioCSR {
    let spec: IstioCSRSpec = serde_json::from_value(serde_json::json!({
        "istioCSRConfig": {
            "certManager": {
                "issuerRef": {"name": ISSUER_NAME, "kind": "Issuer", "group": "cert-manager.io"}
            },
            "istiodTLSConfig": {"trustDomain": "cluster.local"},
            "istio": {"namespace": ISTIO_NAMESPACE}
        }
    }))
    .expect("valid spec");
    let mut cr = IstioCSR::new("default", spec);
    cr.metadata.namespace = Some(namespace.to_string());
    cr.metadata.uid = Some(format!("uid-{namespace}"));
    cr.metadata.creation_timestamp = Some(created_at(created_secs));
    cr
}

pub fn ca_issuer() -> IssuerConfig {
    IssuerConfig {
        ca: Some(CaIssuer {
            secret_name: CA_SECRET_NAME.to_string(),
        }),
        ..Default::default()
    }
}

pub fn ca_secret() -> Secret {
    Secret {
        data: Some(BTreeMap::from([(
            "ca.crt".to_string(),
            ByteString(CA_PEM.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// Controller configuration with a fixed requeue delay and no retry jitter
pub fn config(image: Option<&str>) -> ControllerConfig {
    ControllerConfig {
        istio_csr_image: image.map(str::to_string),
        requeue_delay: Duration::from_secs(30),
        conflict_retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub events: Arc<RecordingEventPublisher>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    /// Cluster with the CA issuer and its secret, but no IstioCSR yet
    pub fn new(config: ControllerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.insert_issuer(
            IssuerKind::Issuer,
            ObjectKey::namespaced(ISTIO_NAMESPACE, ISSUER_NAME),
            ca_issuer(),
        );
        store.insert_secret(
            ObjectKey::namespaced(ISTIO_NAMESPACE, CA_SECRET_NAME),
            ca_secret(),
        );
        let events = Arc::new(RecordingEventPublisher::default());
        let reconciler = Reconciler::new(store.clone(), events.clone(), config)
            .expect("embedded templates decode");
        Self {
            store,
            events,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Harness holding a single IstioCSR in [`NAMESPACE`]
    pub fn with_instance() -> Self {
        let harness = Self::new(config(Some(IMAGE)));
        harness.store.insert_istio_csr(istio_csr(NAMESPACE, 1_000));
        harness
    }

    pub fn key(namespace: &str) -> ObjectKey {
        ObjectKey::namespaced(namespace, "default")
    }
}
