//! # Object Store
//!
//! The controller's only view of the API server. The reconciler talks to an
//! [`ObjectStore`]; production uses [`KubeStore`], unit tests use the
//! generated `MockObjectStore` and integration tests an in-memory double.
//!
//! Every failure is returned as a [`ClientError`] so classification never
//! depends on the transport.

use crate::constants::CONTROLLER_NAME;
use crate::controller::resources::{selector_string, ManagedObject, ObjectKey, ResourceKind};
use crate::crd::cert_manager::{Certificate, ClusterIssuer, IssuerConfig, IssuerKind, Issuer};
use crate::crd::IstioCSR;
use crate::error::{ClientError, StatusCategory};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;

#[cfg(test)]
use mockall::automock;

/// Access to the objects the controller reads and writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a managed object; `Ok(None)` when it does not exist
    async fn fetch(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, ClientError>;

    /// List cluster-scoped managed objects carrying every label of `selector`
    async fn list(
        &self,
        kind: ResourceKind,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, ClientError>;

    /// Create an object; the returned copy carries any generated name
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError>;

    /// Replace an object; `object` must carry the current resource version
    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError>;

    async fn get_istio_csr(&self, key: &ObjectKey) -> Result<Option<IstioCSR>, ClientError>;

    /// Every IstioCSR in the cluster
    async fn list_istio_csrs(&self) -> Result<Vec<IstioCSR>, ClientError>;

    /// Replace the IstioCSR object (metadata changes: annotations, finalizers)
    async fn update_istio_csr(&self, istio_csr: &IstioCSR) -> Result<IstioCSR, ClientError>;

    /// Write the status subresource of the IstioCSR
    async fn update_istio_csr_status(&self, istio_csr: &IstioCSR)
        -> Result<IstioCSR, ClientError>;

    /// Issuer configuration; `key.namespace` is ignored for ClusterIssuers
    async fn get_issuer(
        &self,
        kind: IssuerKind,
        key: &ObjectKey,
    ) -> Result<Option<IssuerConfig>, ClientError>;

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, ClientError>;
}

/// [`ObjectStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        }
    }

    fn namespaced_api<K>(&self, key: &ObjectKey) -> Result<Api<K>, ClientError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        let namespace = key.namespace.as_deref().ok_or_else(|| {
            ClientError::new(
                StatusCategory::BadRequest,
                format!("{} {} requires a namespace", K::kind(&()), key.name),
            )
        })?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }

    fn cluster_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    async fn get_namespaced<K>(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, ClientError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Into<ManagedObject>,
    {
        let api = self.namespaced_api::<K>(key)?;
        Ok(api.get_opt(&key.name).await?.map(Into::into))
    }

    async fn get_cluster<K>(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, ClientError>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Into<ManagedObject>,
    {
        Ok(self
            .cluster_api::<K>()
            .get_opt(&key.name)
            .await?
            .map(Into::into))
    }

    async fn list_cluster<K>(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, ClientError>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Into<ManagedObject>,
    {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self.cluster_api::<K>().list(&params).await?;
        Ok(list.items.into_iter().map(Into::into).collect())
    }

    async fn write_namespaced<K>(&self, object: &K, create: bool) -> Result<ManagedObject, ClientError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned
            + Into<ManagedObject>,
    {
        let key = ObjectKey {
            namespace: object.meta().namespace.clone(),
            name: object.meta().name.clone().unwrap_or_default(),
        };
        let api = self.namespaced_api::<K>(&key)?;
        let written = if create {
            api.create(&Self::post_params(), object).await?
        } else {
            api.replace(&key.name, &Self::post_params(), object).await?
        };
        Ok(written.into())
    }

    async fn write_cluster<K>(&self, object: &K, create: bool) -> Result<ManagedObject, ClientError>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned
            + Into<ManagedObject>,
    {
        let api = self.cluster_api::<K>();
        let written = if create {
            api.create(&Self::post_params(), object).await?
        } else {
            let name = object.meta().name.clone().unwrap_or_default();
            api.replace(&name, &Self::post_params(), object).await?
        };
        Ok(written.into())
    }

    async fn write(&self, object: &ManagedObject, create: bool) -> Result<ManagedObject, ClientError> {
        match object {
            ManagedObject::NetworkPolicy(o) => self.write_namespaced(o, create).await,
            ManagedObject::Service(o) => self.write_namespaced(o, create).await,
            ManagedObject::ServiceAccount(o) => self.write_namespaced(o, create).await,
            ManagedObject::ClusterRole(o) => self.write_cluster(o, create).await,
            ManagedObject::ClusterRoleBinding(o) => self.write_cluster(o, create).await,
            ManagedObject::Role(o) => self.write_namespaced(o, create).await,
            ManagedObject::RoleBinding(o) => self.write_namespaced(o, create).await,
            ManagedObject::Certificate(o) => self.write_namespaced(o, create).await,
            ManagedObject::ConfigMap(o) => self.write_namespaced(o, create).await,
            ManagedObject::Deployment(o) => self.write_namespaced(o, create).await,
        }
    }

    fn istio_csr_api(&self, istio_csr: &IstioCSR) -> Result<(Api<IstioCSR>, String), ClientError> {
        let key = ObjectKey {
            namespace: istio_csr.metadata.namespace.clone(),
            name: istio_csr.metadata.name.clone().unwrap_or_default(),
        };
        Ok((self.namespaced_api::<IstioCSR>(&key)?, key.name))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn fetch(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, ClientError> {
        match kind {
            ResourceKind::NetworkPolicy => self.get_namespaced::<NetworkPolicy>(key).await,
            ResourceKind::Service => self.get_namespaced::<Service>(key).await,
            ResourceKind::ServiceAccount => self.get_namespaced::<ServiceAccount>(key).await,
            ResourceKind::ClusterRole => self.get_cluster::<ClusterRole>(key).await,
            ResourceKind::ClusterRoleBinding => self.get_cluster::<ClusterRoleBinding>(key).await,
            ResourceKind::Role => self.get_namespaced::<Role>(key).await,
            ResourceKind::RoleBinding => self.get_namespaced::<RoleBinding>(key).await,
            ResourceKind::Certificate => self.get_namespaced::<Certificate>(key).await,
            ResourceKind::ConfigMap => self.get_namespaced::<ConfigMap>(key).await,
            ResourceKind::Deployment => self.get_namespaced::<Deployment>(key).await,
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, ClientError> {
        match kind {
            ResourceKind::ClusterRole => self.list_cluster::<ClusterRole>(selector).await,
            ResourceKind::ClusterRoleBinding => {
                self.list_cluster::<ClusterRoleBinding>(selector).await
            }
            other => Err(ClientError::new(
                StatusCategory::BadRequest,
                format!("listing {other} is not supported"),
            )),
        }
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError> {
        self.write(object, true).await
    }

    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, ClientError> {
        self.write(object, false).await
    }

    async fn get_istio_csr(&self, key: &ObjectKey) -> Result<Option<IstioCSR>, ClientError> {
        Ok(self
            .namespaced_api::<IstioCSR>(key)?
            .get_opt(&key.name)
            .await?)
    }

    async fn list_istio_csrs(&self) -> Result<Vec<IstioCSR>, ClientError> {
        let api: Api<IstioCSR> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn update_istio_csr(&self, istio_csr: &IstioCSR) -> Result<IstioCSR, ClientError> {
        let (api, name) = self.istio_csr_api(istio_csr)?;
        Ok(api.replace(&name, &Self::post_params(), istio_csr).await?)
    }

    async fn update_istio_csr_status(
        &self,
        istio_csr: &IstioCSR,
    ) -> Result<IstioCSR, ClientError> {
        let (api, name) = self.istio_csr_api(istio_csr)?;
        let patch = json!({ "status": istio_csr.status });
        Ok(api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn get_issuer(
        &self,
        kind: IssuerKind,
        key: &ObjectKey,
    ) -> Result<Option<IssuerConfig>, ClientError> {
        match kind {
            IssuerKind::Issuer => Ok(self
                .namespaced_api::<Issuer>(key)?
                .get_opt(&key.name)
                .await?
                .map(|issuer| issuer.spec.config)),
            IssuerKind::ClusterIssuer => {
                let api: Api<ClusterIssuer> = Api::all(self.client.clone());
                Ok(api
                    .get_opt(&key.name)
                    .await?
                    .map(|issuer| issuer.spec.config))
            }
        }
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, ClientError> {
        Ok(self
            .namespaced_api::<Secret>(key)?
            .get_opt(&key.name)
            .await?)
    }
}
