use async_trait::async_trait;
use common::{
    FIELD_MANAGER, FacadeService, Gateway,
    ingresskinds::{LegacyIngress, Route},
    podmonitor::PodMonitor,
};
use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::Deployment,
        autoscaling::v2::HorizontalPodAutoscaler,
        core::v1::{ConfigMap, Service},
        networking::v1::Ingress,
    },
};
use kube::{
    Client,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt::Debug, marker::PhantomData, sync::Arc};

/// Any namespaced object the operator reads or writes
pub trait StoredKind:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredKind for K where
    K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The slice of the Kubernetes API the reconcilers depend on
#[async_trait]
pub trait ObjectStore<K: StoredKind>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<K>;
    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> kube::Result<Vec<K>>;
    async fn create(&self, namespace: &str, obj: &K) -> kube::Result<K>;
    async fn replace(&self, namespace: &str, name: &str, obj: &K) -> kube::Result<K>;
    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()>;
    /// JSON merge patch on the status sub-resource
    async fn patch_status(&self, namespace: &str, name: &str, patch: Value) -> kube::Result<K>;
}

/// [`ObjectStore`] backed by the API server
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K: StoredKind> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<K> {
        Api::<K>::namespaced(self.client.clone(), namespace).get(name).await
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> kube::Result<Vec<K>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(Api::<K>::namespaced(self.client.clone(), namespace)
            .list(&params)
            .await?
            .items)
    }

    async fn create(&self, namespace: &str, obj: &K) -> kube::Result<K> {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .create(&post_params(), obj)
            .await
    }

    async fn replace(&self, namespace: &str, name: &str, obj: &K) -> kube::Result<K> {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .replace(name, &post_params(), obj)
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()> {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: Value) -> kube::Result<K> {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }
}

// ── API error classification ─────────────────────────────────────────────────

fn api_error(e: &kube::Error) -> Option<(u16, &str)> {
    match e {
        kube::Error::Api(resp) => Some((resp.code, resp.reason.as_str())),
        _ => None,
    }
}

pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(api_error(e), Some((404, _)))
}

pub fn is_conflict(e: &kube::Error) -> bool {
    matches!(api_error(e), Some((409, reason)) if reason != "AlreadyExists")
}

pub fn is_already_exists(e: &kube::Error) -> bool {
    matches!(api_error(e), Some((409, "AlreadyExists")))
}

/// Every store the reconcilers use, one per object kind
#[derive(Clone)]
pub struct Stores {
    pub facade_services: Arc<dyn ObjectStore<FacadeService>>,
    pub gateways: Arc<dyn ObjectStore<Gateway>>,
    pub deployments: Arc<dyn ObjectStore<Deployment>>,
    pub services: Arc<dyn ObjectStore<Service>>,
    pub config_maps: Arc<dyn ObjectStore<ConfigMap>>,
    pub hpas: Arc<dyn ObjectStore<HorizontalPodAutoscaler>>,
    pub pod_monitors: Arc<dyn ObjectStore<PodMonitor>>,
    pub ingresses: Arc<dyn ObjectStore<Ingress>>,
    pub legacy_ingresses: Arc<dyn ObjectStore<LegacyIngress>>,
    pub routes: Arc<dyn ObjectStore<Route>>,
}

impl Stores {
    pub fn kube(client: &Client) -> Self {
        Self {
            facade_services: Arc::new(KubeStore::new(client.clone())),
            gateways: Arc::new(KubeStore::new(client.clone())),
            deployments: Arc::new(KubeStore::new(client.clone())),
            services: Arc::new(KubeStore::new(client.clone())),
            config_maps: Arc::new(KubeStore::new(client.clone())),
            hpas: Arc::new(KubeStore::new(client.clone())),
            pod_monitors: Arc::new(KubeStore::new(client.clone())),
            ingresses: Arc::new(KubeStore::new(client.clone())),
            legacy_ingresses: Arc::new(KubeStore::new(client.clone())),
            routes: Arc::new(KubeStore::new(client.clone())),
        }
    }
}
