use crate::{
    lock::NamedResourceLock,
    reconciler::CommonReconciler,
    store::{ObjectStore, Stores, StoredKind},
};
use async_trait::async_trait;
use common::{
    FacadeService, Gateway, MeshGateway, Result,
    config::OperatorConfig,
    controlplane::{ControlPlane, GatewayDeclaration},
    facade::GatewaySpecBody,
    facadeservice::FacadeServiceSpec,
    gateway::GatewaySpec,
    ingresskinds::{LegacyIngress, Route},
    podmonitor::PodMonitor,
};
use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v2::HorizontalPodAutoscaler,
    core::v1::{ConfigMap, Service},
    networking::v1::Ingress,
};
use kube::{ResourceExt, error::ErrorResponse};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

pub fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: Option<&str>) -> bool {
    selector.unwrap_or_default().split(',').filter(|s| !s.is_empty()).all(|term| {
        match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).is_some_and(|v| v == value.trim()),
            None => labels.contains_key(term.trim()),
        }
    })
}

pub fn body(gateway: Option<&str>) -> GatewaySpecBody {
    GatewaySpecBody {
        gateway: gateway.map(String::from),
        port: 8080,
        ..Default::default()
    }
}

pub fn facade_service(name: &str, body: GatewaySpecBody) -> MeshGateway {
    let mut fs = FacadeService::new(name, FacadeServiceSpec { body });
    fs.metadata.namespace = Some("ns".to_string());
    fs.metadata.uid = Some(format!("uid-{name}"));
    fs.metadata.generation = Some(1);
    MeshGateway::FacadeService(fs)
}

pub fn gateway(name: &str, body: GatewaySpecBody) -> MeshGateway {
    let mut gw = Gateway::new(name, GatewaySpec { body });
    gw.metadata.namespace = Some("ns".to_string());
    gw.metadata.uid = Some(format!("uid-{name}"));
    gw.metadata.generation = Some(1);
    MeshGateway::Gateway(gw)
}

/// In-memory [`ObjectStore`] counting every mutating call
pub struct MemStore<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    mutations: Arc<AtomicUsize>,
    versions: AtomicUsize,
    conflicts: Mutex<HashSet<String>>,
    panics: Mutex<HashSet<String>>,
}

impl<K: StoredKind> MemStore<K> {
    pub fn new(mutations: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(BTreeMap::new()),
            mutations,
            versions: AtomicUsize::new(1),
            conflicts: Mutex::new(HashSet::new()),
            panics: Mutex::new(HashSet::new()),
        })
    }

    fn next_version(&self) -> String {
        self.versions.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Insert an object without counting it as a mutation
    pub fn seed(&self, mut obj: K) {
        obj.meta_mut().resource_version = Some(self.next_version());
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().map(|(_, name)| name.clone()).collect()
    }

    /// Make every replace of `name` fail with a conflict
    pub fn conflict_on(&self, name: &str) {
        self.conflicts.lock().unwrap().insert(name.to_string());
    }

    /// Make every get of `name` panic
    pub fn panic_on(&self, name: &str) {
        self.panics.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl<K: StoredKind> ObjectStore<K> for MemStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<K> {
        let broken = self.panics.lock().unwrap().contains(name);
        if broken {
            panic!("{name} is broken");
        }
        self.find(namespace, name)
            .ok_or_else(|| api_error(404, "NotFound", format!("{name} not found")))
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> kube::Result<Vec<K>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && matches_selector(obj.labels(), label_selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, obj: &K) -> kube::Result<K> {
        let key = (namespace.to_string(), obj.name_any());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists", format!("{} already exists", key.1)));
        }
        let mut created = obj.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        created.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, created.clone());
        self.mutated();
        Ok(created)
    }

    async fn replace(&self, namespace: &str, name: &str, obj: &K) -> kube::Result<K> {
        if self.conflicts.lock().unwrap().contains(name) {
            return Err(api_error(409, "Conflict", format!("{name} was modified")));
        }
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&key) else {
            return Err(api_error(404, "NotFound", format!("{name} not found")));
        };
        if obj.meta().resource_version != current.meta().resource_version {
            return Err(api_error(409, "Conflict", format!("{name} was modified")));
        }
        let mut replaced = obj.clone();
        replaced.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, replaced.clone());
        self.mutated();
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> kube::Result<()> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        match removed {
            Some(_) => {
                self.mutated();
                Ok(())
            }
            None => Err(api_error(404, "NotFound", format!("{name} not found"))),
        }
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: Value) -> kube::Result<K> {
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&key) else {
            return Err(api_error(404, "NotFound", format!("{name} not found")));
        };
        let mut json = serde_json::to_value(current).map_err(kube::Error::SerdeError)?;
        merge(&mut json, &patch);
        let patched: K = serde_json::from_value(json).map_err(kube::Error::SerdeError)?;
        objects.insert(key, patched.clone());
        self.mutated();
        Ok(patched)
    }
}

/// Control-plane fake remembering each call
#[derive(Default)]
pub struct RecordingControlPlane {
    pub registered: Mutex<Vec<GatewayDeclaration>>,
    pub dropped: Mutex<Vec<String>>,
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn register_gateway(&self, declaration: &GatewayDeclaration) -> Result<()> {
        self.registered.lock().unwrap().push(declaration.clone());
        Ok(())
    }

    async fn drop_gateway(&self, name: &str) -> Result<()> {
        self.dropped.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// A whole namespace held in memory, with one shared mutation counter
pub struct World {
    pub mutations: Arc<AtomicUsize>,
    pub facade_services: Arc<MemStore<FacadeService>>,
    pub gateways: Arc<MemStore<Gateway>>,
    pub deployments: Arc<MemStore<Deployment>>,
    pub services: Arc<MemStore<Service>>,
    pub config_maps: Arc<MemStore<ConfigMap>>,
    pub hpas: Arc<MemStore<HorizontalPodAutoscaler>>,
    pub pod_monitors: Arc<MemStore<PodMonitor>>,
    pub ingresses: Arc<MemStore<Ingress>>,
    pub legacy_ingresses: Arc<MemStore<LegacyIngress>>,
    pub routes: Arc<MemStore<Route>>,
    pub control_plane: Arc<RecordingControlPlane>,
    pub lock: Arc<NamedResourceLock>,
}

impl Default for World {
    fn default() -> Self {
        let mutations = Arc::new(AtomicUsize::new(0));
        Self {
            facade_services: MemStore::new(mutations.clone()),
            gateways: MemStore::new(mutations.clone()),
            deployments: MemStore::new(mutations.clone()),
            services: MemStore::new(mutations.clone()),
            config_maps: MemStore::new(mutations.clone()),
            hpas: MemStore::new(mutations.clone()),
            pod_monitors: MemStore::new(mutations.clone()),
            ingresses: MemStore::new(mutations.clone()),
            legacy_ingresses: MemStore::new(mutations.clone()),
            routes: MemStore::new(mutations.clone()),
            control_plane: Arc::new(RecordingControlPlane::default()),
            lock: NamedResourceLock::new(),
            mutations,
        }
    }
}

impl World {
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn stores(&self) -> Stores {
        Stores {
            facade_services: self.facade_services.clone(),
            gateways: self.gateways.clone(),
            deployments: self.deployments.clone(),
            services: self.services.clone(),
            config_maps: self.config_maps.clone(),
            hpas: self.hpas.clone(),
            pod_monitors: self.pod_monitors.clone(),
            ingresses: self.ingresses.clone(),
            legacy_ingresses: self.legacy_ingresses.clone(),
            routes: self.routes.clone(),
        }
    }

    pub fn reconciler(&self, config: OperatorConfig) -> CommonReconciler {
        CommonReconciler::new(
            Arc::new(config),
            self.stores(),
            self.control_plane.clone(),
            self.lock.clone(),
        )
    }

    pub fn add_cr(&self, cr: MeshGateway) {
        match cr {
            MeshGateway::FacadeService(fs) => self.facade_services.seed(fs),
            MeshGateway::Gateway(gw) => self.gateways.seed(gw),
        }
    }

    /// Publish the image the gateways run
    pub fn with_image(self, image: &str) -> Self {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some(common::CORE_GATEWAY_IMAGE_CONFIGMAP.to_string());
        cm.metadata.namespace = Some("ns".to_string());
        cm.data = Some(BTreeMap::from([("image".to_string(), image.to_string())]));
        self.config_maps.seed(cm);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "status": {"phase": "Updated", "x": 1}});
        merge(&mut target, &json!({"status": {"phase": "Updating", "x": null}}));
        assert_eq!(target, json!({"a": 1, "status": {"phase": "Updating"}}));
    }

    #[test]
    fn test_selector() {
        let labels = BTreeMap::from([("mesh-router".to_string(), "true".to_string())]);
        assert!(matches_selector(&labels, None));
        assert!(matches_selector(&labels, Some("mesh-router=true")));
        assert!(!matches_selector(&labels, Some("mesh-router=true,facadeGateway=true")));
    }
}
