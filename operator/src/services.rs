use crate::{NamespacedName, resources::ResourceClient, store::ObjectStore};
use common::{Result, config::ServiceType, templates::service::matches_service_type};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::*;

#[derive(Clone)]
pub struct ServiceClient {
    client: ResourceClient<Service>,
    service_type: ServiceType,
}

impl ServiceClient {
    pub fn new(store: Arc<dyn ObjectStore<Service>>, service_type: ServiceType) -> Self {
        Self {
            client: ResourceClient::new(store, "Service"),
            service_type,
        }
    }

    pub async fn get(&self, req: &NamespacedName, name: &str) -> Result<Option<Service>> {
        self.client.get(req, name).await
    }

    /// Create or update; a service of the wrong type is recreated since the cluster IP is immutable
    pub async fn apply(&self, req: &NamespacedName, mut service: Service) -> Result<()> {
        let name = service.name_any();
        let Some(existing) = self.get(req, &name).await? else {
            return self.client.create(req, &service).await;
        };
        if !matches_service_type(&existing, self.service_type) {
            info!("[{req}] Service {name} has wrong type, expected {:?}; recreating", self.service_type);
            self.client.delete(req, &name).await?;
            return self.client.create(req, &service).await;
        }
        if let (Some(spec), Some(current)) = (service.spec.as_mut(), existing.spec.as_ref()) {
            spec.cluster_ip = current.cluster_ip.clone();
            spec.cluster_ips = current.cluster_ips.clone();
        }
        self.client.update(req, &existing, service).await
    }

    pub async fn delete(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        self.client.delete(req, name).await
    }
}
