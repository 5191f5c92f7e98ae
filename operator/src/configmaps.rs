use crate::{NamespacedName, resources::ResourceClient, store::ObjectStore};
use common::{CORE_GATEWAY_IMAGE_CONFIGMAP, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use std::sync::Arc;
use tracing::*;

#[derive(Clone)]
pub struct ConfigMapClient {
    client: ResourceClient<ConfigMap>,
}

impl ConfigMapClient {
    pub fn new(store: Arc<dyn ObjectStore<ConfigMap>>) -> Self {
        Self {
            client: ResourceClient::new(store, "ConfigMap").tolerating_already_exists(),
        }
    }

    pub async fn apply(&self, req: &NamespacedName, cm: ConfigMap) -> Result<()> {
        self.client.apply(req, cm).await
    }

    pub async fn delete(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        self.client.delete(req, name).await
    }

    /// Image published in the `core-gateway-image` config map of the request namespace
    pub async fn gateway_image(&self, req: &NamespacedName) -> Result<Option<String>> {
        let Some(cm) = self.client.get(req, CORE_GATEWAY_IMAGE_CONFIGMAP).await? else {
            warn!("[{req}] ConfigMap {CORE_GATEWAY_IMAGE_CONFIGMAP} not found");
            return Ok(None);
        };
        Ok(cm
            .data
            .and_then(|mut d| d.remove("image"))
            .filter(|i| !i.is_empty() && i != "null"))
    }
}
