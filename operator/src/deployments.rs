use crate::{NamespacedName, resources::ResourceClient, store::ObjectStore};
use common::{FACADE_GATEWAY_LABEL, LAST_APPLIED_CR_ANNOTATION, MASTER_CR_LABEL, MESH_ROUTER_LABEL, Result, lastapplied::LastAppliedCr};
use k8s_openapi::api::apps::v1::Deployment;
use std::{collections::BTreeMap, sync::Arc};
use tracing::*;

fn template_labels(deployment: &Deployment) -> Option<&BTreeMap<String, String>> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
}

fn label<'a>(labels: Option<&'a BTreeMap<String, String>>, key: &str) -> Option<&'a str> {
    labels.and_then(|l| l.get(key)).map(String::as_str).filter(|v| !v.is_empty())
}

/// `masterCR` of the deployment itself, else of its pod template
pub fn master_cr(deployment: &Deployment) -> Option<String> {
    label(deployment.metadata.labels.as_ref(), MASTER_CR_LABEL)
        .or_else(|| label(template_labels(deployment), MASTER_CR_LABEL))
        .map(String::from)
}

/// `key=true` on the deployment or on its pod template
pub fn has_true_label(deployment: &Deployment, key: &str) -> bool {
    label(deployment.metadata.labels.as_ref(), key) == Some("true") || label(template_labels(deployment), key) == Some("true")
}

#[derive(Clone)]
pub struct DeploymentClient {
    client: ResourceClient<Deployment>,
}

impl DeploymentClient {
    pub fn new(store: Arc<dyn ObjectStore<Deployment>>) -> Self {
        Self {
            client: ResourceClient::new(store, "Deployment"),
        }
    }

    pub async fn get(&self, req: &NamespacedName, name: &str) -> Result<Option<Deployment>> {
        self.client.get(req, name).await
    }

    pub async fn apply(&self, req: &NamespacedName, deployment: Deployment) -> Result<()> {
        self.client.apply(req, deployment).await
    }

    pub async fn replace(&self, req: &NamespacedName, deployment: &Deployment) -> Result<()> {
        self.client.replace(req, deployment).await
    }

    pub async fn delete(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        self.client.delete(req, name).await
    }

    pub async fn mesh_routers(&self, req: &NamespacedName) -> Result<Vec<Deployment>> {
        self.client.list(req, Some(&format!("{MESH_ROUTER_LABEL}=true"))).await
    }

    pub async fn facade_gateways(&self, req: &NamespacedName) -> Result<Vec<Deployment>> {
        self.client.list(req, Some(&format!("{FACADE_GATEWAY_LABEL}=true"))).await
    }

    /// Rewrite the LastAppliedCR annotation of an existing deployment
    pub async fn set_last_applied(&self, req: &NamespacedName, name: &str, last: &LastAppliedCr) -> Result<()> {
        let Some(mut deployment) = self.get(req, name).await? else {
            return Ok(());
        };
        info!("[{req}] Mark deleted last applied CR on Deployment {name}");
        deployment
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(LAST_APPLIED_CR_ANNOTATION.to_string(), last.to_json()?);
        self.replace(req, &deployment).await
    }

    /// Strip `masterCR` from the deployment and its pod template
    pub async fn delete_master_cr_label(&self, req: &NamespacedName, name: &str) -> Result<()> {
        let Some(mut deployment) = self.get(req, name).await? else {
            return Ok(());
        };
        if master_cr(&deployment).is_none() {
            debug!("[{req}] Deployment {name} has no master CR label");
            return Ok(());
        }
        info!("[{req}] Delete master CR label on Deployment {name}");
        if let Some(labels) = deployment.metadata.labels.as_mut() {
            labels.remove(MASTER_CR_LABEL);
        }
        if let Some(labels) = deployment
            .spec
            .as_mut()
            .and_then(|s| s.template.metadata.as_mut())
            .and_then(|m| m.labels.as_mut())
        {
            labels.remove(MASTER_CR_LABEL);
        }
        self.replace(req, &deployment).await
    }

    /// A standalone gateway of one CR, as opposed to a shared mesh router
    pub async fn is_facade_gateway(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        let Some(deployment) = self.get(req, name).await? else {
            debug!("[{req}] Facade gateway {name} not found");
            return Ok(false);
        };
        if has_true_label(&deployment, MESH_ROUTER_LABEL) {
            info!("[{req}] {name} is composite gateway");
            return Ok(false);
        }
        Ok(has_true_label(&deployment, FACADE_GATEWAY_LABEL))
    }
}
