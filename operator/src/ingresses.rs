use crate::{NamespacedName, crclient::CommonCrClient, resources::ResourceClient, store::Stores};
use common::{
    Result,
    config::{IngressFlavor, OperatorConfig},
    ingresskinds::{LegacyIngress, Route},
    templates::{
        ingress::{IngressTemplate, IngressTemplateBuilder, is_managed},
        managed_selector,
    },
};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::collections::HashSet;
use tracing::*;

/// Writes ingress templates as whatever object the cluster exposes hostnames with
#[derive(Clone)]
pub struct IngressClient {
    flavor: IngressFlavor,
    builder: IngressTemplateBuilder,
    ingresses: ResourceClient<Ingress>,
    legacy_ingresses: ResourceClient<LegacyIngress>,
    routes: ResourceClient<Route>,
    crs: CommonCrClient,
}

impl IngressClient {
    pub fn new(config: &OperatorConfig, stores: &Stores, crs: CommonCrClient) -> Self {
        Self {
            flavor: config.ingress_flavor(),
            builder: IngressTemplateBuilder::new(config),
            ingresses: ResourceClient::new(stores.ingresses.clone(), "Ingress"),
            legacy_ingresses: ResourceClient::new(stores.legacy_ingresses.clone(), "Ingress"),
            routes: ResourceClient::new(stores.routes.clone(), "Route"),
            crs,
        }
    }

    pub fn builder(&self) -> &IngressTemplateBuilder {
        &self.builder
    }

    pub async fn apply(&self, req: &NamespacedName, template: &IngressTemplate) -> Result<()> {
        match self.flavor {
            IngressFlavor::IngressV1 => self.ingresses.apply(req, template.build_ingress()).await,
            IngressFlavor::IngressV1Beta1 => self.legacy_ingresses.apply(req, template.build_legacy_ingress()).await,
            IngressFlavor::Route => self.routes.apply(req, template.build_route()).await,
        }
    }

    pub async fn delete(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        match self.flavor {
            IngressFlavor::IngressV1 => self.ingresses.delete(req, name).await,
            IngressFlavor::IngressV1Beta1 => self.legacy_ingresses.delete(req, name).await,
            IngressFlavor::Route => self.routes.delete(req, name).await,
        }
    }

    /// Names of the operator-managed objects currently in the namespace
    async fn managed_names(&self, req: &NamespacedName) -> Result<Vec<String>> {
        let selector = managed_selector();
        let names = match self.flavor {
            IngressFlavor::IngressV1 => self
                .ingresses
                .list(req, Some(&selector))
                .await?
                .into_iter()
                .filter(|i| is_managed(i.metadata.annotations.as_ref()))
                .map(|i| i.name_any())
                .collect(),
            IngressFlavor::IngressV1Beta1 => self
                .legacy_ingresses
                .list(req, Some(&selector))
                .await?
                .into_iter()
                .filter(|i| is_managed(i.metadata.annotations.as_ref()))
                .map(|i| i.name_any())
                .collect(),
            IngressFlavor::Route => self
                .routes
                .list(req, Some(&selector))
                .await?
                .into_iter()
                .filter(|i| is_managed(i.metadata.annotations.as_ref()))
                .map(|i| i.name_any())
                .collect(),
        };
        Ok(names)
    }

    /// Names every live ingress-type gateway declares
    async fn declared_names(&self, req: &NamespacedName) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for cr in self.crs.find_ingress_gateways(req).await? {
            let service_name = cr.gateway_service_name();
            for spec in &cr.spec().ingresses {
                let (name, _) = self.builder.build_name_and_port(spec, &cr, &service_name)?;
                names.insert(name);
            }
        }
        Ok(names)
    }

    /// Remove managed objects no gateway declares anymore
    pub async fn delete_orphaned(&self, req: &NamespacedName) -> Result<()> {
        let managed = self.managed_names(req).await?;
        if managed.is_empty() {
            return Ok(());
        }
        debug!("[{req}] Found {} ingresses managed by the operator", managed.len());
        let declared = self.declared_names(req).await?;
        for name in managed.iter().filter(|n| !declared.contains(*n)) {
            info!("[{req}] Delete orphaned ingress {name}");
            self.delete(req, name).await?;
        }
        Ok(())
    }
}
