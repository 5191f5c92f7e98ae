use crate::{NamespacedName, resources::ResourceClient, store::Stores};
use common::{
    FacadeService, Gateway, MeshGateway, Result,
    facade::GatewayType,
    lastapplied::LastAppliedCr,
    meshgateway::MeshGatewayKind,
};
use tracing::*;

/// Lookups spanning both custom resource kinds
///
/// Resources already marked for deletion are treated as gone: their finalizer is the only
/// thing keeping them around.
#[derive(Clone)]
pub struct CommonCrClient {
    facade_services: ResourceClient<FacadeService>,
    gateways: ResourceClient<Gateway>,
}

fn alive(cr: MeshGateway) -> Option<MeshGateway> {
    (!cr.is_deleting()).then_some(cr)
}

impl CommonCrClient {
    pub fn new(stores: &Stores) -> Self {
        Self {
            facade_services: ResourceClient::new(stores.facade_services.clone(), "FacadeService"),
            gateways: ResourceClient::new(stores.gateways.clone(), "Gateway"),
        }
    }

    pub async fn get_all(&self, req: &NamespacedName) -> Result<Vec<MeshGateway>> {
        let facade_services = self.facade_services.list(req, None).await?;
        let gateways = self.gateways.list(req, None).await?;
        Ok(facade_services
            .into_iter()
            .map(MeshGateway::from)
            .chain(gateways.into_iter().map(MeshGateway::from))
            .filter_map(alive)
            .collect())
    }

    pub async fn get(&self, req: &NamespacedName, kind: MeshGatewayKind, name: &str) -> Result<Option<MeshGateway>> {
        let cr = match kind {
            MeshGatewayKind::FacadeService => self.facade_services.get(req, name).await?.map(MeshGateway::from),
            MeshGatewayKind::Gateway => self.gateways.get(req, name).await?.map(MeshGateway::from),
        };
        Ok(cr.and_then(alive))
    }

    /// Every resource of either kind carrying one of `names`
    pub async fn find_by_names(&self, req: &NamespacedName, names: &[String]) -> Result<Vec<MeshGateway>> {
        let mut found = Vec::new();
        for name in names {
            for kind in [MeshGatewayKind::FacadeService, MeshGatewayKind::Gateway] {
                if let Some(cr) = self.get(req, kind, name).await? {
                    found.push(cr);
                }
            }
        }
        Ok(found)
    }

    pub async fn exists_by_name(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        for kind in [MeshGatewayKind::FacadeService, MeshGatewayKind::Gateway] {
            if self.get(req, kind, name).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn find_ingress_gateways(&self, req: &NamespacedName) -> Result<Vec<MeshGateway>> {
        Ok(self
            .get_all(req)
            .await?
            .into_iter()
            .filter(|cr| cr.gateway_type() == GatewayType::Ingress)
            .collect())
    }

    /// The resource a LastAppliedCR record points at, if it still exists
    pub async fn get_by_last_applied(&self, req: &NamespacedName, last: Option<&LastAppliedCr>) -> Result<Option<MeshGateway>> {
        let Some(last) = last else {
            debug!("[{req}] No last applied CR to look up");
            return Ok(None);
        };
        let kind = MeshGatewayKind::resolve(last)?;
        let found = self.get(req, kind, &last.name).await?;
        if found.is_none() {
            info!("[{req}] CR not found by last applied CR {last:?}");
        }
        Ok(found)
    }
}
