use crate::store::ObjectStore;
use common::{Error, Gateway, MeshGateway, Result, gateway::GatewayPhase};
use serde_json::json;
use std::sync::Arc;
use tracing::*;

/// Publishes the phase of `Gateway` resources; the legacy kind has no status
#[derive(Clone)]
pub struct StatusUpdater {
    gateways: Arc<dyn ObjectStore<Gateway>>,
}

impl StatusUpdater {
    pub fn new(gateways: Arc<dyn ObjectStore<Gateway>>) -> Self {
        Self { gateways }
    }

    pub async fn set_updating(&self, cr: &MeshGateway) -> Result<()> {
        self.patch(cr, GatewayPhase::Updating).await
    }

    pub async fn set_updated(&self, cr: &MeshGateway) -> Result<()> {
        self.patch(cr, GatewayPhase::Updated).await
    }

    pub async fn set_fail(&self, cr: &MeshGateway) -> Result<()> {
        self.patch(cr, GatewayPhase::BackingOff).await
    }

    async fn patch(&self, cr: &MeshGateway, phase: GatewayPhase) -> Result<()> {
        let MeshGateway::Gateway(_) = cr else {
            return Ok(());
        };
        debug!("Set phase {phase:?} on Gateway {}/{}", cr.namespace(), cr.name());
        let patch = json!({
            "status": {
                "observedGeneration": cr.generation(),
                "phase": phase,
            }
        });
        self.gateways
            .patch_status(&cr.namespace(), &cr.name(), patch)
            .await
            .map(|_| ())
            .map_err(|e| Error::UnexpectedKubernetes("Unknown error while patching CR".to_string(), e))
    }
}
