use crate::{
    NamespacedName,
    crclient::CommonCrClient,
    deployments::{DeploymentClient, master_cr},
};
use common::{MeshGateway, Result, lastapplied::LastAppliedCr};
use tracing::*;

/// Decides whether a resource may overwrite a shared gateway deployment
#[derive(Clone)]
pub struct CrPriorityService {
    deployments: DeploymentClient,
    crs: CommonCrClient,
}

fn by_kind_priority(req: &NamespacedName, cr: &MeshGateway, previous: Option<&MeshGateway>) -> bool {
    match previous {
        Some(prev) if cr.priority() < prev.priority() => {
            info!(
                "[{req}] Current CR has lower priority '{}' than the last applied one '{}'",
                cr.priority(),
                prev.priority()
            );
            false
        }
        _ => true,
    }
}

fn master_by_kind_priority(req: &NamespacedName, cr: &MeshGateway, previous: Option<&MeshGateway>) -> bool {
    match previous {
        Some(prev) if cr.priority() <= prev.priority() => {
            info!(
                "[{req}] Another master CR has equal or lower priority '{}' than the last applied one '{}'",
                cr.priority(),
                prev.priority()
            );
            false
        }
        _ => true,
    }
}

impl CrPriorityService {
    pub fn new(deployments: DeploymentClient, crs: CommonCrClient) -> Self {
        Self { deployments, crs }
    }

    pub async fn update_available(&self, req: &NamespacedName, gateway_name: &str, cr: &MeshGateway) -> Result<bool> {
        let Some(deployment) = self.deployments.get(req, gateway_name).await? else {
            return Ok(true);
        };
        let master = master_cr(&deployment);
        let last = LastAppliedCr::from_deployment(&deployment)?;
        info!("[{req}] Found master CR name '{master:?}' and last applied CR '{last:?}'");
        let previous = self.crs.get_by_last_applied(req, last.as_ref()).await?;

        let Some(master) = master else {
            if cr.is_master() {
                return Ok(true);
            }
            return Ok(by_kind_priority(req, cr, previous.as_ref()));
        };

        let same_type = previous
            .as_ref()
            .is_none_or(|prev| prev.kind() == cr.kind());
        if master == cr.name() && same_type {
            return Ok(by_kind_priority(req, cr, previous.as_ref()));
        }

        info!("[{req}] Try to find master CR {master} for gateway {gateway_name}");
        if !self.crs.exists_by_name(req, &master).await? {
            info!("[{req}] Master CR label {master} exists on deployment {gateway_name}, but CR not found");
            return Ok(by_kind_priority(req, cr, previous.as_ref()));
        }
        if !cr.is_master() {
            info!(
                "[{req}] Non master configuration CR [{}] can not update deployment [{gateway_name}] with master CR [{master}]",
                cr.name()
            );
            return Ok(false);
        }
        Ok(master_by_kind_priority(req, cr, previous.as_ref()))
    }
}
