use crate::{NamespacedName, deployments::DeploymentClient, reconciler::Outcome, status::StatusUpdater};
use common::{MeshGateway, Result, gateway::GatewayPhase};
use k8s_openapi::api::apps::v1::Deployment;
use std::time::Duration;
use tracing::*;

pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// True when the status already reports an update of the current generation
pub fn is_updating_phase(req: &NamespacedName, cr: &MeshGateway) -> bool {
    let MeshGateway::Gateway(_) = cr else {
        return false;
    };
    let observed = cr.status().and_then(|s| s.observed_generation);
    if cr.generation() != observed {
        info!(
            "[{req}] CR status generation '{observed:?}', object generation '{:?}'",
            cr.generation()
        );
        return false;
    }
    info!("[{req}] Current phase {:?}", cr.phase());
    cr.phase() == Some(GatewayPhase::Updating)
}

fn is_ready(deployment: &Deployment) -> bool {
    let status = deployment.status.clone().unwrap_or_default();
    let replicas = status.replicas.unwrap_or(0);
    let ready = status.ready_replicas.unwrap_or(0);
    let unavailable = status.unavailable_replicas.unwrap_or(0);
    debug!(
        "Deployment {} replicas: '{replicas}', readyReplicas: '{ready}', unavailableReplicas: '{unavailable}'",
        deployment.metadata.name.as_deref().unwrap_or_default()
    );
    unavailable == 0 && replicas == ready
}

#[derive(Clone)]
pub struct ReadyService {
    deployments: DeploymentClient,
    status: StatusUpdater,
}

impl ReadyService {
    pub fn new(deployments: DeploymentClient, status: StatusUpdater) -> Self {
        Self { deployments, status }
    }

    /// Poll the gateway deployment of a `Gateway` until its replicas are all ready
    pub async fn check_deployment_ready(&self, req: &NamespacedName, cr: &MeshGateway) -> Result<Outcome> {
        let MeshGateway::Gateway(_) = cr else {
            return Ok(Outcome::Done);
        };
        info!("[{req}] Wait ready status");
        let name = cr.deployment_name();
        let Some(deployment) = self.deployments.get(req, &name).await? else {
            warn!("[{req}] Deployment '{name}' not found. Can not check ready status");
            return Ok(Outcome::RequeueAfter(READY_POLL_INTERVAL));
        };
        if !is_ready(&deployment) {
            info!("[{req}] Deployment still not ready");
            return Ok(Outcome::RequeueAfter(READY_POLL_INTERVAL));
        }
        info!("[{req}] Status ready");
        self.status.set_updated(cr).await?;
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::{World, body, facade_service, gateway};
    use common::gateway::GatewayStatus;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn deployment(name: &str, replicas: i32, ready: i32, unavailable: i32) -> Deployment {
        let mut d = Deployment::default();
        d.metadata.name = Some(name.into());
        d.metadata.namespace = Some("ns".into());
        d.status = Some(DeploymentStatus {
            replicas: Some(replicas),
            ready_replicas: Some(ready),
            unavailable_replicas: Some(unavailable),
            ..Default::default()
        });
        d
    }

    fn service(world: &World) -> ReadyService {
        let stores = world.stores();
        ReadyService::new(
            DeploymentClient::new(stores.deployments.clone()),
            StatusUpdater::new(stores.gateways.clone()),
        )
    }

    #[test]
    fn test_is_updating_phase() {
        let req = NamespacedName::new("ns", "gw");
        let mut cr = gateway("gw", body(None));
        assert!(!is_updating_phase(&req, &cr));
        if let MeshGateway::Gateway(gw) = &mut cr {
            gw.status = Some(GatewayStatus {
                observed_generation: Some(1),
                phase: Some(GatewayPhase::Updating),
            });
        }
        assert!(is_updating_phase(&req, &cr));
        if let MeshGateway::Gateway(gw) = &mut cr {
            gw.metadata.generation = Some(2);
        }
        assert!(!is_updating_phase(&req, &cr));
        assert!(!is_updating_phase(&req, &facade_service("fs", body(None))));
    }

    #[tokio::test]
    async fn test_waits_for_all_replicas() {
        let world = World::default();
        let req = NamespacedName::new("ns", "gw");
        let cr = gateway("gw", body(None));
        world.add_cr(cr.clone());
        let ready = service(&world);
        assert_eq!(
            ready.check_deployment_ready(&req, &cr).await.unwrap(),
            Outcome::RequeueAfter(READY_POLL_INTERVAL)
        );
        world.deployments.seed(deployment("gw-gateway", 2, 1, 1));
        assert_eq!(
            ready.check_deployment_ready(&req, &cr).await.unwrap(),
            Outcome::RequeueAfter(READY_POLL_INTERVAL)
        );
        world.deployments.seed(deployment("gw-gateway", 2, 2, 0));
        assert_eq!(ready.check_deployment_ready(&req, &cr).await.unwrap(), Outcome::Done);
        let status = world.gateways.find("ns", "gw").unwrap().status.unwrap();
        assert_eq!(status.phase, Some(GatewayPhase::Updated));
    }

    #[tokio::test]
    async fn test_facade_services_are_ready_at_once() {
        let world = World::default();
        let req = NamespacedName::new("ns", "fs");
        let cr = facade_service("fs", body(None));
        assert_eq!(service(&world).check_deployment_ready(&req, &cr).await.unwrap(), Outcome::Done);
    }
}
