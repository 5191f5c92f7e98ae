use crate::{
    NamespacedName,
    configmaps::ConfigMapClient,
    deployments::DeploymentClient,
    manager::Context,
    store::{ObjectStore, Stores, is_conflict},
    telemetry,
};
use chrono::Utc;
use common::{Error, Result};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::ConfigMap};
use kube::{ResourceExt, runtime::controller::Action};
use std::{sync::Arc, time::Duration};
use tracing::{Span, debug, field, info, instrument, warn};

/// Rolls the image of `core-gateway-image` out to every facade gateway of the namespace
#[derive(Clone)]
pub struct ImageSync {
    config_maps: ConfigMapClient,
    deployments: DeploymentClient,
    store: Arc<dyn ObjectStore<Deployment>>,
}

impl ImageSync {
    pub fn new(stores: &Stores) -> Self {
        Self {
            config_maps: ConfigMapClient::new(stores.config_maps.clone()),
            deployments: DeploymentClient::new(stores.deployments.clone()),
            store: stores.deployments.clone(),
        }
    }

    pub async fn sync(&self, req: &NamespacedName) -> Result<()> {
        info!("[{req}] Start sync images");
        let image = match self.config_maps.gateway_image(req).await {
            Ok(Some(image)) => image,
            Ok(None) => return Err(Error::GatewayImage("Failed to get image: gateway image is empty".to_string())),
            Err(e) => return Err(Error::GatewayImage(format!("Failed to get image: {e}"))),
        };
        let gateways = match self.deployments.facade_gateways(req).await {
            Ok(list) => list,
            Err(Error::UnexpectedKubernetes(_, e)) => {
                return Err(Error::UpdateImageKubernetes(
                    "Failed to get facade gateway deployments".to_string(),
                    e,
                ));
            }
            Err(e) => return Err(e),
        };

        let mut conflicted = false;
        for mut deployment in gateways {
            let name = deployment.name_any();
            let Some(container) = deployment
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut())
                .and_then(|s| s.containers.first_mut())
            else {
                continue;
            };
            if container.image.as_deref() == Some(image.as_str()) {
                continue;
            }
            info!(
                "[{req}] Update image {name}. Old image: {:?}. New image: {image}",
                container.image
            );
            container.image = Some(image.clone());
            match self.store.replace(&req.namespace, &name, &deployment).await {
                Ok(_) => {}
                Err(e) if is_conflict(&e) => {
                    debug!("[{req}] Can not update image on {name}. Error: {e}");
                    conflicted = true;
                }
                Err(e) => {
                    return Err(Error::UpdateImageKubernetes(
                        format!("Failed to update Deployment: {name}"),
                        e,
                    ));
                }
            }
        }
        if conflicted {
            debug!("[{req}] Conflict error found");
            return Err(Error::Expected(format!("conflict while updating images of {req}")));
        }
        info!("[{req}] Done sync images");
        Ok(())
    }
}

#[instrument(skip(ctx, cm), fields(trace_id))]
pub async fn reconcile(cm: Arc<ConfigMap>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _mes = ctx.metrics.image_sync.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();
    let req = NamespacedName::new(&cm.namespace().unwrap_or_default(), &cm.name_any());
    match ctx.image_sync.sync(&req).await {
        Ok(()) => Ok(Action::await_change()),
        Err(e) if e.is_expected() => Ok(Action::requeue(Duration::from_secs(1))),
        Err(e) if e.is_coded() => {
            tracing::error!("[{req}] {}", e.to_log_format());
            Err(e)
        }
        Err(e) => Err(Error::Unknown(format!("Unknown error: {e}"))),
    }
}

#[must_use]
pub fn error_policy(cm: Arc<ConfigMap>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "image sync failed for ConfigMap '{:?}.{:?}': {:?}",
        cm.metadata.namespace, cm.metadata.name, error
    );
    ctx.metrics.image_sync.reconcile_failure(&cm.name_any(), error);
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::World;
    use common::FACADE_GATEWAY_LABEL;
    use k8s_openapi::api::{
        apps::v1::DeploymentSpec,
        core::v1::{Container, PodSpec, PodTemplateSpec},
    };
    use std::collections::BTreeMap;

    fn facade_gateway(name: &str, image: &str, facade: bool) -> Deployment {
        let mut d = Deployment::default();
        d.metadata.name = Some(name.into());
        d.metadata.namespace = Some("ns".into());
        d.metadata.labels = Some(BTreeMap::from([(
            FACADE_GATEWAY_LABEL.to_string(),
            facade.to_string(),
        )]));
        d.spec = Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.into(),
                        image: Some(image.into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        });
        d
    }

    fn image_of(world: &World, name: &str) -> Option<String> {
        world
            .deployments
            .find("ns", name)
            .and_then(|d| d.spec)
            .and_then(|s| s.template.spec)
            .and_then(|s| s.containers[0].image.clone())
    }

    fn req() -> NamespacedName {
        NamespacedName::new("ns", common::CORE_GATEWAY_IMAGE_CONFIGMAP)
    }

    #[tokio::test]
    async fn test_only_facade_gateways_are_updated() {
        let world = World::default().with_image("gw:2");
        world.deployments.seed(facade_gateway("a-gateway", "gw:1", true));
        world.deployments.seed(facade_gateway("b-gateway", "gw:2", true));
        world.deployments.seed(facade_gateway("other", "gw:1", false));
        ImageSync::new(&world.stores()).sync(&req()).await.unwrap();
        assert_eq!(image_of(&world, "a-gateway").as_deref(), Some("gw:2"));
        assert_eq!(image_of(&world, "other").as_deref(), Some("gw:1"));
        assert_eq!(world.mutations(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_finish_the_pass_then_requeue() {
        let world = World::default().with_image("gw:2");
        world.deployments.seed(facade_gateway("a-gateway", "gw:1", true));
        world.deployments.seed(facade_gateway("b-gateway", "gw:1", true));
        world.deployments.conflict_on("a-gateway");
        let err = ImageSync::new(&world.stores()).sync(&req()).await.unwrap_err();
        assert!(err.is_expected());
        assert_eq!(image_of(&world, "b-gateway").as_deref(), Some("gw:2"));
    }

    #[tokio::test]
    async fn test_missing_image_is_coded() {
        let world = World::default();
        let err = ImageSync::new(&world.stores()).sync(&req()).await.unwrap_err();
        assert_eq!(err.code(), Some(common::GATEWAY_IMAGE_ERROR));
    }
}
