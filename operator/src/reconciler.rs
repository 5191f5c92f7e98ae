use crate::{
    NamespacedName,
    configmaps::ConfigMapClient,
    crclient::CommonCrClient,
    deployments::{DeploymentClient, master_cr},
    ingresses::IngressClient,
    lock::NamedResourceLock,
    priority::CrPriorityService,
    ready::{READY_POLL_INTERVAL, ReadyService, is_updating_phase},
    resources::ResourceClient,
    services::ServiceClient,
    status::StatusUpdater,
    store::Stores,
};
use common::{
    Error, FACADE_GATEWAY_LABEL, GATEWAY_SUFFIX, INTERNAL_GATEWAY_SERVICE, MESH_ROUTER_LABEL, MeshGateway, Result,
    config::OperatorConfig,
    controlplane::{ControlPlane, GatewayDeclaration},
    facade::GatewayType,
    lastapplied::LastAppliedCr,
    podmonitor::PodMonitor,
    templates::{
        configmap::{monitoring_config_map, monitoring_config_map_name},
        deployment::RouterDeployment,
        hpa::HpaTemplateBuilder,
        podmonitor::{pod_monitor, pod_monitor_name},
        service::FacadeServiceTemplate,
    },
};
use futures::FutureExt;
use k8s_openapi::api::{apps::v1::Deployment, autoscaling::v2::HorizontalPodAutoscaler};
use kube::{ResourceExt, runtime::controller::Action};
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tracing::*;

/// What the controller should do once a reconcile went through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Requeue,
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::Requeue => Action::requeue(Duration::from_secs(1)),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Turns the declaration of one gateway resource into its children, for either kind
pub struct CommonReconciler {
    config: Arc<OperatorConfig>,
    lock: Arc<NamedResourceLock>,
    control_plane: Arc<dyn ControlPlane>,
    deployments: DeploymentClient,
    services: ServiceClient,
    config_maps: ConfigMapClient,
    hpas: ResourceClient<HorizontalPodAutoscaler>,
    pod_monitors: ResourceClient<PodMonitor>,
    ingresses: IngressClient,
    crs: CommonCrClient,
    priority: CrPriorityService,
    status: StatusUpdater,
    ready: ReadyService,
    hpa_builder: HpaTemplateBuilder,
}

impl CommonReconciler {
    pub fn new(
        config: Arc<OperatorConfig>,
        stores: Stores,
        control_plane: Arc<dyn ControlPlane>,
        lock: Arc<NamedResourceLock>,
    ) -> Self {
        let crs = CommonCrClient::new(&stores);
        let deployments = DeploymentClient::new(stores.deployments.clone());
        let status = StatusUpdater::new(stores.gateways.clone());
        Self {
            services: ServiceClient::new(stores.services.clone(), config.service_type),
            config_maps: ConfigMapClient::new(stores.config_maps.clone()),
            hpas: ResourceClient::new(stores.hpas.clone(), "HorizontalPodAutoscaler").tolerating_already_exists(),
            pod_monitors: ResourceClient::new(stores.pod_monitors.clone(), "PodMonitor").tolerating_already_exists(),
            ingresses: IngressClient::new(&config, &stores, crs.clone()),
            priority: CrPriorityService::new(deployments.clone(), crs.clone()),
            ready: ReadyService::new(deployments.clone(), status.clone()),
            hpa_builder: HpaTemplateBuilder::new(config.hpa.clone()),
            deployments,
            status,
            crs,
            config,
            lock,
            control_plane,
        }
    }

    async fn set_fail(&self, req: &NamespacedName, cr: Option<&MeshGateway>) {
        if let Some(cr) = cr {
            if let Err(e) = self.status.set_fail(cr).await {
                error!("[{req}] Can not update status on CR. Error: {e}");
            }
        }
    }

    /// Apply `cr`, or tear down what `req` left behind when it is `None`
    ///
    /// Runs under the lock of `req`. Races with other reconciles come back as [`Outcome::Requeue`],
    /// every other failure marks the `Gateway` as backing off.
    pub async fn reconcile(&self, req: &NamespacedName, cr: Option<&MeshGateway>) -> Result<Outcome> {
        info!("[{req}] Start reconcile");
        let _guard = self.lock.lock(&req.to_string()).await;
        let res = match AssertUnwindSafe(self.run(req, cr)).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!("[{req}] Found panic. Err: {reason}");
                self.set_fail(req, cr).await;
                return Ok(Outcome::RequeueAfter(READY_POLL_INTERVAL));
            }
        };
        match res {
            Ok(outcome) => {
                if outcome == Outcome::Done {
                    info!("[{req}] Reconcile done");
                } else {
                    info!("[{req}] Reconcile requeue");
                }
                Ok(outcome)
            }
            Err(e) if e.is_expected() => {
                warn!("[{req}] Found expected error. {e}");
                Ok(Outcome::Requeue)
            }
            Err(e) if e.is_coded() => {
                error!("[{req}] {}", e.to_log_format());
                self.set_fail(req, cr).await;
                Err(e)
            }
            Err(e) => {
                let e = Error::Unknown(format!("Unknown error: {e}"));
                error!("[{req}] {}", e.to_log_format());
                self.set_fail(req, cr).await;
                Err(e)
            }
        }
    }

    /// Tear down what `req` left behind; only a completed teardown lets its finalizer go
    pub async fn cleanup(&self, req: &NamespacedName) -> Result<Action> {
        match self.reconcile(req, None).await? {
            Outcome::Done => Ok(Action::await_change()),
            outcome => Err(Error::Expected(format!("cleanup of {req} not finished ({outcome:?})"))),
        }
    }

    async fn run(&self, req: &NamespacedName, cr: Option<&MeshGateway>) -> Result<Outcome> {
        self.delete_unused_mesh_routers(req).await?;
        match cr {
            Some(cr) => {
                if !is_updating_phase(req, cr) {
                    self.status.set_updating(cr).await?;
                }
                self.apply(req, cr).await?;
                self.ready.check_deployment_ready(req, cr).await
            }
            None => {
                self.delete(req).await?;
                Ok(Outcome::Done)
            }
        }
    }

    // ── Apply ────────────────────────────────────────────────────────────────

    async fn apply(&self, req: &NamespacedName, cr: &MeshGateway) -> Result<()> {
        info!("[{req}] Start apply facade service");
        let gateway_service_name = cr.gateway_service_name();
        let delegated = cr.spec().delegated_gateway().map(String::from);
        let _gateway_guard = match &delegated {
            Some(gateway) => Some(self.lock.lock(gateway).await),
            None => None,
        };
        info!("[{req}] Virtual service mode: {}", delegated.is_some());

        self.control_plane
            .register_gateway(&GatewayDeclaration::register(
                &gateway_service_name,
                cr.gateway_type(),
                cr.spec().allow_virtual_hosts,
            ))
            .await?;

        let image = match self.config_maps.gateway_image(req).await {
            Ok(Some(image)) => image,
            Ok(None) => return Err(Error::GatewayImage("gateway image is empty".to_string())),
            Err(e) => return Err(Error::GatewayImage(format!("gateway image is empty: {e}"))),
        };
        info!("[{req}] Frontend gateway image: {image}");

        match &delegated {
            Some(gateway) => {
                self.apply_mesh_router(req, gateway, &image, cr).await?;
                self.delete_facade_gateway(req, &format!("{}{GATEWAY_SUFFIX}", req.name))
                    .await?;
            }
            None => {
                self.apply_facade_gateway(req, &format!("{}{GATEWAY_SUFFIX}", req.name), &image, cr)
                    .await?
            }
        }
        self.apply_ingresses(req, &gateway_service_name, cr).await
    }

    async fn apply_mesh_router(&self, req: &NamespacedName, gateway: &str, image: &str, cr: &MeshGateway) -> Result<()> {
        info!("[{req}] Apply virtual service {}", req.name);
        self.apply_service(req, &req.name, gateway, cr).await?;

        let own_service = cr.gateway_type() == GatewayType::Mesh && req.name != INTERNAL_GATEWAY_SERVICE;
        if self.priority.update_available(req, gateway, cr).await? {
            let service_name = if own_service { gateway } else { req.name.as_str() };
            self.apply_deployment(req, service_name, gateway, image, cr, true).await?;
        } else {
            info!("[{req}] Deployment {gateway} is owned by a resource of higher priority, leaving it as is");
        }
        if own_service {
            info!("[{req}] Apply gateway service {gateway}");
            self.apply_service(req, gateway, gateway, cr).await?;
        }
        self.apply_monitoring(req, gateway, cr).await
    }

    async fn apply_facade_gateway(&self, req: &NamespacedName, gateway: &str, image: &str, cr: &MeshGateway) -> Result<()> {
        self.apply_service(req, &req.name, gateway, cr).await?;
        self.apply_deployment(req, &req.name, gateway, image, cr, false).await?;
        self.apply_monitoring(req, gateway, cr).await
    }

    async fn apply_service(&self, req: &NamespacedName, name: &str, gateway: &str, cr: &MeshGateway) -> Result<()> {
        let service = FacadeServiceTemplate {
            cr,
            name: name.to_string(),
            namespace: req.namespace.clone(),
            selector: gateway.to_string(),
            service_type: self.config.service_type,
        }
        .build();
        self.services.apply(req, service).await
    }

    async fn apply_deployment(
        &self,
        req: &NamespacedName,
        service_name: &str,
        gateway: &str,
        image: &str,
        cr: &MeshGateway,
        mesh_router: bool,
    ) -> Result<()> {
        let deployment = RouterDeployment {
            config: &self.config,
            cr,
            service_name: service_name.to_string(),
            gateway_name: gateway.to_string(),
            namespace: req.namespace.clone(),
            image: image.to_string(),
            mesh_router,
        };
        info!("[{req}] Instance label value: {}", deployment.instance_label());
        self.deployments.apply(req, deployment.build()?).await
    }

    async fn apply_monitoring(&self, req: &NamespacedName, gateway: &str, cr: &MeshGateway) -> Result<()> {
        self.config_maps
            .apply(req, monitoring_config_map(cr, gateway, &req.namespace))
            .await?;
        self.hpas
            .create(req, &self.hpa_builder.build(cr, gateway, &req.namespace))
            .await?;
        if self.config.monitoring_enabled {
            self.pod_monitors
                .create(req, &pod_monitor(cr, gateway, &req.namespace))
                .await?;
        }
        Ok(())
    }

    async fn apply_ingresses(&self, req: &NamespacedName, service_name: &str, cr: &MeshGateway) -> Result<()> {
        self.ingresses.delete_orphaned(req).await?;
        if cr.gateway_type() != GatewayType::Ingress {
            return Ok(());
        }
        for spec in &cr.spec().ingresses {
            let template = self.ingresses.builder().build(spec, cr, service_name)?;
            info!("[{req}] Applying ingress {spec:?}");
            self.ingresses.apply(req, &template).await?;
        }
        Ok(())
    }

    // ── Delete ───────────────────────────────────────────────────────────────

    async fn delete(&self, req: &NamespacedName) -> Result<()> {
        info!("[{req}] Start delete facade service");
        let gateway = format!("{}{GATEWAY_SUFFIX}", req.name);
        self.delete_service(req, &gateway).await?;
        self.delete_facade_gateway(req, &gateway).await?;
        self.ingresses.delete_orphaned(req).await?;
        self.control_plane.drop_gateway(&req.name).await?;
        info!("[{req}] Facade service deleted");
        Ok(())
    }

    /// Remove the service named after the request unless it fronts a deployment still in use
    async fn delete_service(&self, req: &NamespacedName, gateway: &str) -> Result<()> {
        let Some(service) = self.services.get(req, &req.name).await? else {
            debug!("[{req}] Facade service {} not found", req.name);
            return Ok(());
        };
        let selector = service
            .spec
            .as_ref()
            .and_then(|s| s.selector.as_ref())
            .and_then(|s| s.get("app"))
            .cloned()
            .unwrap_or_default();
        info!("[{req}] Facade service selector.app '{selector}'. Gateway name: '{gateway}'");
        if selector == gateway {
            self.services.delete(req, &req.name).await?;
            return Ok(());
        }
        info!("[{req}] Try to find mesh router for service");
        let delete = match self.deployments.get(req, &selector).await? {
            None => {
                info!("[{req}] Mesh router {selector} already deleted. Delete service {}", req.name);
                true
            }
            Some(deployment) => {
                let labels = deployment.labels();
                labels.get(FACADE_GATEWAY_LABEL).is_some_and(|v| v == "true")
                    && labels.get(MESH_ROUTER_LABEL).is_some_and(|v| v == "true")
            }
        };
        if delete {
            self.services.delete(req, &req.name).await?;
        } else {
            info!("[{req}] Found service {selector} but it is not mesh router");
        }
        Ok(())
    }

    async fn delete_monitoring(&self, req: &NamespacedName, gateway: &str) -> Result<()> {
        self.config_maps
            .delete(req, &monitoring_config_map_name(gateway))
            .await?;
        self.pod_monitors.delete(req, &pod_monitor_name(gateway)).await?;
        self.hpas.delete(req, gateway).await?;
        Ok(())
    }

    /// Remove the standalone gateway of a resource; shared mesh routers are left alone
    async fn delete_facade_gateway(&self, req: &NamespacedName, gateway: &str) -> Result<()> {
        if !self.deployments.is_facade_gateway(req, gateway).await? {
            return Ok(());
        }
        info!("[{req}] Start delete facade gateway {gateway}");
        self.deployments.delete(req, gateway).await?;
        self.delete_monitoring(req, gateway).await?;
        info!("[{req}] Facade gateway {gateway} deleted");
        Ok(())
    }

    // ── Mesh router garbage collection ──────────────────────────────────────

    async fn delete_unused_mesh_routers(&self, req: &NamespacedName) -> Result<()> {
        let routers = self.deployments.mesh_routers(req).await?;
        if routers.is_empty() {
            debug!("[{req}] No mesh router deployments");
            return Ok(());
        }
        let crs = self.crs.get_all(req).await?;
        let mut unused = Vec::new();
        let mut masterless = Vec::new();
        for router in &routers {
            let name = router.name_any();
            let used = crs.iter().any(|cr| cr.spec().delegated_gateway() == Some(name.as_str()));
            if !used {
                unused.push(name);
                continue;
            }
            self.cleanup_last_applied(req, router).await?;
            let label = master_cr(router);
            let has_master = crs
                .iter()
                .any(|cr| cr.is_master() && label.as_deref() == Some(cr.name().as_str()));
            if !has_master {
                masterless.push(name);
            }
        }
        for name in &unused {
            self.delete_mesh_router(req, name).await?;
        }
        for name in &masterless {
            self.deployments.delete_master_cr_label(req, name).await?;
        }
        debug!("[{req}] Done delete not used mesh routers");
        Ok(())
    }

    /// Flag the LastAppliedCR of a router as deleted once that resource is gone
    async fn cleanup_last_applied(&self, req: &NamespacedName, router: &Deployment) -> Result<()> {
        let Some(mut last) = LastAppliedCr::from_deployment(router)? else {
            debug!("[{req}] No last applied CR on deployment {}", router.name_any());
            return Ok(());
        };
        if last.deleted {
            return Ok(());
        }
        if self.crs.get_by_last_applied(req, Some(&last)).await?.is_some() {
            return Ok(());
        }
        info!("[{req}] Last applied CR {last:?} not found. Update deployment annotation");
        last.deleted = true;
        self.deployments
            .set_last_applied(req, &router.name_any(), &last)
            .await
    }

    async fn delete_mesh_router(&self, req: &NamespacedName, name: &str) -> Result<()> {
        info!("[{req}] Delete not used mesh router {name}");
        self.services.delete(req, name).await?;
        self.deployments.delete(req, name).await?;
        self.delete_monitoring(req, name).await
    }
}
