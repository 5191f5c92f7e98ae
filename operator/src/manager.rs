use crate::{
    Metrics, facadeservice, gateway, imagesync::{self, ImageSync}, lock::NamedResourceLock,
    reconciler::CommonReconciler, store::Stores,
};
use chrono::{DateTime, Utc};
use common::{
    CORE_GATEWAY_IMAGE_CONFIGMAP, FacadeService, Gateway, Result,
    config::OperatorConfig,
    context::get_reporter,
    controlplane::ControlPlaneClient,
};
use futures::{FutureExt, Stream, StreamExt, future::BoxFuture};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    Resource,
    api::{Api, ListParams},
    client::Client,
    runtime::{
        WatchStreamExt,
        controller::{Config as ControllerConfig, Controller},
        events::Reporter,
        reflector, watcher,
        watcher::Config,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::hash_map::DefaultHasher,
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::*;

// Context for our reconcilers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Shared by the FacadeService and Gateway controllers
    pub reconciler: Arc<CommonReconciler>,
    pub image_sync: ImageSync,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: get_reporter(),
        }
    }
}

/// Data owned by the Manager
#[derive(Clone, Default)]
pub struct Manager {
    /// Diagnostics populated by the reconcilers
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Metrics,
}

/// Changes of generation, finalizers or deletion state; status-only updates hash the same
fn spec_or_lifecycle<K: Resource>(obj: &K) -> Option<u64> {
    let meta = obj.meta();
    let mut hasher = DefaultHasher::new();
    meta.generation.hash(&mut hasher);
    meta.finalizers.hash(&mut hasher);
    meta.deletion_timestamp.is_some().hash(&mut hasher);
    Some(hasher.finish())
}

fn filtered_stream<K>(api: Api<K>) -> (reflector::Store<K>, impl Stream<Item = Result<K, watcher::Error>>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, Config::default().any_semantic()))
        .default_backoff()
        .applied_objects()
        .predicate_filter(spec_or_lifecycle::<K>);
    (reader, stream)
}

/// Manager that owns the FacadeService, Gateway and image Controllers
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` that drives the `Controller`s + their futures to be awaited
    /// It is up to `main` to wait for the controller streams.
    pub async fn new(
        config: OperatorConfig,
    ) -> Result<(Self, BoxFuture<'static, ()>, BoxFuture<'static, ()>, BoxFuture<'static, ()>)> {
        let client = Client::try_default().await?;
        let manager = Manager::default();
        let config = Arc::new(config);
        let stores = Stores::kube(&client);
        let control_plane = Arc::new(ControlPlaneClient::new(&config.control_plane_url)?);
        let reconciler = CommonReconciler::new(config.clone(), stores.clone(), control_plane, NamedResourceLock::new());
        let context = Arc::new(Context {
            client: client.clone(),
            metrics: manager.metrics.clone(),
            diagnostics: manager.diagnostics.clone(),
            reconciler: Arc::new(reconciler),
            image_sync: ImageSync::new(&stores),
        });

        let ns = config.namespace.as_str();
        let facade_services = Api::<FacadeService>::namespaced(client.clone(), ns);
        let gateways = Api::<Gateway>::namespaced(client.clone(), ns);
        let config_maps = Api::<ConfigMap>::namespaced(client, ns);
        // Ensure CRDs are installed before loop-watching
        for res in [
            facade_services.list(&ListParams::default().limit(1)).await.map(|_| ()),
            gateways.list(&ListParams::default().limit(1)).await.map(|_| ()),
        ] {
            if let Err(e) = res {
                error!("is the crd installed? please run: cargo run --bin crdgen | kubectl apply -f -");
                return Err(e.into());
            }
        }
        info!("Watching namespace {ns} with {} concurrent reconciles", config.max_concurrent_reconciles);
        let controller_config = ControllerConfig::default().concurrency(config.max_concurrent_reconciles);

        let (reader, stream) = filtered_stream(facade_services);
        let controller_fs = Controller::for_stream(stream, reader)
            .with_config(controller_config.clone())
            .run(facadeservice::reconcile, facadeservice::error_policy, context.clone())
            .filter_map(|x| async move { std::result::Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .boxed();

        let (reader, stream) = filtered_stream(gateways);
        let controller_gw = Controller::for_stream(stream, reader)
            .with_config(controller_config)
            .run(gateway::reconcile, gateway::error_policy, context.clone())
            .filter_map(|x| async move { std::result::Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .boxed();

        let image_watch = Config::default().fields(&format!("metadata.name={CORE_GATEWAY_IMAGE_CONFIGMAP}"));
        let controller_img = Controller::new(config_maps, image_watch)
            .with_config(ControllerConfig::default().concurrency(1))
            .run(imagesync::reconcile, imagesync::error_policy, context)
            .filter_map(|x| async move { std::result::Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .boxed();

        Ok((manager, controller_fs, controller_gw, controller_img))
    }

    /// Metrics getter
    #[must_use]
    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.metrics.registry) {
            warn!("Can not encode metrics: {e}");
        }
        buffer
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}
