use crate::{Error, NamespacedName, Result, manager::Context, telemetry};
use chrono::Utc;
use common::{FacadeService, MeshGateway};
use kube::{
    ResourceExt,
    api::Api,
    runtime::{
        controller::Action,
        finalizer::{Event as Finalizer, finalizer},
    },
};
use std::{sync::Arc, time::Duration};
use tracing::{Span, field, info, instrument, warn};

pub static FACADE_SERVICE_FINALIZER: &str = "facadeservices.netcracker.com";

#[instrument(skip(ctx, fs), fields(trace_id))]
pub async fn reconcile(fs: Arc<FacadeService>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _mes = ctx.metrics.facade_service.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();
    let ns = fs.namespace().unwrap_or_default();
    let req = NamespacedName::new(&ns, &fs.name_any());
    info!("[{req}] Start processing kind=FacadeService apiVersion=netcracker.com/v1alpha");
    let api: Api<FacadeService> = Api::namespaced(ctx.client.clone(), &ns);
    finalizer(&api, FACADE_SERVICE_FINALIZER, fs, |event| async {
        match event {
            Finalizer::Apply(fs) => {
                let cr = MeshGateway::from(fs.as_ref().clone());
                ctx.reconciler.reconcile(&req, Some(&cr)).await.map(Action::from)
            }
            Finalizer::Cleanup(_) => ctx.reconciler.cleanup(&req).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

#[must_use]
pub fn error_policy(fs: Arc<FacadeService>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "reconcile failed for FacadeService '{:?}.{:?}': {:?}",
        fs.metadata.namespace, fs.metadata.name, error
    );
    ctx.metrics.facade_service.reconcile_failure(&fs.name_any(), error);
    if error.is_expected() {
        return Action::requeue(Duration::from_secs(1));
    }
    Action::requeue(Duration::from_secs(5))
}
