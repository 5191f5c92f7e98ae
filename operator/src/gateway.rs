use crate::{Error, NamespacedName, Result, manager::Context, telemetry};
use chrono::Utc;
use common::{Gateway, MeshGateway};
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

pub static GATEWAY_FINALIZER: &str = "gateways.core.netcracker.com";

#[instrument(skip(ctx, gw), fields(trace_id))]
pub async fn reconcile(gw: Arc<Gateway>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _mes = ctx.metrics.gateway.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();
    let ns = gw.namespace().unwrap_or_default();
    let req = NamespacedName::new(&ns, &gw.name_any());
    info!("[{req}] Start processing kind=Gateway apiVersion=core.netcracker.com/v1");
    let api: Api<Gateway> = Api::namespaced(ctx.client.clone(), &ns);
    finalizer(&api, GATEWAY_FINALIZER, gw, |event| async {
        match event {
            Finalizer::Apply(gw) => {
                let cr = MeshGateway::from(gw.as_ref().clone());
                ctx.reconciler.reconcile(&req, Some(&cr)).await.map(Action::from)
            }
            Finalizer::Cleanup(_) => ctx.reconciler.cleanup(&req).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

#[must_use]
pub fn error_policy(gw: Arc<Gateway>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "reconcile failed for Gateway '{:?}.{:?}': {:?}",
        gw.metadata.namespace, gw.metadata.name, error
    );
    ctx.metrics.gateway.reconcile_failure(&gw.name_any(), error);
    if error.is_expected() {
        return Action::requeue(Duration::from_secs(1));
    }
    Action::requeue(Duration::from_secs(5))
}
