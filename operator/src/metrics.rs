use crate::Error;
use opentelemetry::trace::TraceId;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, exemplar::HistogramWithExemplars, family::Family},
    registry::{Registry, Unit},
};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub facade_service: ReconcileMetrics,
    pub gateway: ReconcileMetrics,
    pub image_sync: ReconcileMetrics,
    pub registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        let facade_service =
            ReconcileMetrics::default().register(registry.sub_registry_with_prefix("facade_service_reconcile"));
        let gateway = ReconcileMetrics::default().register(registry.sub_registry_with_prefix("gateway_reconcile"));
        let image_sync =
            ReconcileMetrics::default().register(registry.sub_registry_with_prefix("image_sync_reconcile"));
        Self {
            registry: Arc::new(registry),
            facade_service,
            gateway,
            image_sync,
        }
    }
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct TraceLabel {
    pub trace_id: String,
}
impl TryFrom<&TraceId> for TraceLabel {
    type Error = Error;

    fn try_from(id: &TraceId) -> Result<TraceLabel, Error> {
        if std::matches!(id, &TraceId::INVALID) {
            Err(Error::Unknown("Invalid trace ID".to_string()))
        } else {
            let trace_id = id.to_string();
            Ok(Self { trace_id })
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

/// Runs, failures and durations of one controller
#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: HistogramWithExemplars<TraceLabel>,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Counter::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            duration: HistogramWithExemplars::new([0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.].into_iter()),
        }
    }
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn reconcile_failure(&self, instance: &str, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: instance.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self, trace_id: &TraceId) -> ReconcileMeasurer {
        self.runs.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            labels: trace_id.try_into().ok(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    labels: Option<TraceLabel>,
    metric: HistogramWithExemplars<TraceLabel>,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        let labels = self.labels.take();
        self.metric.observe(duration, labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_labelled_by_code() {
        let metrics = Metrics::default();
        {
            let _mes = metrics.gateway.count_and_measure(&TraceId::INVALID);
        }
        metrics
            .gateway
            .reconcile_failure("gw", &Error::GatewayImage("gateway image is empty".to_string()));
        assert_eq!(metrics.gateway.runs.get(), 1);
        assert_eq!(metrics.facade_service.runs.get(), 0);

        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &metrics.registry).unwrap();
        assert!(out.contains("gateway_reconcile_runs_total 1"));
        assert!(out.contains(r#"instance="gw",error="core-mesh-op-2004""#));
    }
}
