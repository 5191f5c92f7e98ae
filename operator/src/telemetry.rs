use opentelemetry::trace::TraceId;

/// Trace id of the current span, `TraceId::INVALID` when no exporter is attached
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

/// OTLP exporter towards `endpoint`, e.g. `http://jaeger-collector:4317`
#[cfg(feature = "telemetry")]
pub async fn init_tracer(endpoint: &str) -> common::Result<opentelemetry::sdk::trace::Tracer> {
    use common::{Error, OPERATOR_NAME};

    let channel = tonic::transport::Channel::from_shared(endpoint.to_string())
        .map_err(|e| Error::InitParamsValidation(format!("invalid tracing endpoint {endpoint}: {e}")))?
        .connect()
        .await
        .map_err(|e| Error::Unknown(format!("can not reach tracing collector {endpoint}: {e}")))?;

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_channel(channel))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                OPERATOR_NAME,
            )]),
        ))
        .install_batch(opentelemetry::runtime::Tokio)
        .map_err(|e| Error::Unknown(format!("can not install tracer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trace_without_exporter() {
        assert_eq!(get_trace_id(), TraceId::INVALID);
    }
}
