pub use controller::*;
use common::config::OperatorConfig;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Responder, get, middleware,
    web::Data,
};

#[get("/metrics")]
async fn metrics(c: Data<Manager>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(metrics)
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<Manager>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::from_env()?;

    // Setup tracing layers
    #[cfg(feature = "telemetry")]
    let telemetry = if config.tracing_enabled.eq_ignore_ascii_case("true") {
        let endpoint = format!("http://{}:4317", config.tracing_host);
        Some(tracing_opentelemetry::layer().with_tracer(telemetry::init_tracer(&endpoint).await?))
    } else {
        None
    };
    let logger = tracing_subscriber::fmt::layer();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.to_lowercase()))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::InitParamsValidation(format!("invalid log filter: {e}")))?;

    // Decide on layers
    #[cfg(feature = "telemetry")]
    let collector = Registry::default().with(telemetry).with(logger).with(env_filter);
    #[cfg(not(feature = "telemetry"))]
    let collector = Registry::default().with(logger).with(env_filter);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)
        .map_err(|e| Error::Unknown(format!("can not install the tracing subscriber: {e}")))?;

    // Start kubernetes controllers
    let (manager, controller_fs, controller_gw, controller_img) = Manager::new(config).await?;

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(manager.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind("0.0.0.0:9000")
    .map_err(|e| Error::Unknown(format!("Can not bind to 0.0.0.0:9000: {e}")))?
    .shutdown_timeout(5);

    tokio::select! {
        _ = controller_fs => tracing::warn!("FacadeService controller exited"),
        _ = controller_gw => tracing::warn!("Gateway controller exited"),
        _ = controller_img => tracing::warn!("Gateway image controller exited"),
        _ = server.run() => tracing::info!("actix exited"),
    }
    Ok(())
}
