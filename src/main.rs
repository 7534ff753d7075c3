//! Threat Detection Service
//!
//! This is the main entry point for the threat detection service.
//! It initializes the detection engine, starts the housekeeper, and
//! exposes the engine over an HTTP API.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;

use threat_detection_service::api::{self, ApiState};
use threat_detection_service::config;
use threat_detection_service::core::reputation::{
    HttpReputationProvider, ReputationProvider, StaticReputationProvider,
};
use threat_detection_service::core::sink::{EventSink, HttpEventSink, NoopEventSink};
use threat_detection_service::core::{Engine, Housekeeper};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting threat detection service...");

    // Load configuration
    let config = config::load_config().context("failed to load configuration")?;

    if let Err(e) = PrometheusBuilder::new().install() {
        warn!("Prometheus exporter not started: {}", e);
    }

    let provider: Arc<dyn ReputationProvider> = match &config.reputation.endpoint {
        Some(endpoint) => Arc::new(
            HttpReputationProvider::new(
                endpoint.clone(),
                Duration::from_millis(config.reputation.timeout_ms),
            )
            .context("failed to build reputation client")?,
        ),
        None => {
            info!("no reputation endpoint configured, using the static stub provider");
            Arc::new(StaticReputationProvider::new())
        }
    };

    let sink: Arc<dyn EventSink> = match &config.sink.endpoint {
        Some(endpoint) => Arc::new(
            HttpEventSink::new(
                endpoint.clone(),
                Duration::from_millis(config.sink.timeout_ms),
            )
            .context("failed to build event sink client")?,
        ),
        None => Arc::new(NoopEventSink),
    };

    let engine = Arc::new(Engine::new(&config, provider, sink));

    let housekeeper = Housekeeper::new(
        Arc::clone(&engine),
        Duration::from_secs(config.housekeeping.interval_seconds),
    );
    let housekeeper_handle = housekeeper.start();

    let state = web::Data::new(ApiState {
        engine: Arc::clone(&engine),
    });

    // Start HTTP server
    let result = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::config))
        .bind((config.server.host.as_str(), config.server.port))
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?
        .run()
        .await;

    housekeeper_handle.abort();
    Ok(result?)
}
