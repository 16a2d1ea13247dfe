//! API server wiring: routes, middleware, and the metrics exporter.

use crate::rest::AppState;
use crate::{device, rest};
use axum::routing::{get, post};
use axum::Router;
use billboard_core::config::AppConfig;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

/// Full route table. Device routes skip compression so nothing sits between
/// the WebSocket upgrade and the socket.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/v1/billboards",
            post(rest::provision_billboard).get(rest::list_online_billboards),
        )
        .route("/v1/billboards/:id", get(rest::get_billboard))
        .route("/v1/bookings", post(rest::create_booking))
        .route("/v1/bookings/:id", get(rest::get_booking))
        .route("/v1/bookings/:id/confirm", post(rest::confirm_payment))
        .route("/v1/bookings/:id/activate", post(rest::activate_booking))
        .route("/v1/bookings/:id/complete", post(rest::complete_booking))
        .route("/v1/bookings/:id/cancel", post(rest::cancel_booking))
        .route("/v1/alerts", get(rest::list_alerts))
        .route("/v1/alerts/:id/acknowledge", post(rest::acknowledge_alert))
        .route("/v1/alerts/:id/resolve", post(rest::resolve_alert))
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let device = Router::new()
        .route("/billboard/register", post(device::register_device))
        .route("/billboard/:id/connect", get(device::connect_device));

    Router::new()
        .merge(api)
        .merge(device)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP server; runs until the process exits.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let addr = SocketAddr::new(
            self.config.server.host.parse()?,
            self.config.server.http_port,
        );

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Start the Prometheus exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.server.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
