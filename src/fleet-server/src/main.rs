//! Billboard fleet control plane.
//!
//! Main entry point: wires the stores, fleet registry, booking lifecycle,
//! health monitoring, and scheduler together, then serves HTTP until
//! shutdown.

use billboard_api::{ApiServer, AppState};
use billboard_booking::{BookingLifecycleManager, BookingPolicy, SandboxGateway};
use billboard_core::config::AppConfig;
use billboard_core::store::{InMemoryBillboards, InMemoryBookings, InMemoryCampaigns};
use billboard_fleet::FleetConnectionRegistry;
use billboard_monitoring::{AlertManager, HealthMonitor};
use billboard_scheduler::CampaignScheduler;
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fleet-server")]
#[command(about = "Billboard fleet orchestration control plane")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "BILLBOARD_FLEET__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "BILLBOARD_FLEET__SERVER__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "BILLBOARD_FLEET__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Skip the background scheduler (API-only mode)
    #[arg(long, default_value_t = false)]
    api_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Billboard fleet control plane starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.server.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.server.http_port,
        metrics_port = config.metrics.port,
        tick_secs = config.scheduler.tick_secs,
        "Configuration loaded"
    );

    // Stores and shared services.
    let billboards = Arc::new(InMemoryBillboards::new());
    let bookings = Arc::new(InMemoryBookings::new());
    let campaigns = Arc::new(InMemoryCampaigns::new());
    let alerts = Arc::new(AlertManager::new());
    let fleet = Arc::new(FleetConnectionRegistry::new(
        billboards.clone(),
        campaigns.clone(),
        alerts.clone(),
        config.fleet.pending_queue_limit,
    ));
    let lifecycle = Arc::new(BookingLifecycleManager::new(
        bookings.clone(),
        campaigns.clone(),
        billboards.clone(),
        Arc::new(SandboxGateway),
        fleet.clone(),
        alerts.clone(),
        BookingPolicy::from_config(&config.booking),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        billboards.clone(),
        bookings.clone(),
        alerts.clone(),
        config.monitoring.offline_threshold_secs,
    ));

    let mut scheduler = CampaignScheduler::new(
        lifecycle.clone(),
        bookings.clone(),
        monitor,
        alerts.clone(),
        fleet.clone(),
        config.scheduler.clone(),
    );
    if cli.api_only {
        info!("Running in API-only mode (no scheduler)");
    } else {
        scheduler.start();
    }

    let state = AppState {
        billboards,
        lifecycle,
        fleet,
        alerts,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Fleet control plane is ready");

    tokio::select! {
        result = api_server.start_http() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    scheduler.stop().await;
    Ok(())
}
