//! Billboard edge agent.
//!
//! Runs on the display device: registers with the control plane, keeps the
//! WebSocket session alive, downloads and verifies campaign content, and
//! heartbeats telemetry.

use billboard_agent::EdgeAgent;
use billboard_core::config::AgentConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "edge-agent")]
#[command(about = "Billboard display device agent")]
#[command(version)]
struct Cli {
    /// Control plane base URL, e.g. https://fleet.example.com
    #[arg(long, env = "BILLBOARD_AGENT__SERVER_URL")]
    server_url: String,

    /// This device's billboard id
    #[arg(long, env = "BILLBOARD_AGENT__BILLBOARD_ID")]
    billboard_id: String,

    /// Per-device api key issued at provisioning
    #[arg(long, env = "BILLBOARD_AGENT__API_KEY")]
    api_key: String,

    /// Directory for downloaded campaign content
    #[arg(
        long,
        env = "BILLBOARD_AGENT__CONTENT_DIR",
        default_value = "/var/lib/billboard-agent/content"
    )]
    content_dir: PathBuf,

    /// Heartbeat interval in seconds
    #[arg(long, env = "BILLBOARD_AGENT__HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Reconnect backoff in seconds
    #[arg(long, env = "BILLBOARD_AGENT__RECONNECT_SECS", default_value_t = 30)]
    reconnect_secs: u64,

    /// Disk budget for content, in bytes
    #[arg(
        long,
        env = "BILLBOARD_AGENT__CONTENT_QUOTA_BYTES",
        default_value_t = 10 * 1024 * 1024 * 1024
    )]
    content_quota_bytes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = AgentConfig {
        server_url: cli.server_url,
        billboard_id: cli.billboard_id,
        api_key: cli.api_key,
        content_dir: cli.content_dir,
        heartbeat_secs: cli.heartbeat_secs,
        reconnect_secs: cli.reconnect_secs,
        content_quota_bytes: cli.content_quota_bytes,
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(
        billboard_id = %config.billboard_id,
        server_url = %config.server_url,
        content_dir = %config.content_dir.display(),
        "Edge agent starting"
    );

    let agent = EdgeAgent::new(config);
    agent.run().await;
    Ok(())
}
