use serde::Deserialize;

/// Root application configuration. Loaded from environment variables with
/// the prefix `BILLBOARD_FLEET__` and overridable per section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Base sweep interval. The health loop runs at 5x this interval and the
    /// analytics loop at 10x.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Bookings whose start is older than this are activated anyway but
    /// logged as late.
    #[serde(default = "default_activation_grace_secs")]
    pub activation_grace_secs: i64,
    /// How far ahead of `now` the upcoming-activations gauge counts
    /// confirmed bookings. The activation sweep itself only picks bookings
    /// whose start has passed.
    #[serde(default = "default_activation_lookahead_secs")]
    pub activation_lookahead_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Per-billboard cap on queued campaign payloads while offline. The
    /// oldest entry is dropped (with an alert) when the cap is reached.
    #[serde(default = "default_pending_queue_limit")]
    pub pending_queue_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Heartbeat age after which an online billboard is flipped offline.
    #[serde(default = "default_offline_threshold_secs")]
    pub offline_threshold_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    #[serde(default = "default_min_duration_mins")]
    pub min_duration_mins: i64,
    /// Calendar dates (YYYY-MM-DD, UTC) on which no booking may run.
    #[serde(default)]
    pub blackout_dates: Vec<chrono::NaiveDate>,
    /// Whether PENDING_PAYMENT bookings hold their slot in the conflict
    /// check. Enabled: a slot is held from creation until cancellation.
    #[serde(default = "default_include_pending")]
    pub include_pending_in_conflicts: bool,
}

/// Edge-agent configuration, used by the device binary rather than the
/// control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub server_url: String,
    pub billboard_id: String,
    pub api_key: String,
    #[serde(default = "default_content_dir")]
    pub content_dir: std::path::PathBuf,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    /// Disk budget for downloaded creatives; disk_usage telemetry is
    /// reported as a fraction of this.
    #[serde(default = "default_content_quota_bytes")]
    pub content_quota_bytes: u64,
    #[serde(default = "default_agent_version")]
    pub agent_version: String,
}

fn default_node_id() -> String {
    "fleet-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_tick_secs() -> u64 {
    60
}
fn default_activation_grace_secs() -> i64 {
    300
}
fn default_activation_lookahead_secs() -> i64 {
    60
}
fn default_pending_queue_limit() -> usize {
    64
}
fn default_offline_threshold_secs() -> i64 {
    300
}
fn default_min_duration_mins() -> i64 {
    60
}
fn default_include_pending() -> bool {
    true
}
fn default_content_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/var/lib/billboard-agent/content")
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_reconnect_secs() -> u64 {
    30
}
fn default_content_quota_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}
fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
            scheduler: SchedulerConfig::default(),
            fleet: FleetConfig::default(),
            monitoring: MonitoringConfig::default(),
            booking: BookingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            activation_grace_secs: default_activation_grace_secs(),
            activation_lookahead_secs: default_activation_lookahead_secs(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            pending_queue_limit: default_pending_queue_limit(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            offline_threshold_secs: default_offline_threshold_secs(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            min_duration_mins: default_min_duration_mins(),
            blackout_dates: Vec::new(),
            include_pending_in_conflicts: default_include_pending(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BILLBOARD_FLEET")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
