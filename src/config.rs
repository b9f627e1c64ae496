use clap::{Args, Parser, ValueEnum};
use ipnetwork::IpNetwork;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub presence: PresenceConfig,

    #[command(flatten)]
    pub notifications: NotificationConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(id = "database_url", long = "database-url", env = "EPHEMERA_DATABASE_URL")]
    pub url: String,

    /// Maximum number of pooled connections
    #[arg(long, env = "EPHEMERA_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle pooled connections
    #[arg(long, env = "EPHEMERA_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    #[arg(long, env = "EPHEMERA_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    #[arg(long, env = "EPHEMERA_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "EPHEMERA_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "EPHEMERA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long, env = "EPHEMERA_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for liveness/readiness probes
    #[arg(long, env = "EPHEMERA_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks after the listeners stop
    #[arg(long, env = "EPHEMERA_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Comma-separated list of CIDRs to trust for X-Forwarded-For IP extraction
    #[arg(
        long,
        env = "EPHEMERA_TRUSTED_PROXIES",
        default_value = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32",
        value_delimiter = ','
    )]
    pub trusted_proxies: Vec<IpNetwork>,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key used to verify session JWTs
    #[arg(long, env = "EPHEMERA_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client IP
    #[arg(long, env = "EPHEMERA_RATE_LIMIT_PER_SECOND", default_value_t = 20)]
    pub per_second: u32,

    /// Burst allowance per client IP
    #[arg(long, env = "EPHEMERA_RATE_LIMIT_BURST", default_value_t = 40)]
    pub burst: u32,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Days a message lives before it is purged
    #[arg(long, env = "EPHEMERA_TTL_DAYS", default_value_t = 7)]
    pub ttl_days: i64,

    /// Maximum length of a text message in characters
    #[arg(long, env = "EPHEMERA_MAX_CONTENT_LENGTH", default_value_t = 4000)]
    pub max_content_length: usize,

    /// Default page size for room history
    #[arg(long, env = "EPHEMERA_HISTORY_PAGE_SIZE", default_value_t = 50)]
    pub history_page_size: i64,

    /// Upper bound for a client-requested history page
    #[arg(long, env = "EPHEMERA_HISTORY_MAX_PAGE_SIZE", default_value_t = 200)]
    pub history_max_page_size: i64,

    /// How often to purge expired messages
    #[arg(long, env = "EPHEMERA_CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub cleanup_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the outbound frame buffer per socket
    #[arg(long, env = "EPHEMERA_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Size of the acknowledgment buffer per socket
    #[arg(long, env = "EPHEMERA_WS_ACK_BUFFER_SIZE", default_value_t = 256)]
    pub ack_buffer_size: usize,

    /// Number of acknowledgments to batch before flushing
    #[arg(long, env = "EPHEMERA_WS_ACK_BATCH_SIZE", default_value_t = 50)]
    pub ack_batch_size: usize,

    /// How often to flush pending acknowledgments
    #[arg(long, env = "EPHEMERA_WS_ACK_FLUSH_INTERVAL_MS", default_value_t = 500)]
    pub ack_flush_interval_ms: u64,

    /// Interval between server pings
    #[arg(long, env = "EPHEMERA_WS_PING_INTERVAL_SECS", default_value_t = 25)]
    pub ping_interval_secs: u64,

    /// Grace period after a ping before an idle socket is closed
    #[arg(long, env = "EPHEMERA_WS_PING_TIMEOUT_SECS", default_value_t = 20)]
    pub ping_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PresenceConfig {
    /// Seconds without a heartbeat before a user is considered offline
    #[arg(long = "presence-ttl-secs", env = "EPHEMERA_PRESENCE_TTL_SECS", default_value_t = 60)]
    pub ttl_secs: u64,

    /// How often to sweep stale presence entries
    #[arg(long = "presence-sweep-interval-secs", env = "EPHEMERA_PRESENCE_SWEEP_INTERVAL_SECS", default_value_t = 15)]
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct NotificationConfig {
    /// Capacity of each local event channel
    #[arg(long, env = "EPHEMERA_CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,

    /// How often to reclaim event channels without subscribers
    #[arg(long, env = "EPHEMERA_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis URL for cross-node event fan-out. Events stay node-local when unset.
    #[arg(id = "pubsub_url", long = "pubsub-url", env = "EPHEMERA_PUBSUB_URL")]
    pub url: Option<String>,

    /// Redis channel carrying event envelopes
    #[arg(long = "pubsub-channel", env = "EPHEMERA_PUBSUB_CHANNEL", default_value = "ephemera:events")]
    pub channel: String,

    #[arg(long = "pubsub-min-backoff-secs", env = "EPHEMERA_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    #[arg(long = "pubsub-max-backoff-secs", env = "EPHEMERA_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    #[arg(long, env = "EPHEMERA_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    #[arg(long, env = "EPHEMERA_HEALTH_PUBSUB_TIMEOUT_MS", default_value_t = 2000)]
    pub pubsub_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "EPHEMERA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are only exported when set
    #[arg(long, env = "EPHEMERA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
