use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

pub const LISTEN_ADDR_ENV: &str = "SNAPLINK_LISTEN_ADDR";
pub const BASE_URL_ENV: &str = "SNAPLINK_BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "SNAPLINK_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SNAPLINK_MYSQL_DSN";
pub const MYSQL_INIT_SCHEMA_ENV: &str = "SNAPLINK_MYSQL_INIT_SCHEMA";
pub const CACHE_BACKEND_ENV: &str = "SNAPLINK_CACHE_BACKEND";
pub const REDIS_URL_ENV: &str = "SNAPLINK_REDIS_URL";
pub const REDIS_CONFIGURE_NOTIFICATIONS_ENV: &str = "SNAPLINK_REDIS_CONFIGURE_NOTIFICATIONS";
pub const CACHE_TTL_ENV: &str = "SNAPLINK_CACHE_TTL_SECS";
pub const STATS_TTL_ENV: &str = "SNAPLINK_STATS_TTL_SECS";
pub const CODE_LENGTH_ENV: &str = "SNAPLINK_CODE_LENGTH";
pub const MAX_ATTEMPTS_ENV: &str = "SNAPLINK_MAX_ATTEMPTS";
pub const LOG_FORMAT_ENV: &str = "SNAPLINK_LOG_FORMAT";
pub const OTLP_ENDPOINT_ENV: &str = "SNAPLINK_OTLP_ENDPOINT";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    #[value(name = "moka")]
    Moka,
    #[value(name = "redis")]
    Redis,
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::Moka => write!(f, "moka"),
            CacheBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Text => write!(f, "text"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snaplink-gateway")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Prefix of every short URL handed out.
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// Create the `links` table on startup if it is missing.
    #[arg(long, env = MYSQL_INIT_SCHEMA_ENV, default_value_t = false)]
    pub mysql_init_schema: bool,

    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::Moka
    )]
    pub cache: CacheBackendArg,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("cache", "redis"))]
    pub redis_url: Option<String>,

    /// Turn on expired-key notifications with CONFIG SET at startup.
    #[arg(
        long,
        env = REDIS_CONFIGURE_NOTIFICATIONS_ENV,
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub redis_configure_notifications: bool,

    #[arg(long, env = CACHE_TTL_ENV, default_value_t = 30)]
    pub cache_ttl_secs: u64,

    /// Must exceed the cache TTL so stats outlive the entry that flushes them.
    #[arg(long, env = STATS_TTL_ENV, default_value_t = 300)]
    pub stats_ttl_secs: u64,

    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = 8)]
    pub code_length: usize,

    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = 5)]
    pub max_attempts: u32,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    #[arg(long, env = OTLP_ENDPOINT_ENV)]
    pub otlp_endpoint: Option<String>,
}
