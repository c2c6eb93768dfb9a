use clap::{Args, Parser, ValueEnum};
use thiserror::Error;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub ledger: LedgerConfig,

    #[command(flatten)]
    pub transport: TransportConfig,

    #[command(flatten)]
    pub smpp: SmppConfig,

    #[command(flatten)]
    pub proxy: ProxyConfig,

    #[command(flatten)]
    pub tunnel: TunnelConfig,

    #[command(flatten)]
    pub bulk: BulkConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long = "host", env = "SMSGW_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the messaging API
    #[arg(long = "port", env = "SMSGW_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Port for liveness/readiness probes
    #[arg(long = "mgmt-port", env = "SMSGW_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight work on shutdown
    #[arg(long = "shutdown-timeout-secs", env = "SMSGW_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    /// Upper bound for any single API request (bulk requests use their own deadline)
    #[arg(long = "request-timeout-secs", env = "SMSGW_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            mgmt_port: 9090,
            shutdown_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct LedgerConfig {
    /// Where message records are kept
    #[arg(long = "ledger", env = "SMSGW_LEDGER", value_enum, default_value_t = LedgerBackend::Postgres)]
    pub backend: LedgerBackend,

    /// Database connection URL (required for the postgres ledger)
    #[arg(long = "database-url", env = "SMSGW_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long = "db-max-connections", env = "SMSGW_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    #[arg(long = "db-min-connections", env = "SMSGW_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    #[arg(long = "db-acquire-timeout-secs", env = "SMSGW_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Readiness probe timeout for the ledger
    #[arg(long = "ledger-ping-timeout-ms", env = "SMSGW_LEDGER_PING_TIMEOUT_MS", default_value_t = 2000)]
    pub ping_timeout_ms: u64,

    /// Resolve cancel requests by searching stored backend responses when the id is unknown
    #[arg(long = "legacy-response-lookup", env = "SMSGW_LEGACY_RESPONSE_LOOKUP", default_value_t = false)]
    pub legacy_response_lookup: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            database_url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            ping_timeout_ms: 2000,
            legacy_response_lookup: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// SMPP session opened per call
    Smpp,
    /// HTTP POST to a REST proxy
    Proxy,
    /// REST proxy call issued through ssh
    Tunnel,
}

#[derive(Clone, Debug, Args)]
pub struct TransportConfig {
    /// Backend used to deliver messages
    #[arg(long = "transport", env = "SMSGW_TRANSPORT", value_enum, default_value_t = TransportKind::Smpp)]
    pub kind: TransportKind,

    /// Deadline for each backend call
    #[arg(id = "transport-timeout-secs", long = "transport-timeout-secs", env = "SMSGW_TRANSPORT_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { kind: TransportKind::Smpp, timeout_secs: 20 }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct SmppConfig {
    #[arg(id = "smpp-host", long = "smpp-host", env = "SMSGW_SMPP_HOST")]
    pub host: Option<String>,

    #[arg(id = "smpp-port", long = "smpp-port", env = "SMSGW_SMPP_PORT", default_value_t = 2775)]
    pub port: u16,

    /// Bind identity; also the default aAddress for sends that omit one
    #[arg(long = "smpp-system-id", env = "SMSGW_SMPP_SYSTEM_ID", default_value = "")]
    pub system_id: String,

    #[arg(long = "smpp-password", env = "SMSGW_SMPP_PASSWORD", default_value = "")]
    pub password: String,

    #[arg(long = "smpp-system-type", env = "SMSGW_SMPP_SYSTEM_TYPE", default_value = "")]
    pub system_type: String,
}

#[derive(Clone, Debug, Args)]
pub struct ProxyConfig {
    /// Base URL of the REST proxy, e.g. https://sms-proxy.internal
    #[arg(long = "proxy-base-url", env = "SMSGW_PROXY_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long = "proxy-send-endpoint", env = "SMSGW_PROXY_SEND_ENDPOINT", default_value = "/sendMessage")]
    pub send_endpoint: String,

    #[arg(long = "proxy-query-endpoint", env = "SMSGW_PROXY_QUERY_ENDPOINT", default_value = "/queryMessage")]
    pub query_endpoint: String,

    #[arg(long = "proxy-cancel-endpoint", env = "SMSGW_PROXY_CANCEL_ENDPOINT", default_value = "/cancelMessage")]
    pub cancel_endpoint: String,

    /// Static bearer credential sent to the proxy
    #[arg(long = "proxy-token", env = "SMSGW_PROXY_TOKEN")]
    pub token: Option<String>,

    #[arg(long = "proxy-content-type", env = "SMSGW_PROXY_CONTENT_TYPE", default_value = "application/xml")]
    pub content_type: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            send_endpoint: "/sendMessage".to_string(),
            query_endpoint: "/queryMessage".to_string(),
            cancel_endpoint: "/cancelMessage".to_string(),
            token: None,
            content_type: "application/xml".to_string(),
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct TunnelConfig {
    /// Host that runs the proxied curl command
    #[arg(id = "tunnel-host", long = "tunnel-host", env = "SMSGW_TUNNEL_HOST")]
    pub host: Option<String>,

    #[arg(long = "tunnel-user", env = "SMSGW_TUNNEL_USER")]
    pub user: Option<String>,

    #[arg(id = "tunnel-port", long = "tunnel-port", env = "SMSGW_TUNNEL_PORT", default_value_t = 22)]
    pub port: u16,

    #[arg(long = "tunnel-identity-file", env = "SMSGW_TUNNEL_IDENTITY_FILE")]
    pub identity_file: Option<String>,

    #[arg(long = "tunnel-ssh-binary", env = "SMSGW_TUNNEL_SSH_BINARY", default_value = "ssh")]
    pub ssh_binary: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self { host: None, user: None, port: 22, identity_file: None, ssh_binary: "ssh".to_string() }
    }
}

#[derive(Clone, Debug, Args)]
pub struct BulkConfig {
    /// Maximum simultaneous backend calls for one bulk request
    #[arg(long = "bulk-max-concurrency", env = "SMSGW_BULK_MAX_CONCURRENCY", default_value_t = 32)]
    pub max_concurrency: usize,

    /// Deadline for a whole bulk request; unfinished recipients are cancelled
    #[arg(id = "bulk-timeout-secs", long = "bulk-timeout-secs", env = "SMSGW_BULK_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { max_concurrency: 32, timeout_secs: 120 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long = "log-format", env = "SMSGW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; tracing and metrics export is off when unset
    #[arg(long = "otlp-endpoint", env = "SMSGW_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }

    /// Checks that the selected ledger and transport have everything they need.
    ///
    /// # Errors
    /// Returns `ConfigError` describing the first missing or invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.backend == LedgerBackend::Postgres && self.ledger.database_url.is_none() {
            return Err(ConfigError::Missing("database-url"));
        }
        if self.transport.timeout_secs == 0 {
            return Err(ConfigError::Invalid { name: "transport-timeout-secs", reason: "must be positive".into() });
        }
        if self.bulk.max_concurrency == 0 {
            return Err(ConfigError::Invalid { name: "bulk-max-concurrency", reason: "must be positive".into() });
        }
        // The request timeout has to outlast the backend call plus the ledger write
        let send_budget = self.transport.timeout_secs.saturating_add(self.ledger.acquire_timeout_secs);
        if self.server.request_timeout_secs <= send_budget {
            return Err(ConfigError::Invalid {
                name: "request-timeout-secs",
                reason: format!("must exceed transport timeout plus ledger acquire timeout ({send_budget}s)"),
            });
        }

        match self.transport.kind {
            TransportKind::Smpp => {
                if self.smpp.host.is_none() {
                    return Err(ConfigError::Missing("smpp-host"));
                }
                if self.smpp.system_id.is_empty() {
                    return Err(ConfigError::Missing("smpp-system-id"));
                }
            }
            TransportKind::Proxy => self.validate_proxy()?,
            TransportKind::Tunnel => {
                self.validate_proxy()?;
                if self.tunnel.host.is_none() {
                    return Err(ConfigError::Missing("tunnel-host"));
                }
            }
        }
        Ok(())
    }

    fn validate_proxy(&self) -> Result<(), ConfigError> {
        let base_url = self.proxy.base_url.as_deref().ok_or(ConfigError::Missing("proxy-base-url"))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { name: "proxy-base-url", reason: format!("not an http(s) URL: {base_url}") });
        }
        if self.proxy.token.is_none() {
            return Err(ConfigError::Missing("proxy-token"));
        }
        Ok(())
    }

    /// Identity used as the origin address when a send request omits `aAddress`.
    #[must_use]
    pub fn system_identity(&self) -> &str {
        &self.smpp.system_id
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ledger: LedgerConfig::default(),
            transport: TransportConfig::default(),
            smpp: SmppConfig { port: 2775, ..SmppConfig::default() },
            proxy: ProxyConfig::default(),
            tunnel: TunnelConfig::default(),
            bulk: BulkConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smpp_config() -> Config {
        let mut config = Config::default();
        config.smpp.host = Some("127.0.0.1".into());
        config.smpp.system_id = "SYS1".into();
        config
    }

    #[test]
    fn test_parse_defaults_from_args() {
        let config = Config::parse_from(["sms-gateway", "--ledger", "memory", "--smpp-host", "smsc", "--smpp-system-id", "GW"]);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.transport.kind, TransportKind::Smpp);
        assert_eq!(config.transport.timeout_secs, 20);
        assert_eq!(config.bulk.max_concurrency, 32);
        assert_eq!(config.smpp.port, 2775);
        assert_eq!(config.system_identity(), "GW");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_smpp_is_valid() {
        assert_eq!(smpp_config().validate(), Ok(()));
    }

    #[test]
    fn test_request_timeout_must_cover_send() {
        let mut config = smpp_config();
        config.transport.timeout_secs = 20;
        config.ledger.acquire_timeout_secs = 5;

        config.server.request_timeout_secs = 25;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "request-timeout-secs", .. })));

        config.server.request_timeout_secs = 26;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut config = smpp_config();
        config.ledger.backend = LedgerBackend::Postgres;
        assert_eq!(config.validate(), Err(ConfigError::Missing("database-url")));
    }

    #[test]
    fn test_proxy_requires_url_and_token() {
        let mut config = smpp_config();
        config.transport.kind = TransportKind::Proxy;
        assert_eq!(config.validate(), Err(ConfigError::Missing("proxy-base-url")));

        config.proxy.base_url = Some("ftp://nope".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "proxy-base-url", .. })));

        config.proxy.base_url = Some("http://proxy.local".into());
        assert_eq!(config.validate(), Err(ConfigError::Missing("proxy-token")));

        config.proxy.token = Some("secret".into());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_tunnel_requires_host() {
        let mut config = smpp_config();
        config.transport.kind = TransportKind::Tunnel;
        config.proxy.base_url = Some("http://proxy.local".into());
        config.proxy.token = Some("secret".into());
        assert_eq!(config.validate(), Err(ConfigError::Missing("tunnel-host")));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = smpp_config();
        config.bulk.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "bulk-max-concurrency", .. })));
    }
}
