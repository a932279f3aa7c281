//! Gateway configuration with validation.
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs to name the
//! values it overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP bridge configuration
    pub http: HttpConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Rate limiter configuration
    pub rate_limit: RateLimitConfig,
    /// Upstream node pool and health checking
    pub load_balancer: LoadBalancerConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Security filter configuration
    pub security: SecurityConfig,
    /// Metrics collector configuration
    pub metrics: MetricsConfig,
    /// CORS configuration for the HTTP bridge
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == self.http.admin_port {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.cache.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "cache.sweep_interval cannot be 0".into(),
            ));
        }

        if self.rate_limit.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "rate_limit.cleanup_interval cannot be 0".into(),
            ));
        }

        if self.load_balancer.health_check_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "load_balancer.health_check_interval cannot be 0".into(),
            ));
        }

        if self.load_balancer.health_check_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "load_balancer.health_check_timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "timeouts.request cannot be 0".into(),
            ));
        }

        if self.metrics.latency_window == 0 {
            return Err(ConfigError::Invalid(
                "metrics.latency_window cannot be 0".into(),
            ));
        }

        self.load_balancer.validate()
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Parse from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `GATEWAY_CONFIG` (if set) and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override ports and the request timeout from `lookup(key)`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_HTTP_PORT) {
            self.http.port = parse_env(ENV_HTTP_PORT, &port)?;
        }
        if let Some(port) = lookup(ENV_ADMIN_PORT) {
            self.http.admin_port = parse_env(ENV_ADMIN_PORT, &port)?;
        }
        if let Some(ms) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.timeouts.request = Duration::from_millis(parse_env(ENV_REQUEST_TIMEOUT_MS, &ms)?);
        }
        Ok(())
    }

    /// HTTP bridge bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Admin surface bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.admin_host, self.http.admin_port)
    }
}

/// Path of an optional TOML config file
pub const ENV_CONFIG_PATH: &str = "GATEWAY_CONFIG";
pub const ENV_HTTP_PORT: &str = "GATEWAY_HTTP_PORT";
pub const ENV_ADMIN_PORT: &str = "GATEWAY_ADMIN_PORT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "GATEWAY_REQUEST_TIMEOUT_MS";

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}={raw} is not a valid value")))
}

/// HTTP bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
    /// Admin bind address (localhost only by default)
    pub admin_host: IpAddr,
    /// Admin port (default: 8081)
    pub admin_port: u16,
    /// Enable HTTP bridge
    pub enabled: bool,
    /// Enable admin surface
    pub admin_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            admin_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            admin_port: 8081,
            enabled: true,
            admin_enabled: true,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching for endpoints that declare a policy
    pub enabled: bool,
    /// Interval of the proactive expiry sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting for endpoints that declare a policy
    pub enabled: bool,
    /// Interval for dropping expired windows
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// A single upstream node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub url: String,
    pub weight: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            weight,
            max_connections: default_max_connections(),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

fn default_max_connections() -> u32 {
    100
}

/// Upstream pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Fixed node pool
    pub nodes: Vec<NodeConfig>,
    /// Enable periodic health probing
    pub health_check_enabled: bool,
    /// Interval between probe rounds
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    /// Per-probe timeout
    #[serde(with = "humantime_serde")]
    pub health_check_timeout: Duration,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            nodes: vec![
                NodeConfig::new("node-1", "http://localhost:3001", 3),
                NodeConfig::new("node-2", "http://localhost:3002", 2),
                NodeConfig::new("node-3", "http://localhost:3003", 1),
            ],
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

impl LoadBalancerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::InvalidNode("node pool is empty".into()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ConfigError::InvalidNode(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if node.weight == 0 {
                return Err(ConfigError::InvalidNode(format!(
                    "node '{}' has zero weight",
                    node.id
                )));
            }
            if node.max_connections == 0 {
                return Err(ConfigError::InvalidNode(format!(
                    "node '{}' has zero max_connections",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for handler dispatch
    #[serde(with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(5),
        }
    }
}

/// Security filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable pattern inspection
    pub enabled: bool,
    /// Additional regexes appended to the built-in set
    pub extra_patterns: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_patterns: Vec::new(),
        }
    }
}

/// Metrics collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Number of latency samples kept for the rolling average
    pub latency_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_window: 1000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Gateway and admin surfaces share a port
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Zero or otherwise unusable interval
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid upstream node definition
    #[error("invalid node: {0}")]
    InvalidNode(String),
    /// Security pattern failed to compile
    #[error("invalid security pattern: {0}")]
    InvalidPattern(String),
    /// Config file could not be read
    #[error("config io error: {0}")]
    Io(String),
    /// Config file could not be parsed
    #[error("config parse error: {0}")]
    Parse(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as `"30s"`, `"500ms"`, `"5m"` or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before the single-letter suffixes
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
