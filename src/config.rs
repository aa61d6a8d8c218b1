use std::env;
use std::time::Duration;

use crate::error::{OutboundError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_NO_PROXY_SUFFIXES: &str = "amazonaws.com";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Outbound HTTP client configuration
    pub http: HttpClientConfig,
    /// Proxy rotation configuration
    pub proxy: ProxyConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout (default: 15s)
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Accept invalid TLS certificates
    pub skip_tls_verify: bool,
    /// Rewrite every redirect target to https
    pub force_https_redirect: bool,
    /// Allow HTTP/2 negotiation
    pub force_attempt_http2: bool,
    /// Wrap the transport in the tracing decorator
    pub tracing_enabled: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            skip_tls_verify: false,
            force_https_redirect: false,
            force_attempt_http2: false,
            tracing_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Semicolon-separated proxy URLs
    pub proxies: String,
    /// Use the rotation list for requests without an explicit proxy
    pub use_rotation: bool,
    /// Destination host suffixes that are never proxied
    pub no_proxy_suffixes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            http: HttpClientConfig::from_env()?,
            proxy: ProxyConfig::from_env(),
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Result<Self> {
        Ok(HttpClientConfig {
            timeout: parse_timeout(&get_env_or("HTTP_CLIENT_TIMEOUT", "15")),
            max_retries: get_env_or("HTTP_CLIENT_RETRIES", "3")
                .trim()
                .parse()
                .map_err(|_| {
                    OutboundError::InvalidConfig(
                        "HTTP_CLIENT_RETRIES must be a non-negative number".into(),
                    )
                })?,
            skip_tls_verify: get_bool("HTTP_CLIENT_SKIP_VERIFY"),
            force_https_redirect: get_bool("FORCE_HTTPS_REDIRECT"),
            force_attempt_http2: get_bool("HTTP_CLIENT_FORCE_ATTEMPT_HTTP2"),
            tracing_enabled: get_bool("HTTP_CLIENT_TRACING"),
        })
    }
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        ProxyConfig {
            proxies: get_env_or("HTTP_CLIENT_PROXIES", ""),
            use_rotation: get_bool("USE_PROXY_ROTATION"),
            no_proxy_suffixes: split_list(&get_env_or(
                "HTTP_CLIENT_NO_PROXY_SUFFIXES",
                DEFAULT_NO_PROXY_SUFFIXES,
            )),
        }
    }
}

/// Non-positive or unparseable values keep the default.
fn parse_timeout(raw: &str) -> Duration {
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs as u64),
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_bool(key: &str) -> bool {
    get_env_or(key, "false").trim().parse().unwrap_or(false)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
