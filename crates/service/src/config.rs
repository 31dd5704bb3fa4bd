//! Service configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: ops server bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL store when set, in-memory otherwise
/// - `SWEEP_INTERVAL_SECS` (30), `RESERVATION_TTL_SECS` (900)
/// - `OUTBOX_POLL_INTERVAL_MS` (500), `OUTBOX_BATCH_SIZE` (100),
///   `OUTBOX_MAX_ATTEMPTS` (10), `OUTBOX_RETENTION_SECS` (86400)
/// - `GATEWAY_TIMEOUT_MS` (10000), `FRAUD_RISK_THRESHOLD` (0.7)
/// - `CONFLICT_MAX_ATTEMPTS` (5)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub sweep_interval: Duration,
    pub reservation_ttl: chrono::Duration,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
    /// How long delivered outbox messages are kept.
    pub outbox_retention: chrono::Duration,
    pub gateway_timeout: Duration,
    pub fraud_risk_threshold: f64,
    pub conflict_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            sweep_interval: parse(lookup, "SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            reservation_ttl: parse(lookup, "RESERVATION_TTL_SECS")
                .filter(|secs: &i64| *secs >= 0)
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(defaults.reservation_ttl),
            outbox_poll_interval: parse(lookup, "OUTBOX_POLL_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
            outbox_batch_size: parse(lookup, "OUTBOX_BATCH_SIZE")
                .unwrap_or(defaults.outbox_batch_size),
            outbox_max_attempts: parse(lookup, "OUTBOX_MAX_ATTEMPTS")
                .unwrap_or(defaults.outbox_max_attempts),
            outbox_retention: parse(lookup, "OUTBOX_RETENTION_SECS")
                .filter(|secs: &i64| *secs >= 0)
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(defaults.outbox_retention),
            gateway_timeout: parse(lookup, "GATEWAY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
            fraud_risk_threshold: parse(lookup, "FRAUD_RISK_THRESHOLD")
                .filter(|t: &f64| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.fraud_risk_threshold),
            conflict_max_attempts: parse(lookup, "CONFLICT_MAX_ATTEMPTS")
                .unwrap_or(defaults.conflict_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            sweep_interval: Duration::from_secs(30),
            reservation_ttl: chrono::Duration::seconds(900),
            outbox_poll_interval: Duration::from_millis(500),
            outbox_batch_size: 100,
            outbox_max_attempts: 10,
            outbox_retention: chrono::Duration::hours(24),
            gateway_timeout: Duration::from_millis(10_000),
            fraud_risk_threshold: 0.7,
            conflict_max_attempts: 5,
        }
    }
}
