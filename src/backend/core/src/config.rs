//! Configuration management.

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Dispatch executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Outbound HTTP client configuration
    #[serde(default)]
    pub http_client: HttpClientConfig,

    /// Scheduling loop configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Stale execution recovery configuration
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Failed execution retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sizing for the bounded dispatch pool that runs job executions.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Baseline worker count kept warm (recorded for ops parity; the
    /// tokio pool scales within max_pool_size on demand)
    #[serde(default = "default_core_pool_size")]
    pub core_pool_size: usize,

    /// Maximum concurrent job executions
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Maximum queued submissions awaiting a worker; beyond this,
    /// submissions are rejected
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for in-flight executions on shutdown
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: default_core_pool_size(),
            max_pool_size: default_max_pool_size(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    /// Total per-request timeout for job callbacks (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Connection establishment timeout (seconds)
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduling loop period (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Age past which a RUNNING execution is presumed abandoned (seconds)
    #[serde(default = "default_stale_timeout_seconds")]
    pub stale_timeout_seconds: i64,

    /// Stale reaper period (seconds)
    #[serde(default = "default_reaper_interval_seconds")]
    pub reaper_interval_seconds: u64,

    /// Retrier period (seconds)
    #[serde(default = "default_retry_interval_seconds")]
    pub retry_interval_seconds: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_timeout_seconds: default_stale_timeout_seconds(),
            reaper_interval_seconds: default_reaper_interval_seconds(),
            retry_interval_seconds: default_retry_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per logical execution (first run + retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Base backoff delay (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff multiplier per retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_core_pool_size() -> usize { 5 }
fn default_max_pool_size() -> usize { 200 }
fn default_queue_capacity() -> usize { 1000 }
fn default_shutdown_grace_seconds() -> u64 { 60 }
fn default_timeout_seconds() -> u64 { 95 }
fn default_connect_timeout_seconds() -> u64 { 5 }
fn default_tick_interval_ms() -> u64 { 1000 }
fn default_stale_timeout_seconds() -> i64 { 100 }
fn default_reaper_interval_seconds() -> u64 { 30 }
fn default_retry_interval_seconds() -> u64 { 60 }
fn default_max_attempts() -> i32 { 5 }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_multiplier() -> f64 { 2.0 }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.core_pool_size, 5);
        assert_eq!(cfg.max_pool_size, 200);
        assert_eq!(cfg.queue_capacity, 1000);
    }

    #[test]
    fn test_retry_defaults() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.initial_delay_ms, 1000);
        assert_eq!(cfg.multiplier, 2.0);
    }

    #[test]
    fn test_recovery_defaults() {
        let cfg = RecoveryConfig::default();
        assert_eq!(cfg.stale_timeout_seconds, 100);
        assert_eq!(cfg.reaper_interval_seconds, 30);
        assert_eq!(cfg.retry_interval_seconds, 60);
    }

    #[test]
    fn test_http_client_defaults() {
        let cfg = HttpClientConfig::default();
        assert_eq!(cfg.timeout_seconds, 95);
        assert_eq!(cfg.connect_timeout_seconds, 5);
    }
}
