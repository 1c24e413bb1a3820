//! Configuration management
//!
//! Layers, lowest first: built-in defaults, an optional TOML file
//! (`CALLTRACK_CONFIG`, default `config/calltrack.toml`), then environment
//! variables such as `CALLTRACK_SERVER__PORT=9090`.

use crate::application::{RetryPolicy, TrackerSettings, WorkerConfig};
use crate::domain::finalization::GuardWindows;
use crate::domain::identity::IdentityWindows;
use crate::domain::reconciler::ReconcilerTimings;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CALLTRACK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/calltrack.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub reconciler: ReconcilerConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub call_log: CallLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// State file for the `file` backend
    pub path: String,
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub identity_active_ms: i64,
    pub identity_recent_ms: i64,
    pub marker_window_ms: i64,
    pub final_lock_ttl_ms: i64,
    pub near_duplicate_ms: i64,
    pub settle_delay_ms: u64,
    pub query_retries: u32,
    pub retry_delay_ms: u64,
    pub history_lookback_ms: i64,
    pub history_limit: usize,
    #[serde(default)]
    pub tenant_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub cap: usize,
    pub stale_after_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub pending_cap: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_jitter: bool,
    pub phone_recovery_attempts: u32,
    pub phone_recovery_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogConfig {
    pub permission_granted: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            log: LogConfig {
                level: "info".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                path: "data/calltrack.json".to_string(),
                database_url: "postgres://postgres@localhost/calltrack".to_string(),
            },
            reconciler: ReconcilerConfig {
                identity_active_ms: 60 * 60 * 1000,
                identity_recent_ms: 2 * 60 * 1000,
                marker_window_ms: 12_000,
                final_lock_ttl_ms: 2_500,
                near_duplicate_ms: 2_000,
                settle_delay_ms: 1_500,
                query_retries: 6,
                retry_delay_ms: 900,
                history_lookback_ms: 5 * 60 * 1000,
                history_limit: 10,
                tenant_tag: None,
            },
            queue: QueueConfig {
                cap: 1000,
                stale_after_ms: 24 * 60 * 60 * 1000,
            },
            delivery: DeliveryConfig {
                pending_cap: 200,
                backoff_initial_ms: 1_000,
                backoff_max_ms: 300_000,
                backoff_multiplier: 2.0,
                backoff_jitter: true,
                phone_recovery_attempts: 5,
                phone_recovery_delay_ms: 50,
            },
            call_log: CallLogConfig {
                permission_granted: true,
            },
        }
    }
}

impl Config {
    /// Load using the file named by `CALLTRACK_CONFIG`, if any
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    /// Load defaults, then `path` (optional, may be missing), then the
    /// environment
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("CALLTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Effective configuration as TOML
    pub fn render(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|e| format!("# unrenderable config: {}", e))
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let r = &self.reconciler;
        let d = &self.delivery;
        TrackerSettings {
            identity: IdentityWindows {
                active_ms: r.identity_active_ms,
                recent_ms: r.identity_recent_ms,
            },
            marker_window_ms: r.marker_window_ms,
            guard: GuardWindows {
                lock_ttl_ms: r.final_lock_ttl_ms,
                near_duplicate_ms: r.near_duplicate_ms,
            },
            timings: ReconcilerTimings {
                settle_delay: Duration::from_millis(r.settle_delay_ms),
                query_retries: r.query_retries,
                retry_delay: Duration::from_millis(r.retry_delay_ms),
                history_lookback_ms: r.history_lookback_ms,
                history_limit: r.history_limit,
            },
            queue_cap: self.queue.cap,
            pending_cap: d.pending_cap,
            worker: WorkerConfig {
                retry: RetryPolicy {
                    initial_delay: Duration::from_millis(d.backoff_initial_ms),
                    max_delay: Duration::from_millis(d.backoff_max_ms),
                    backoff_multiplier: d.backoff_multiplier,
                    use_jitter: d.backoff_jitter,
                },
                phone_recovery_attempts: d.phone_recovery_attempts,
                phone_recovery_delay: Duration::from_millis(d.phone_recovery_delay_ms),
                stale_after_ms: self.queue.stale_after_ms,
            },
            tenant_tag: r.tenant_tag.clone(),
            call_log_permission: self.call_log.permission_granted,
        }
    }
}
