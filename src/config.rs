use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::queue::QueuePolicy;
use crate::schema::{ProbeTarget, partition_key_for};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database, shared by the metrics store and the failure queue
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (records older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./metrics.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Storage configuration (defaults to SQLite at ./metrics.db)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    /// Subscribers of the alert fan-out
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,

    #[serde(default)]
    pub alerts: AlertMetadata,

    #[serde(default)]
    pub api: ApiConfig,
}

/// One monitored endpoint
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Probe interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl TargetConfig {
    pub fn target(&self) -> ProbeTarget {
        ProbeTarget::new(self.url.clone(), self.region.clone())
    }
}

fn default_region() -> String {
    "local".to_string()
}

fn default_interval() -> u64 {
    60
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueueConfig {
    /// Seconds a received failure event stays hidden before redelivery
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: u64,

    /// Deliveries before an event is moved to the dead letters
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Seconds between dispatcher polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Maximum events per dispatcher batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: default_visibility_timeout(),
            max_receive_count: default_max_receive_count(),
            poll_interval: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl QueueConfig {
    pub fn policy(&self) -> QueuePolicy {
        QueuePolicy {
            visibility_timeout: Duration::from_secs(self.visibility_timeout),
            max_receive_count: self.max_receive_count,
        }
    }
}

fn default_visibility_timeout() -> u64 {
    30
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierConfig {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub name: Option<String>,
    pub user_id: Option<String>,
}

/// Static metadata attached to every alert
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct AlertMetadata {
    #[serde(default = "default_runbook_url")]
    pub runbook_url: String,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    /// Recently published alert ids remembered for duplicate suppression
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for AlertMetadata {
    fn default() -> Self {
        Self {
            runbook_url: default_runbook_url(),
            dashboard_url: default_dashboard_url(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

fn default_runbook_url() -> String {
    "https://runbooks.example.com/api-monitoring".to_string()
}

fn default_dashboard_url() -> String {
    "http://localhost:8080/metrics".to_string()
}

fn default_dedup_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiConfig {
    /// Bind address (overridden by MONITOR_ADDR)
    pub bind: Option<IpAddr>,
    /// Port (overridden by MONITOR_PORT)
    pub port: Option<u16>,
    #[serde(default)]
    pub enable_cors: bool,
}

impl Config {
    /// Reject configurations the hub cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        for target in &self.targets {
            partition_key_for(&target.url)
                .with_context(|| format!("invalid target url `{}`", target.url))?;
            if target.interval == 0 {
                bail!("target `{}` has a zero probe interval", target.url);
            }
        }
        if self.queue.max_receive_count == 0 {
            bail!("queue.max_receive_count must be at least 1");
        }
        if self.queue.batch_size == 0 {
            bail!("queue.batch_size must be at least 1");
        }
        if self.alerts.dedup_capacity == 0 {
            bail!("alerts.dedup_capacity must be at least 1");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file `{path}`"))?;
    let config: Config = serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file `{path}`"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
