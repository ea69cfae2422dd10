use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;
use crate::protocol::SourceMode;
use crate::retry::RetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Sizing of the virtual slot array and its prefetch/evict policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Number of virtual positions.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Slots prefetched past the cursor.
    #[serde(default = "default_ahead")]
    pub ahead: usize,
    /// Slots kept filled behind the cursor.
    #[serde(default = "default_behind")]
    pub behind: usize,
    /// Filled slots further than this from the cursor are evicted.
    #[serde(default = "default_evict_distance")]
    pub evict_distance: usize,
    /// Run an eviction pass every N cursor moves.
    #[serde(default = "default_evict_every")]
    pub evict_every: usize,
    /// Items requested per fetch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fetch more when fewer unconsumed items than this remain in the pool.
    #[serde(default = "default_replenish_floor")]
    pub replenish_floor: usize,
    /// Seconds between background replenishment checks.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    #[serde(default)]
    pub initial_mode: SourceMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_enabled")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Consecutive failed fetches before the remote is marked degraded.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    /// How long a degraded remote is skipped before it is probed again.
    #[serde(default = "default_degraded_cooldown_secs")]
    pub degraded_cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// TOML file of `[[poem]]` tables.
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ahead: default_ahead(),
            behind: default_behind(),
            evict_distance: default_evict_distance(),
            evict_every: default_evict_every(),
            batch_size: default_batch_size(),
            replenish_floor: default_replenish_floor(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            initial_mode: SourceMode::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_remote_enabled(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            degraded_after: default_degraded_after(),
            degraded_cooldown_secs: default_degraded_cooldown_secs(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            corpus_path: default_corpus_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl FeedConfig {
    /// Reject settings under which the policy cannot hold its invariants.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 {
            anyhow::bail!("feed.capacity must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("feed.batch_size must be at least 1");
        }
        if self.evict_every == 0 {
            anyhow::bail!("feed.evict_every must be at least 1");
        }
        // Evicting inside the prefetch range would empty slots the next
        // fill pass immediately refills.
        if self.evict_distance <= self.ahead.max(self.behind) {
            anyhow::bail!(
                "feed.evict_distance ({}) must exceed max(ahead, behind) ({})",
                self.evict_distance,
                self.ahead.max(self.behind)
            );
        }
        Ok(())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

impl RemoteConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_retries(self.max_retries)
    }

    pub fn degraded_cooldown(&self) -> Duration {
        Duration::from_secs(self.degraded_cooldown_secs)
    }
}

fn default_capacity() -> usize {
    2000
}

fn default_ahead() -> usize {
    5
}

fn default_behind() -> usize {
    3
}

fn default_evict_distance() -> usize {
    30
}

fn default_evict_every() -> usize {
    10
}

fn default_batch_size() -> usize {
    30
}

fn default_replenish_floor() -> usize {
    20
}

fn default_maintenance_interval_secs() -> u64 {
    5
}

fn default_remote_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://poetrydb.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_degraded_after() -> u32 {
    3
}

fn default_degraded_cooldown_secs() -> u64 {
    120
}

fn default_corpus_path() -> PathBuf {
    platform::data_dir().join("poems.toml")
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.feed.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
