//! Configuration for the node

use crate::mempool::DEFAULT_MEMPOOL_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File the chain snapshot is written to
    pub snapshot_path: PathBuf,

    /// Load and validate an existing snapshot at startup instead of starting
    /// from a fresh genesis block
    pub resume_from_snapshot: bool,

    /// Block producer configuration
    pub producer: ProducerConfig,

    /// Transaction generator configuration
    pub generator: GeneratorConfig,

    /// Mempool configuration
    pub mempool: MempoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("blockchain.json"),
            resume_from_snapshot: false,
            producer: ProducerConfig::default(),
            generator: GeneratorConfig::default(),
            mempool: MempoolConfig::default(),
        }
    }
}

/// Block producer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Seconds between mempool checks
    pub tick_interval_secs: u64,

    /// Maximum transactions per block
    pub batch_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            batch_size: 3,
        }
    }
}

impl ProducerConfig {
    /// Tick interval as a duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Transaction generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Run the simulated traffic generator
    pub enabled: bool,

    /// Shortest pause between generated transactions (seconds)
    pub min_interval_secs: u64,

    /// Longest pause between generated transactions (seconds)
    pub max_interval_secs: u64,

    /// Largest generated amount (amounts are drawn from 1..=max_amount)
    pub max_amount: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 3,
            max_interval_secs: 6,
            max_amount: 100,
        }
    }
}

impl GeneratorConfig {
    /// Shortest pause as a duration
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    /// Longest pause as a duration
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }
}

/// Mempool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum pending transactions
    pub capacity: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEMPOOL_CAPACITY,
        }
    }
}

fn env_parse<T>(name: &str) -> crate::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| crate::Error::Config(format!("Invalid {}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("CHAIN_SNAPSHOT_PATH") {
            config.snapshot_path = PathBuf::from(path);
        }
        if let Some(resume) = env_parse("CHAIN_RESUME")? {
            config.resume_from_snapshot = resume;
        }
        if let Some(secs) = env_parse("CHAIN_TICK_INTERVAL")? {
            config.producer.tick_interval_secs = secs;
        }
        if let Some(size) = env_parse("CHAIN_BATCH_SIZE")? {
            config.producer.batch_size = size;
        }
        if let Some(enabled) = env_parse("CHAIN_GEN_ENABLED")? {
            config.generator.enabled = enabled;
        }
        if let Some(secs) = env_parse("CHAIN_GEN_MIN_INTERVAL")? {
            config.generator.min_interval_secs = secs;
        }
        if let Some(secs) = env_parse("CHAIN_GEN_MAX_INTERVAL")? {
            config.generator.max_interval_secs = secs;
        }
        if let Some(capacity) = env_parse("CHAIN_MEMPOOL_CAPACITY")? {
            config.mempool.capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.producer.batch_size == 0 {
            return Err(crate::Error::Config("producer.batch_size must be at least 1".into()));
        }
        if self.producer.tick_interval_secs == 0 {
            return Err(crate::Error::Config(
                "producer.tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.generator.enabled && self.generator.max_interval_secs == 0 {
            return Err(crate::Error::Config(
                "generator.max_interval_secs must be at least 1".into(),
            ));
        }
        if self.generator.min_interval_secs > self.generator.max_interval_secs {
            return Err(crate::Error::Config(format!(
                "generator.min_interval_secs ({}) exceeds generator.max_interval_secs ({})",
                self.generator.min_interval_secs, self.generator.max_interval_secs
            )));
        }
        if self.generator.max_amount == 0 {
            return Err(crate::Error::Config("generator.max_amount must be at least 1".into()));
        }
        if self.mempool.capacity == 0 {
            return Err(crate::Error::Config("mempool.capacity must be at least 1".into()));
        }
        if u32::try_from(self.mempool.capacity).is_err() {
            return Err(crate::Error::Config(format!(
                "mempool.capacity must not exceed {}",
                u32::MAX
            )));
        }
        Ok(())
    }
}
