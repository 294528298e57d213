use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use crate::{types::ChainId, Error};

pub const SUPPORTED_ADAPTERS: &[&str] = &["jsonrpc"];

/// Ceiling for every configured delay and deadline: one day.
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventFilter {
    pub name: String,
    pub topic: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChainConfig {
    pub id: ChainId,
    #[serde(rename = "adapter_type")]
    pub adapter_type: String,
    pub name: String,
    pub rpc_url: String,
    /// Contract that executes inbound messages on this chain.
    pub receiver: String,
    /// Contract that emits outbound events on this chain.
    pub emitter: String,
    #[serde(default)]
    pub subscriptions: Vec<EventFilter>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RelayerConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: f64,
    pub queue_capacity: usize,
    pub shutdown_deadline_ms: u64,
    pub submit_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_attempts: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_jitter: 0.2,
            queue_capacity: 256,
            shutdown_deadline_ms: 10_000,
            submit_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 60_000,
        }
    }
}

impl RelayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms.min(MAX_DELAY_MS))
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("Relayer poll interval must be greater than 0".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("Relayer max attempts must be greater than 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("Relayer queue capacity must be greater than 0".to_string()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(Error::Config("Retry base delay exceeds retry max delay".to_string()));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(Error::Config("Reconnect base delay exceeds reconnect max delay".to_string()));
        }
        if self.retry_max_delay_ms > MAX_DELAY_MS
            || self.reconnect_max_delay_ms > MAX_DELAY_MS
            || self.shutdown_deadline_ms > MAX_DELAY_MS
        {
            return Err(Error::Config(format!(
                "Max delays and shutdown deadline must not exceed {}ms",
                MAX_DELAY_MS
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(Error::Config(format!(
                "Retry jitter must be within 0.0..=1.0, got {}",
                self.retry_jitter
            )));
        }
        if self.submit_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(Error::Config("RPC timeouts must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub relayer: RelayerConfig,
}

impl Config {
    /// Loads a JSON or TOML config, picked by file extension.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let path = config_path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&config_str)?,
            _ => Self::from_json_str(&config_str)?,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn from_json_str(config_str: &str) -> Result<Self, Error> {
        serde_json::from_str(config_str)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, Error> {
        toml::from_str(config_str)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if chain.id.as_str().is_empty() {
                return Err(Error::Config(format!("Chain '{}' has an empty id", chain.name)));
            }
            if !seen.insert(&chain.id) {
                return Err(Error::Config(format!("Duplicate chain id: {}", chain.id)));
            }
            if !SUPPORTED_ADAPTERS.contains(&chain.adapter_type.as_str()) {
                return Err(Error::Config(format!("Invalid adapter type: {}", chain.adapter_type)));
            }
            if chain.rpc_url.is_empty() {
                return Err(Error::Config(format!("Chain {} has no rpc_url", chain.id)));
            }
        }

        self.relayer.validate()
    }

    pub fn get_chain_config(&self, chain_id: &ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| &c.id == chain_id)
    }
}
