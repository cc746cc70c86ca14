//! Configuration module for the staking client
//!
//! Loaded from TOML with optional `.env` overrides for the environment.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ClientError, ClientResult};
use crate::tracker::DEFAULT_MINED_HISTORY;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain and contract configuration
    pub chain: ChainConfig,

    /// Confirmation tracking
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Address of the protocol controller; every other contract is resolved through it
    pub controller_address: Address,

    /// Gas limit applied to every transaction
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Mined transactions remembered for late waiters and replacement checks
    #[serde(default = "default_mined_history")]
    pub mined_history: usize,

    /// Deadline applied by `check_tx`; zero waits indefinitely
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit JSON logs instead of human-readable ones
    #[serde(default)]
    pub json_logs: bool,
}

/// Environment variable overriding `chain.controller_address`
pub const CONTROLLER_ADDRESS_ENV: &str = "STAKE_CONTROLLER_ADDRESS";

// Default value functions
fn default_gas_limit() -> u64 { 500_000 }
fn default_mined_history() -> usize { DEFAULT_MINED_HISTORY }
fn default_confirmation_timeout() -> u64 { 0 }
fn default_true() -> bool { true }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mined_history: default_mined_history(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                controller_address: Address::ZERO,
                gas_limit: default_gas_limit(),
            },
            tracker: TrackerConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration after applying `.env` to the process environment
    ///
    /// `STAKE_CONTROLLER_ADDRESS` overrides `chain.controller_address`; the
    /// merged result is validated.
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_overrides(&content, std::env::var(CONTROLLER_ADDRESS_ENV).ok())
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Self::from_toml_with_overrides(content, None)
    }

    fn from_toml_with_overrides(
        content: &str,
        controller_address: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        if let Some(addr) = controller_address {
            config.chain.controller_address = addr.trim().parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.chain.controller_address.is_zero() {
            return Err(ClientError::Configuration(
                "chain.controller_address must be set".to_string(),
            ));
        }
        if self.chain.gas_limit == 0 {
            return Err(ClientError::Configuration(
                "chain.gas_limit must be positive".to_string(),
            ));
        }
        if self.tracker.mined_history == 0 {
            return Err(ClientError::Configuration(
                "tracker.mined_history must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Confirmation deadline, `None` when waits are unbounded
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        match self.tracker.confirmation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
