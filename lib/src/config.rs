// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Library configuration, loaded from TOML with defaults for omitted fields

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::Error;

/// Top level configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Secure element session configuration
    pub session: SessionConfig,

    /// Transaction submission configuration
    pub submit: SubmitConfig,

    /// RPC endpoint configuration
    pub rpc: RpcConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&s)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }
}

/// Secure element session timeouts
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-command response timeout in seconds
    pub command_timeout_s: u64,

    /// Timeout waiting for a card tap in seconds
    pub tap_timeout_s: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_s: 5,
            tap_timeout_s: 60,
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_s)
    }

    pub fn tap_timeout(&self) -> Duration {
        Duration::from_secs(self.tap_timeout_s)
    }
}

/// Submission polling and retry configuration
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Status polling interval in seconds
    pub poll_interval_s: u64,

    /// Single transaction confirmation window in seconds
    pub confirm_timeout_s: u64,

    /// Bundle confirmation window in seconds
    pub bundle_timeout_s: u64,

    /// Overall resend budget in seconds
    pub retry_budget_s: u64,

    /// Delay between resend attempts in milliseconds
    pub retry_interval_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 5,
            confirm_timeout_s: 15,
            bundle_timeout_s: 60,
            retry_budget_s: 60,
            retry_interval_ms: 500,
        }
    }
}

impl SubmitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_s)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_s)
    }

    pub fn bundle_timeout(&self) -> Duration {
        Duration::from_secs(self.bundle_timeout_s)
    }

    pub fn retry_budget(&self) -> Duration {
        Duration::from_secs(self.retry_budget_s)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// RPC endpoints
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint for transaction submission and status
    pub url: String,

    /// Bundle relay endpoint
    pub bundle_url: String,

    /// HTTP request timeout in seconds
    pub timeout_s: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            bundle_url: "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string(),
            timeout_s: 10,
        }
    }
}
