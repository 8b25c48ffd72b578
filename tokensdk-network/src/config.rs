//! Adapter configuration.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};

pub const NETWORK_ENV: &str = "TOKENSDK_NETWORK";
pub const CHANNEL_ENV: &str = "TOKENSDK_CHANNEL";

/// Which network and ledger partition the adapter talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name.
    pub network: String,
    /// Ledger partition (channel) name.
    pub channel: String,
}

impl NetworkConfig {
    pub fn new(network: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            channel: channel.into(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> NetworkResult<Self> {
        fn get_env(name: &str) -> NetworkResult<String> {
            env::var(name).map_err(|_| {
                NetworkError::InvalidConfig(format!("missing required environment variable {name}"))
            })
        }

        let config = Self::new(get_env(NETWORK_ENV)?, get_env(CHANNEL_ENV)?);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NetworkResult<()> {
        if self.network.trim().is_empty() {
            return Err(NetworkError::InvalidConfig("network name is empty".into()));
        }
        if self.channel.trim().is_empty() {
            return Err(NetworkError::InvalidConfig("channel name is empty".into()));
        }
        Ok(())
    }
}
