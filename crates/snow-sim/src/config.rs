//! Simulator configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snow_consensus::snowball::network::ConsensusKind;
use snow_consensus::snowball::FactoryKind;
use snow_consensus::{Parameters, ParametersError};
use snow_utils::logging::LogConfig;
use thiserror::Error;

/// Simulator configuration, stored as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Confidence semantics of every node
    pub factory: FactoryKind,
    /// Tree or flat consensus on every node
    pub consensus: ConsensusKind,
    /// Consensus parameters shared by every node
    pub parameters: Parameters,
    /// Network shape
    pub network: NetworkConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

/// Shape of the simulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of nodes
    pub nodes: usize,
    /// Number of conflicting colors
    pub colors: usize,
    /// Seed of the random source
    pub seed: u64,
    /// Rounds after which the simulation gives up
    pub max_rounds: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            nodes: 100,
            colors: 50,
            seed: 0,
            max_rounds: 5_000_000,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            factory: FactoryKind::default(),
            consensus: ConsensusKind::default(),
            parameters: Parameters::default(),
            network: NetworkConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.verify()?;

        if self.network.nodes == 0 {
            return Err(ConfigError::InvalidValue("nodes cannot be 0".to_string()));
        }
        if self.network.colors == 0 {
            return Err(ConfigError::InvalidValue("colors cannot be 0".to_string()));
        }
        if self.network.max_rounds == 0 {
            return Err(ConfigError::InvalidValue("max_rounds cannot be 0".to_string()));
        }
        if self.parameters.k > self.network.nodes {
            return Err(ConfigError::InvalidValue(format!(
                "k = {} exceeds the number of nodes ({})",
                self.parameters.k, self.network.nodes
            )));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("serialize error: {0}")]
    SerializeError(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    InvalidParameters(#[from] ParametersError),
}
