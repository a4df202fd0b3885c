use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow::FlowConfig;
use crate::retry::RetryConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Retry settings a unit adopts through `with_retry_config`. Units built
  /// without it keep a single attempt.
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub flow: FlowConfig,
}

impl EngineConfig {
  /// Parse and validate a JSON document.
  pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
    let config: EngineConfig = serde_json::from_str(input)?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a JSON file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&content)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.retry.validate()
  }
}
