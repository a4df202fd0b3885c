use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;
use crate::error::ConfigError;

fn default_max_retries() -> u32 {
  1
}

/// Retry settings for the execute phase of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
  /// Total number of execute attempts, including the first one.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Wait between two attempts, in milliseconds.
  #[serde(default)]
  pub wait_ms: u64,
  #[serde(default)]
  pub backoff: RetryBackoff,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      wait_ms: 0,
      backoff: RetryBackoff::default(),
    }
  }
}

impl RetryConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_retries == 0 {
      return Err(ConfigError::Invalid {
        message: "max_retries must be at least 1".to_string(),
      });
    }
    Ok(())
  }
}
