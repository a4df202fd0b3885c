use serde::{Deserialize, Serialize};

/// How the items of a batch (or the runs of a batch flow) are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
  #[default]
  Sequential,
  #[serde(alias = "parallel")]
  Concurrent,
}

/// Growth of the wait between two execute attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  #[default]
  Constant,
  Linear,
  Exponential,
}

/// What a traversal does when a node returns an action none of its successors listens for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedAction {
  /// End the traversal and emit a warning.
  #[default]
  Warn,
  /// Fail the traversal.
  Error,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_batch_mode_accepts_parallel_alias() {
    let mode: BatchMode = serde_json::from_str("\"parallel\"").unwrap();
    assert_eq!(mode, BatchMode::Concurrent);

    let mode: BatchMode = serde_json::from_str("\"concurrent\"").unwrap();
    assert_eq!(mode, BatchMode::Concurrent);
    assert_eq!(serde_json::to_string(&mode).unwrap(), "\"concurrent\"");
  }

  #[test]
  fn test_defaults() {
    assert_eq!(BatchMode::default(), BatchMode::Sequential);
    assert_eq!(RetryBackoff::default(), RetryBackoff::Constant);
    assert_eq!(UnmatchedAction::default(), UnmatchedAction::Warn);
  }
}
