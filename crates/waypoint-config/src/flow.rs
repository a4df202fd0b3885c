use serde::{Deserialize, Serialize};

use crate::enums::UnmatchedAction;

/// Traversal behaviour of a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
  #[serde(default)]
  pub on_unmatched_action: UnmatchedAction,
}
