//! Error types for graph execution.

use std::fmt;

use thiserror::Error;

/// The lifecycle phase of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Prep,
  Exec,
  Post,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Prep => f.write_str("prep"),
      Phase::Exec => f.write_str("exec"),
      Phase::Post => f.write_str("post"),
    }
  }
}

/// Errors that can occur while running nodes and flows.
#[derive(Debug, Error)]
pub enum FlowError {
  /// A node phase failed. For `exec`, retries and the fallback were exhausted.
  #[error("node '{node}' failed during {phase}: {source}")]
  NodeFailed {
    node: String,
    phase: Phase,
    #[source]
    source: anyhow::Error,
  },

  /// One item of a batch node failed after retries and fallback.
  #[error("node '{node}' failed on batch item {index}: {source}")]
  ItemFailed {
    node: String,
    index: usize,
    #[source]
    source: anyhow::Error,
  },

  /// The engine was driven the wrong way. Never retried.
  #[error("misuse: {message}")]
  Misuse { message: String },

  #[error("invalid retry policy: {message}")]
  InvalidRetryPolicy { message: String },

  /// A batch flow's prep value was not a list of parameter objects.
  #[error("invalid parameter sets from flow '{flow}': {message}")]
  InvalidParamSets { flow: String, message: String },

  /// A node returned an action with no matching successor while the flow escalates misses.
  #[error("node '{node}' returned action '{action}' but only has successors for {available:?}")]
  UnmatchedAction {
    node: String,
    action: String,
    available: Vec<String>,
  },

  #[error("node {id} is not part of this graph")]
  UnknownNode { id: String },
}

impl FlowError {
  pub fn misuse(message: impl Into<String>) -> Self {
    FlowError::Misuse {
      message: message.into(),
    }
  }

  pub fn is_misuse(&self) -> bool {
    matches!(self, FlowError::Misuse { .. })
  }

  pub(crate) fn node(node: &str, phase: Phase, source: anyhow::Error) -> Self {
    // Engine errors raised inside a phase keep their own identity.
    match source.downcast::<FlowError>() {
      Ok(inner @ FlowError::Misuse { .. }) => inner,
      Ok(inner) => FlowError::NodeFailed {
        node: node.to_string(),
        phase,
        source: inner.into(),
      },
      Err(source) => FlowError::NodeFailed {
        node: node.to_string(),
        phase,
        source,
      },
    }
  }
}

/// Whether an error raised by a phase is an engine misuse.
pub(crate) fn is_misuse(error: &anyhow::Error) -> bool {
  error
    .downcast_ref::<FlowError>()
    .is_some_and(FlowError::is_misuse)
}
