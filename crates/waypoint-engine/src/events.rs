//! Flow events and notifiers for observability.
//!
//! Events are emitted while graphs are wired and traversed. Every event is
//! logged through `tracing`; the graph's [`EventNotifier`] then receives it so
//! consumers can assert on warnings, persist progress, stream to a UI, etc.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted during wiring and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
  /// A top-level flow run has started.
  FlowStarted { run_id: String, flow: String },

  /// A top-level flow run has completed.
  FlowCompleted {
    run_id: String,
    flow: String,
    action: String,
  },

  /// A top-level flow run has failed.
  FlowFailed {
    run_id: String,
    flow: String,
    error: String,
  },

  /// A traversal is about to run a node.
  NodeStarted { run_id: String, node: String },

  /// A node finished its lifecycle and returned `action`.
  NodeCompleted {
    run_id: String,
    node: String,
    action: String,
  },

  /// An execute attempt failed and another one will follow.
  RetryScheduled {
    run_id: String,
    node: String,
    item: Option<usize>,
    attempt: u32,
    max_retries: u32,
    delay_ms: u64,
    error: String,
  },

  /// All execute attempts failed; the fallback is being invoked.
  FallbackInvoked {
    run_id: String,
    node: String,
    item: Option<usize>,
    attempts: u32,
    error: String,
  },

  /// A successor was registered under a label that already had one.
  SuccessorOverwritten {
    node: String,
    action: String,
    previous: String,
    successor: String,
  },

  /// A node with successors was run directly; its successors will not run.
  SuccessorsSkipped { run_id: String, node: String },

  /// A traversal stopped because no successor matched the returned action.
  FlowEndedEarly {
    run_id: String,
    node: String,
    action: String,
    available: Vec<String>,
  },
}

impl FlowEvent {
  /// Structural warnings: wiring overwrites, skipped successors, early ends.
  pub fn is_warning(&self) -> bool {
    matches!(
      self,
      FlowEvent::SuccessorOverwritten { .. }
        | FlowEvent::SuccessorsSkipped { .. }
        | FlowEvent::FlowEndedEarly { .. }
    )
  }
}

/// Trait for receiving flow events.
///
/// The engine calls `notify` for each event after logging it. Implementations
/// decide what to do with them (persist, broadcast, record, ignore, etc.).
pub trait EventNotifier: Send + Sync {
  /// Called when an event occurs.
  fn notify(&self, event: FlowEvent);
}

/// A no-op notifier that discards all events. Logging still happens.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
  fn notify(&self, _event: FlowEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a traversal; volume is a few
  // events per node visit.
  sender: mpsc::UnboundedSender<FlowEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<FlowEvent>) -> Self {
    Self { sender }
  }
}

impl EventNotifier for ChannelNotifier {
  fn notify(&self, event: FlowEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// A notifier that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
  events: Mutex<Vec<FlowEvent>>,
}

impl MemoryNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  /// All events received so far, in emission order.
  pub fn events(&self) -> Vec<FlowEvent> {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Only the structural warnings.
  pub fn warnings(&self) -> Vec<FlowEvent> {
    self
      .events()
      .into_iter()
      .filter(FlowEvent::is_warning)
      .collect()
  }

  pub fn clear(&self) {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }
}

impl EventNotifier for MemoryNotifier {
  fn notify(&self, event: FlowEvent) {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(event);
  }
}

impl<N: EventNotifier + ?Sized> EventNotifier for std::sync::Arc<N> {
  fn notify(&self, event: FlowEvent) {
    (**self).notify(event);
  }
}

/// Log `event` and hand it to `notifier`.
pub(crate) fn emit(notifier: &dyn EventNotifier, event: FlowEvent) {
  match &event {
    FlowEvent::FlowStarted { run_id, flow } => {
      info!(run_id = %run_id, flow = %flow, "flow_started");
    }
    FlowEvent::FlowCompleted {
      run_id,
      flow,
      action,
    } => {
      info!(run_id = %run_id, flow = %flow, action = %action, "flow_completed");
    }
    FlowEvent::FlowFailed {
      run_id,
      flow,
      error,
    } => {
      tracing::error!(run_id = %run_id, flow = %flow, error = %error, "flow_failed");
    }
    FlowEvent::NodeStarted { run_id, node } => {
      debug!(run_id = %run_id, node = %node, "node_started");
    }
    FlowEvent::NodeCompleted {
      run_id,
      node,
      action,
    } => {
      debug!(run_id = %run_id, node = %node, action = %action, "node_completed");
    }
    FlowEvent::RetryScheduled {
      run_id,
      node,
      item,
      attempt,
      max_retries,
      delay_ms,
      error,
    } => {
      warn!(
        run_id = %run_id,
        node = %node,
        item = ?item,
        attempt,
        max_retries,
        delay_ms,
        error = %error,
        "retrying exec"
      );
    }
    FlowEvent::FallbackInvoked {
      run_id,
      node,
      item,
      attempts,
      error,
    } => {
      warn!(
        run_id = %run_id,
        node = %node,
        item = ?item,
        attempts,
        error = %error,
        "exec attempts exhausted, invoking fallback"
      );
    }
    FlowEvent::SuccessorOverwritten {
      node,
      action,
      previous,
      successor,
    } => {
      warn!(
        node = %node,
        action = %action,
        previous = %previous,
        successor = %successor,
        "overwriting successor for action"
      );
    }
    FlowEvent::SuccessorsSkipped { run_id, node } => {
      warn!(run_id = %run_id, node = %node, "node won't run successors, use a flow");
    }
    FlowEvent::FlowEndedEarly {
      run_id,
      node,
      action,
      available,
    } => {
      warn!(
        run_id = %run_id,
        node = %node,
        action = %action,
        available = ?available,
        "flow ends: action not found in successors"
      );
    }
  }
  notifier.notify(event);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_memory_notifier_filters_warnings() {
    let notifier = MemoryNotifier::new();
    emit(
      &notifier,
      FlowEvent::NodeStarted {
        run_id: "run".to_string(),
        node: "a".to_string(),
      },
    );
    emit(
      &notifier,
      FlowEvent::SuccessorsSkipped {
        run_id: "run".to_string(),
        node: "a".to_string(),
      },
    );

    assert_eq!(notifier.events().len(), 2);
    assert_eq!(
      notifier.warnings(),
      vec![FlowEvent::SuccessorsSkipped {
        run_id: "run".to_string(),
        node: "a".to_string(),
      }]
    );

    notifier.clear();
    assert!(notifier.events().is_empty());
  }

  #[tokio::test]
  async fn test_channel_notifier() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    notifier.notify(FlowEvent::FlowStarted {
      run_id: "run".to_string(),
      flow: "flow".to_string(),
    });

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, FlowEvent::FlowStarted { ref flow, .. } if flow == "flow"));
  }

  #[test]
  fn test_channel_notifier_ignores_dropped_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(FlowEvent::FlowStarted {
      run_id: "run".to_string(),
      flow: "flow".to_string(),
    });
  }
}
