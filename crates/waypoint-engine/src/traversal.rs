//! The traversal loop shared by every flow type.

use std::sync::Arc;

use waypoint_config::{FlowConfig, UnmatchedAction};
use waypoint_context::{Params, SharedContext};

use crate::action::Action;
use crate::error::FlowError;
use crate::events::{EventNotifier, FlowEvent, emit};
use crate::graph::{Entry, Graph, NodeId};
use crate::step::{Scope, StepKind};

/// Walks a graph from `start`, following the action each node returns.
pub(crate) struct Traversal {
  graph: Arc<Graph>,
  start: NodeId,
  config: FlowConfig,
}

impl Traversal {
  pub(crate) fn new(graph: Arc<Graph>, start: NodeId) -> Result<Self, FlowError> {
    graph.entry(start)?;
    Ok(Self {
      graph,
      start,
      config: FlowConfig::default(),
    })
  }

  pub(crate) fn set_config(&mut self, config: FlowConfig) {
    self.config = config;
  }

  pub(crate) fn graph(&self) -> &Arc<Graph> {
    &self.graph
  }

  pub(crate) fn start(&self) -> NodeId {
    self.start
  }

  pub(crate) fn notifier(&self) -> &dyn EventNotifier {
    self.graph.notifier()
  }

  /// Run one traversal in the synchronous regime and return the last action.
  pub(crate) fn run_blocking(
    &self,
    ctx: &SharedContext,
    params: Arc<Params>,
    run_id: &str,
  ) -> Result<Action, FlowError> {
    let mut current = self.start;
    loop {
      let entry = self.graph.entry(current)?;
      let scope = self.visit(entry, &params, run_id);
      let action = match &entry.step.0 {
        StepKind::Sync(step) => step.run(ctx, &scope)?,
        StepKind::Async(_) => return Err(async_in_sync_flow(entry)),
      };
      self.completed(entry, &action, run_id);

      match self.next(entry, &action, run_id)? {
        Some(next) => current = next,
        None => return Ok(action),
      }
    }
  }

  /// Run one traversal in the cooperative regime. Synchronous nodes run in
  /// place, with their retry waits yielding to the runtime.
  pub(crate) async fn run_async(
    &self,
    ctx: &SharedContext,
    params: Arc<Params>,
    run_id: &str,
  ) -> Result<Action, FlowError> {
    self.run_cooperative(ctx, params, run_id, true).await
  }

  /// Synchronous traversal driven from an async flow, used when a sync flow is
  /// nested inside an async one. Async nodes are still rejected.
  pub(crate) async fn run_sync_nested(
    &self,
    ctx: &SharedContext,
    params: Arc<Params>,
    run_id: &str,
  ) -> Result<Action, FlowError> {
    self.run_cooperative(ctx, params, run_id, false).await
  }

  async fn run_cooperative(
    &self,
    ctx: &SharedContext,
    params: Arc<Params>,
    run_id: &str,
    allow_async: bool,
  ) -> Result<Action, FlowError> {
    let mut current = self.start;
    loop {
      let entry = self.graph.entry(current)?;
      let scope = self.visit(entry, &params, run_id);
      let action = match &entry.step.0 {
        StepKind::Sync(step) => step.run_cooperative(ctx, &scope).await?,
        StepKind::Async(step) if allow_async => step.run(ctx, &scope).await?,
        StepKind::Async(_) => return Err(async_in_sync_flow(entry)),
      };
      self.completed(entry, &action, run_id);

      match self.next(entry, &action, run_id)? {
        Some(next) => current = next,
        None => return Ok(action),
      }
    }
  }

  fn visit<'a>(&'a self, entry: &'a Entry, params: &Arc<Params>, run_id: &'a str) -> Scope<'a> {
    emit(
      self.notifier(),
      FlowEvent::NodeStarted {
        run_id: run_id.to_string(),
        node: entry.name.clone(),
      },
    );
    Scope {
      node: &entry.name,
      run_id,
      params: params.clone(),
      notifier: self.notifier(),
    }
  }

  fn completed(&self, entry: &Entry, action: &Action, run_id: &str) {
    emit(
      self.notifier(),
      FlowEvent::NodeCompleted {
        run_id: run_id.to_string(),
        node: entry.name.clone(),
        action: action.to_string(),
      },
    );
  }

  /// Exact lookup of `action`; a miss on a node with successors ends the
  /// traversal early (or fails it, depending on the config).
  fn next(&self, entry: &Entry, action: &Action, run_id: &str) -> Result<Option<NodeId>, FlowError> {
    if let Some(next) = entry.successors.get(action) {
      return Ok(Some(*next));
    }
    if entry.successors.is_empty() {
      return Ok(None);
    }

    match self.config.on_unmatched_action {
      UnmatchedAction::Warn => {
        emit(
          self.notifier(),
          FlowEvent::FlowEndedEarly {
            run_id: run_id.to_string(),
            node: entry.name.clone(),
            action: action.to_string(),
            available: entry.actions(),
          },
        );
        Ok(None)
      }
      UnmatchedAction::Error => Err(FlowError::UnmatchedAction {
        node: entry.name.clone(),
        action: action.to_string(),
        available: entry.actions(),
      }),
    }
  }
}

fn async_in_sync_flow(entry: &Entry) -> FlowError {
  FlowError::misuse(format!(
    "node '{}' is async and can only run in an async flow",
    entry.name
  ))
}

/// Emit the terminal event of a top-level run.
pub(crate) fn report(
  notifier: &dyn EventNotifier,
  run_id: &str,
  flow: &str,
  result: &Result<Action, FlowError>,
) {
  let event = match result {
    Ok(action) => FlowEvent::FlowCompleted {
      run_id: run_id.to_string(),
      flow: flow.to_string(),
      action: action.to_string(),
    },
    Err(e) => FlowEvent::FlowFailed {
      run_id: run_id.to_string(),
      flow: flow.to_string(),
      error: e.to_string(),
    },
  };
  emit(notifier, event);
}
