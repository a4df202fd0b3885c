//! Transition graph: nodes and the action-labelled edges between them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use waypoint_context::{Params, SharedContext};

use crate::action::{Action, DEFAULT_ACTION};
use crate::error::FlowError;
use crate::events::{EventNotifier, FlowEvent, NoopNotifier, emit};
use crate::frame::new_run_id;
use crate::step::{IntoStep, Scope, Step, StepKind};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

/// Handle to a node, issued by [`Graph::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
  graph: u32,
  index: usize,
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}.{}", self.graph, self.index)
  }
}

pub(crate) struct Entry {
  pub(crate) name: String,
  pub(crate) step: Step,
  /// Action label -> successor.
  pub(crate) successors: HashMap<Action, NodeId>,
}

impl Entry {
  /// Labels this node has successors for, sorted.
  pub(crate) fn actions(&self) -> Vec<String> {
    let mut actions: Vec<String> = self
      .successors
      .keys()
      .map(|action| action.to_string())
      .collect();
    actions.sort();
    actions
  }
}

/// Arena of nodes wired together by action labels.
///
/// A graph is built once and then shared (behind an `Arc`) by any number of
/// flows and runs. Successors may be shared and cycles are allowed; a traversal
/// only stops when a node returns an action it has no successor for.
pub struct Graph {
  id: u32,
  nodes: Vec<Entry>,
  notifier: Arc<dyn EventNotifier>,
}

impl Default for Graph {
  fn default() -> Self {
    Self::new()
  }
}

impl Graph {
  /// Create a graph whose events are only logged.
  pub fn new() -> Self {
    Self::with_notifier(NoopNotifier)
  }

  /// Create a graph that reports wiring and traversal events to `notifier`.
  pub fn with_notifier(notifier: impl EventNotifier + 'static) -> Self {
    Self {
      id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
      nodes: Vec::new(),
      notifier: Arc::new(notifier),
    }
  }

  pub fn notifier(&self) -> &dyn EventNotifier {
    self.notifier.as_ref()
  }

  /// Add a node. `name` is used in events, logs and errors; it need not be unique.
  pub fn add(&mut self, name: impl Into<String>, step: impl IntoStep) -> NodeId {
    let id = NodeId {
      graph: self.id,
      index: self.nodes.len(),
    };
    self.nodes.push(Entry {
      name: name.into(),
      step: step.into_step(),
      successors: HashMap::new(),
    });
    id
  }

  /// Register `to` as the successor of `from` for the default action.
  ///
  /// # Panics
  ///
  /// Panics if either id was issued by another graph.
  pub fn add_successor(&mut self, from: NodeId, to: NodeId) -> NodeId {
    self.add_successor_on(from, DEFAULT_ACTION, to)
  }

  /// Register `to` as the successor of `from` for `action` and return `to`.
  ///
  /// Re-registering an action replaces the previous successor and emits
  /// [`FlowEvent::SuccessorOverwritten`].
  ///
  /// # Panics
  ///
  /// Panics if either id was issued by another graph.
  pub fn add_successor_on(&mut self, from: NodeId, action: impl Into<Action>, to: NodeId) -> NodeId {
    self.assert_owned(from);
    self.assert_owned(to);

    let action = action.into();
    let previous = self.nodes[from.index]
      .successors
      .insert(action.clone(), to);

    if let Some(previous) = previous {
      emit(
        self.notifier.as_ref(),
        FlowEvent::SuccessorOverwritten {
          node: self.nodes[from.index].name.clone(),
          action: action.to_string(),
          previous: self.nodes[previous.index].name.clone(),
          successor: self.nodes[to.index].name.clone(),
        },
      );
    }
    to
  }

  /// Two-step binding: `graph.on(a, "retry").then(b)` is `add_successor_on(a, "retry", b)`.
  pub fn on(&mut self, from: NodeId, action: impl Into<Action>) -> Transition<'_> {
    Transition {
      graph: self,
      from,
      action: action.into(),
    }
  }

  /// Fluent wiring starting at `from`: `graph.wire(a).then(b).then_on("ok", c)`.
  pub fn wire(&mut self, from: NodeId) -> Wiring<'_> {
    Wiring {
      graph: self,
      current: from,
    }
  }

  /// The successor registered for exactly `action`, if any.
  pub fn successor(&self, from: NodeId, action: &str) -> Option<NodeId> {
    self
      .entry(from)
      .ok()
      .and_then(|entry| entry.successors.get(action).copied())
  }

  /// Action labels `id` has successors for, sorted.
  pub fn actions(&self, id: NodeId) -> Vec<String> {
    self
      .entry(id)
      .map(|entry| entry.actions())
      .unwrap_or_default()
  }

  pub fn has_successors(&self, id: NodeId) -> bool {
    self
      .entry(id)
      .is_ok_and(|entry| !entry.successors.is_empty())
  }

  pub fn name(&self, id: NodeId) -> Option<&str> {
    self.entry(id).ok().map(|entry| entry.name.as_str())
  }

  pub fn contains(&self, id: NodeId) -> bool {
    id.graph == self.id && id.index < self.nodes.len()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Run a single node's lifecycle outside of any flow, with empty params.
  ///
  /// Successors are not followed; a node that has some emits
  /// [`FlowEvent::SuccessorsSkipped`]. Async nodes need [`Graph::run_node_async`].
  pub fn run_node(&self, id: NodeId, ctx: &SharedContext) -> Result<Action, FlowError> {
    self.run_node_with_params(id, ctx, Params::new())
  }

  pub fn run_node_with_params(
    &self,
    id: NodeId,
    ctx: &SharedContext,
    params: Params,
  ) -> Result<Action, FlowError> {
    let entry = self.entry(id)?;
    let StepKind::Sync(step) = &entry.step.0 else {
      return Err(FlowError::misuse(format!(
        "node '{}' is async, use run_node_async",
        entry.name
      )));
    };

    let run_id = new_run_id();
    self.warn_skipped_successors(entry, &run_id);
    step.run(ctx, &self.scope(entry, &run_id, params))
  }

  /// Async counterpart of [`Graph::run_node`]; also runs synchronous nodes.
  pub async fn run_node_async(&self, id: NodeId, ctx: &SharedContext) -> Result<Action, FlowError> {
    self.run_node_async_with_params(id, ctx, Params::new()).await
  }

  pub async fn run_node_async_with_params(
    &self,
    id: NodeId,
    ctx: &SharedContext,
    params: Params,
  ) -> Result<Action, FlowError> {
    let entry = self.entry(id)?;
    let run_id = new_run_id();
    self.warn_skipped_successors(entry, &run_id);

    let scope = self.scope(entry, &run_id, params);
    match &entry.step.0 {
      StepKind::Sync(step) => step.run_cooperative(ctx, &scope).await,
      StepKind::Async(step) => step.run(ctx, &scope).await,
    }
  }

  pub(crate) fn entry(&self, id: NodeId) -> Result<&Entry, FlowError> {
    if !self.contains(id) {
      return Err(FlowError::UnknownNode { id: id.to_string() });
    }
    Ok(&self.nodes[id.index])
  }

  fn scope<'a>(&'a self, entry: &'a Entry, run_id: &'a str, params: Params) -> Scope<'a> {
    Scope {
      node: &entry.name,
      run_id,
      params: Arc::new(params),
      notifier: self.notifier.as_ref(),
    }
  }

  fn warn_skipped_successors(&self, entry: &Entry, run_id: &str) {
    if !entry.successors.is_empty() {
      emit(
        self.notifier.as_ref(),
        FlowEvent::SuccessorsSkipped {
          run_id: run_id.to_string(),
          node: entry.name.clone(),
        },
      );
    }
  }

  fn assert_owned(&self, id: NodeId) {
    assert!(
      self.contains(id),
      "node {id} was not added to this graph"
    );
  }
}

impl fmt::Debug for Graph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut map = f.debug_map();
    for entry in &self.nodes {
      let successors: Vec<(String, &str)> = entry
        .actions()
        .into_iter()
        .filter_map(|action| {
          let to = entry.successors.get(action.as_str())?;
          Some((action, self.nodes[to.index].name.as_str()))
        })
        .collect();
      map.entry(&entry.name, &successors);
    }
    map.finish()
  }
}

/// Pending `(source, action)` binding created by [`Graph::on`].
#[must_use = "a transition does nothing until `then` is called"]
pub struct Transition<'g> {
  graph: &'g mut Graph,
  from: NodeId,
  action: Action,
}

impl Transition<'_> {
  /// Register `to` under the pending action and return it.
  pub fn then(self, to: NodeId) -> NodeId {
    self.graph.add_successor_on(self.from, self.action, to)
  }
}

/// Cursor for chained wiring created by [`Graph::wire`].
pub struct Wiring<'g> {
  graph: &'g mut Graph,
  current: NodeId,
}

impl<'g> Wiring<'g> {
  /// Wire `current -> to` on the default action and move to `to`.
  pub fn then(self, to: NodeId) -> Wiring<'g> {
    let Wiring { graph, current } = self;
    graph.add_successor(current, to);
    Wiring { graph, current: to }
  }

  /// Wire `current -> to` on `action` and move to `to`.
  pub fn then_on(self, action: impl Into<Action>, to: NodeId) -> Wiring<'g> {
    let Wiring { graph, current } = self;
    graph.add_successor_on(current, action, to);
    Wiring { graph, current: to }
  }

  pub fn current(&self) -> NodeId {
    self.current
  }
}
