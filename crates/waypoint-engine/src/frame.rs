use std::sync::Arc;

use serde_json::Value;
use waypoint_context::Params;

/// Per-visit execution state of a node.
///
/// Node values are shared by every traversal that reaches them, so anything
/// that changes while a node runs lives here instead. A fresh frame is built for
/// each visit and for each batch item.
#[derive(Debug, Clone)]
pub struct Frame {
  node: Arc<str>,
  run_id: Arc<str>,
  params: Arc<Params>,
  retry: u32,
  max_retries: u32,
  item: Option<usize>,
}

impl Frame {
  /// Build a standalone frame, e.g. to call a node's phases outside a flow.
  pub fn new(node: impl Into<Arc<str>>, params: Params) -> Self {
    Self::for_visit(
      node.into(),
      new_run_id().into(),
      Arc::new(params),
      1,
    )
  }

  pub(crate) fn for_visit(
    node: Arc<str>,
    run_id: Arc<str>,
    params: Arc<Params>,
    max_retries: u32,
  ) -> Self {
    Self {
      node,
      run_id,
      params,
      retry: 0,
      max_retries,
      item: None,
    }
  }

  pub(crate) fn for_item(&self, index: usize) -> Self {
    Self {
      retry: 0,
      item: Some(index),
      ..self.clone()
    }
  }

  pub(crate) fn next_retry(&mut self) {
    self.retry += 1;
  }

  /// Name the node was registered under.
  pub fn node(&self) -> &str {
    &self.node
  }

  /// Identifier shared by every node visited in one top-level run.
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Parameters injected by the orchestrator for this visit.
  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn param(&self, key: &str) -> Option<&Value> {
    self.params.get(key)
  }

  /// Zero-based index of the current execute attempt.
  ///
  /// Inside `exec_fallback` this is the index of the last failed attempt.
  pub fn retry(&self) -> u32 {
    self.retry
  }

  pub fn max_retries(&self) -> u32 {
    self.max_retries
  }

  pub fn is_last_attempt(&self) -> bool {
    self.retry + 1 >= self.max_retries
  }

  /// Position of the item being executed when running a batch node.
  pub fn item(&self) -> Option<usize> {
    self.item
  }
}

pub(crate) fn new_run_id() -> String {
  uuid::Uuid::new_v4().to_string()
}
