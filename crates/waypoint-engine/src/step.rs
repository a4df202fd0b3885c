//! Type-erased runners stored in a graph.

use std::sync::Arc;

use async_trait::async_trait;
use waypoint_context::{Params, SharedContext};

use crate::action::Action;
use crate::error::FlowError;
use crate::events::EventNotifier;
use crate::frame::Frame;

/// What a runner knows about the visit it is executing.
pub(crate) struct Scope<'a> {
  pub(crate) node: &'a str,
  pub(crate) run_id: &'a str,
  pub(crate) params: Arc<Params>,
  pub(crate) notifier: &'a dyn EventNotifier,
}

impl Scope<'_> {
  pub(crate) fn frame(&self, max_retries: u32) -> Frame {
    Frame::for_visit(
      self.node.into(),
      self.run_id.into(),
      self.params.clone(),
      max_retries,
    )
  }
}

/// Full lifecycle of a node in the synchronous regime.
#[async_trait]
pub(crate) trait SyncStep: Send + Sync {
  fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError>;

  /// Same lifecycle driven from an async traversal. Retry waits and nested
  /// traversals yield to the runtime instead of blocking the thread.
  async fn run_cooperative(
    &self,
    ctx: &SharedContext,
    scope: &Scope<'_>,
  ) -> Result<Action, FlowError>;
}

/// Full lifecycle of a node in the cooperative-concurrent regime.
#[async_trait]
pub(crate) trait AsyncStep: Send + Sync {
  async fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError>;
}

pub(crate) enum StepKind {
  Sync(Box<dyn SyncStep>),
  Async(Box<dyn AsyncStep>),
}

/// A node ready to be placed in a [`crate::Graph`].
pub struct Step(pub(crate) StepKind);

impl Step {
  pub(crate) fn blocking(step: impl SyncStep + 'static) -> Self {
    Step(StepKind::Sync(Box::new(step)))
  }

  pub(crate) fn cooperative(step: impl AsyncStep + 'static) -> Self {
    Step(StepKind::Async(Box::new(step)))
  }

  /// Whether the step only runs in the async regime.
  pub fn is_async(&self) -> bool {
    matches!(self.0, StepKind::Async(_))
  }
}

/// Conversion into a graph node. Implemented by the unit wrappers and all flows.
pub trait IntoStep {
  fn into_step(self) -> Step;
}

impl IntoStep for Step {
  fn into_step(self) -> Step {
    self
  }
}
