//! Units of work: a node plus the retry policy around its execute phase.

use std::future::ready;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use waypoint_config::{BatchMode, RetryConfig};
use waypoint_context::SharedContext;

use crate::action::Action;
use crate::error::{FlowError, Phase};
use crate::frame::Frame;
use crate::node::{AsyncBatchNode, AsyncNode, BatchNode, Node};
use crate::retry::{RetryPolicy, execute_async, execute_blocking};
use crate::step::{AsyncStep, IntoStep, Scope, Step, SyncStep};

/// A synchronous [`Node`] with its retry policy.
pub struct Unit<N> {
  node: N,
  policy: RetryPolicy,
}

impl<N: Node> Unit<N> {
  /// Wrap `node` with a single attempt and no wait.
  pub fn new(node: N) -> Self {
    Self {
      node,
      policy: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_retry_config(self, config: &RetryConfig) -> Result<Self, FlowError> {
    Ok(self.with_retry(RetryPolicy::try_from(config)?))
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }
}

#[async_trait]
impl<N: Node> SyncStep for Unit<N> {
  fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let mut frame = scope.frame(self.policy.max_retries());
    let prep = self
      .node
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;
    let exec = execute_blocking(
      &self.policy,
      &mut frame,
      scope.notifier,
      |frame| self.node.exec(&prep, frame),
      |error, frame| self.node.exec_fallback(&prep, error, frame),
    )
    .map_err(|e| FlowError::node(scope.node, Phase::Exec, e))?;
    self
      .node
      .post(ctx, prep, exec, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }

  async fn run_cooperative(
    &self,
    ctx: &SharedContext,
    scope: &Scope<'_>,
  ) -> Result<Action, FlowError> {
    let mut frame = scope.frame(self.policy.max_retries());
    let prep = self
      .node
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let node = &self.node;
    let prep_ref = &prep;
    let exec = execute_async(
      &self.policy,
      &mut frame,
      scope.notifier,
      move |frame| ready(node.exec(prep_ref, &frame)),
      move |error, frame| ready(node.exec_fallback(prep_ref, error, &frame)),
    )
    .await
    .map_err(|e| FlowError::node(scope.node, Phase::Exec, e))?;

    self
      .node
      .post(ctx, prep, exec, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

impl<N: Node + 'static> IntoStep for Unit<N> {
  fn into_step(self) -> Step {
    Step::blocking(self)
  }
}

/// A synchronous [`BatchNode`]; items run one after another.
pub struct BatchUnit<N> {
  node: N,
  policy: RetryPolicy,
}

impl<N: BatchNode> BatchUnit<N> {
  pub fn new(node: N) -> Self {
    Self {
      node,
      policy: RetryPolicy::default(),
    }
  }

  /// The policy applies to each item on its own.
  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_retry_config(self, config: &RetryConfig) -> Result<Self, FlowError> {
    Ok(self.with_retry(RetryPolicy::try_from(config)?))
  }
}

#[async_trait]
impl<N: BatchNode> SyncStep for BatchUnit<N> {
  fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let frame = scope.frame(self.policy.max_retries());
    let items = self
      .node
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
      let mut item_frame = frame.for_item(index);
      let result = execute_blocking(
        &self.policy,
        &mut item_frame,
        scope.notifier,
        |frame| self.node.exec(item, frame),
        |error, frame| self.node.exec_fallback(item, error, frame),
      )
      .map_err(|e| item_error(scope.node, index, e))?;
      results.push(result);
    }

    self
      .node
      .post(ctx, items, results, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }

  async fn run_cooperative(
    &self,
    ctx: &SharedContext,
    scope: &Scope<'_>,
  ) -> Result<Action, FlowError> {
    let frame = scope.frame(self.policy.max_retries());
    let items = self
      .node
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let node = &self.node;
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
      let mut item_frame = frame.for_item(index);
      let result = execute_async(
        &self.policy,
        &mut item_frame,
        scope.notifier,
        move |frame| ready(node.exec(item, &frame)),
        move |error, frame| ready(node.exec_fallback(item, error, &frame)),
      )
      .await
      .map_err(|e| item_error(scope.node, index, e))?;
      results.push(result);
    }

    self
      .node
      .post(ctx, items, results, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

impl<N: BatchNode + 'static> IntoStep for BatchUnit<N> {
  fn into_step(self) -> Step {
    Step::blocking(self)
  }
}

/// An [`AsyncNode`] with its retry policy.
pub struct AsyncUnit<N> {
  node: N,
  policy: RetryPolicy,
}

impl<N: AsyncNode> AsyncUnit<N> {
  pub fn new(node: N) -> Self {
    Self {
      node,
      policy: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_retry_config(self, config: &RetryConfig) -> Result<Self, FlowError> {
    Ok(self.with_retry(RetryPolicy::try_from(config)?))
  }
}

#[async_trait]
impl<N: AsyncNode> AsyncStep for AsyncUnit<N> {
  async fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let mut frame = scope.frame(self.policy.max_retries());
    let prep = self
      .node
      .prep(ctx, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let node = &self.node;
    let prep_ref = &prep;
    let exec = execute_async(
      &self.policy,
      &mut frame,
      scope.notifier,
      move |frame| async move { node.exec(prep_ref, &frame).await },
      move |error, frame| async move { node.exec_fallback(prep_ref, error, &frame).await },
    )
    .await
    .map_err(|e| FlowError::node(scope.node, Phase::Exec, e))?;

    self
      .node
      .post(ctx, prep, exec, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

impl<N: AsyncNode + 'static> IntoStep for AsyncUnit<N> {
  fn into_step(self) -> Step {
    Step::cooperative(self)
  }
}

/// An [`AsyncBatchNode`] with its retry policy and scheduling mode.
///
/// In [`BatchMode::Concurrent`] all items are polled together and the first
/// item whose fallback re-raises fails the whole batch; the remaining items
/// are dropped without a defined partial result.
pub struct AsyncBatchUnit<N> {
  node: N,
  policy: RetryPolicy,
  mode: BatchMode,
}

impl<N: AsyncBatchNode> AsyncBatchUnit<N> {
  pub fn new(node: N, mode: BatchMode) -> Self {
    Self {
      node,
      policy: RetryPolicy::default(),
      mode,
    }
  }

  pub fn sequential(node: N) -> Self {
    Self::new(node, BatchMode::Sequential)
  }

  pub fn concurrent(node: N) -> Self {
    Self::new(node, BatchMode::Concurrent)
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_retry_config(self, config: &RetryConfig) -> Result<Self, FlowError> {
    Ok(self.with_retry(RetryPolicy::try_from(config)?))
  }

  pub fn mode(&self) -> BatchMode {
    self.mode
  }

  async fn exec_item(
    &self,
    index: usize,
    item: &Value,
    frame: &Frame,
    scope: &Scope<'_>,
  ) -> Result<Value, FlowError> {
    let node = &self.node;
    let mut item_frame = frame.for_item(index);
    execute_async(
      &self.policy,
      &mut item_frame,
      scope.notifier,
      move |frame| async move { node.exec(item, &frame).await },
      move |error, frame| async move { node.exec_fallback(item, error, &frame).await },
    )
    .await
    .map_err(|e| item_error(scope.node, index, e))
  }
}

#[async_trait]
impl<N: AsyncBatchNode> AsyncStep for AsyncBatchUnit<N> {
  async fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let frame = scope.frame(self.policy.max_retries());
    let items = self
      .node
      .prep(ctx, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let results = match self.mode {
      BatchMode::Sequential => {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
          results.push(self.exec_item(index, item, &frame, scope).await?);
        }
        results
      }
      BatchMode::Concurrent => {
        try_join_all(
          items
            .iter()
            .enumerate()
            .map(|(index, item)| self.exec_item(index, item, &frame, scope)),
        )
        .await?
      }
    };

    self
      .node
      .post(ctx, items, results, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

impl<N: AsyncBatchNode + 'static> IntoStep for AsyncBatchUnit<N> {
  fn into_step(self) -> Step {
    Step::cooperative(self)
  }
}

fn item_error(node: &str, index: usize, source: anyhow::Error) -> FlowError {
  match FlowError::node(node, Phase::Exec, source) {
    FlowError::NodeFailed { source, .. } => FlowError::ItemFailed {
      node: node.to_string(),
      index,
      source,
    },
    other => other,
  }
}
