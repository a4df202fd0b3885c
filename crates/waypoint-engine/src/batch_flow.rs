//! Batch flows: run the same traversal once per parameter set.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, instrument};
use waypoint_config::{BatchMode, FlowConfig};
use waypoint_context::{Params, SharedContext, merge_params};

use crate::action::Action;
use crate::error::{FlowError, Phase};
use crate::flow::{emit_started, nested_scope};
use crate::frame::new_run_id;
use crate::graph::{Graph, NodeId};
use crate::node::{AsyncFlowHooks, DefaultHooks, FlowHooks};
use crate::step::{AsyncStep, IntoStep, Scope, Step, SyncStep};
use crate::traversal::{Traversal, report};

/// Synchronous batch flow.
///
/// The hooks' `prep` returns the parameter sets as a JSON array of objects.
/// The traversal runs once per set, in order, with the flow's params overlaid
/// by that set. `post` receives `None` as the last action.
pub struct BatchFlow<H = DefaultHooks> {
  name: String,
  traversal: Traversal,
  params: Params,
  hooks: H,
}

impl BatchFlow<DefaultHooks> {
  pub fn new(graph: Arc<Graph>, start: NodeId) -> Result<Self, FlowError> {
    Ok(Self {
      name: "batch_flow".to_string(),
      traversal: Traversal::new(graph, start)?,
      params: Params::new(),
      hooks: DefaultHooks,
    })
  }
}

impl<H: FlowHooks> BatchFlow<H> {
  pub fn with_hooks<T: FlowHooks>(self, hooks: T) -> BatchFlow<T> {
    BatchFlow {
      name: self.name,
      traversal: self.traversal,
      params: self.params,
      hooks,
    }
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn with_config(mut self, config: FlowConfig) -> Self {
    self.traversal.set_config(config);
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn graph(&self) -> &Arc<Graph> {
    self.traversal.graph()
  }

  #[instrument(name = "flow_run", skip_all, fields(flow = %self.name))]
  pub fn run(&self, ctx: &SharedContext) -> Result<Action, FlowError> {
    let run_id = new_run_id();
    let notifier = self.traversal.notifier();
    emit_started(notifier, &run_id, &self.name);

    let scope = Scope {
      node: &self.name,
      run_id: &run_id,
      params: Arc::new(self.params.clone()),
      notifier,
    };
    let result = self.run_scoped(ctx, &scope);
    report(notifier, &run_id, &self.name, &result);
    result
  }

  fn run_scoped(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let frame = scope.frame(1);
    let prep = self
      .hooks
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let sets = param_sets(scope.node, &prep)?;
    debug!(flow = %scope.node, runs = sets.len(), "running batch flow");
    for set in &sets {
      let params = Arc::new(merge_params(&scope.params, set));
      self.traversal.run_blocking(ctx, params, scope.run_id)?;
    }

    self
      .hooks
      .post(ctx, prep, None, &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

#[async_trait]
impl<H: FlowHooks> SyncStep for BatchFlow<H> {
  fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let nested = nested_scope(&self.params, scope);
    self.run_scoped(ctx, &nested)
  }

  async fn run_cooperative(
    &self,
    ctx: &SharedContext,
    scope: &Scope<'_>,
  ) -> Result<Action, FlowError> {
    let nested = nested_scope(&self.params, scope);
    let frame = nested.frame(1);
    let prep = self
      .hooks
      .prep(ctx, &frame)
      .map_err(|e| FlowError::node(nested.node, Phase::Prep, e))?;

    for set in &param_sets(nested.node, &prep)? {
      let params = Arc::new(merge_params(&nested.params, set));
      self
        .traversal
        .run_sync_nested(ctx, params, nested.run_id)
        .await?;
    }

    self
      .hooks
      .post(ctx, prep, None, &frame)
      .map_err(|e| FlowError::node(nested.node, Phase::Post, e))
  }
}

impl<H: FlowHooks + 'static> IntoStep for BatchFlow<H> {
  fn into_step(self) -> Step {
    Step::blocking(self)
  }
}

/// Async batch flow. Runs sequentially by default; in
/// [`BatchMode::Concurrent`] every traversal is polled together and the first
/// failure fails the batch.
pub struct AsyncBatchFlow<H = DefaultHooks> {
  name: String,
  traversal: Traversal,
  params: Params,
  hooks: H,
  mode: BatchMode,
}

impl AsyncBatchFlow<DefaultHooks> {
  pub fn new(graph: Arc<Graph>, start: NodeId) -> Result<Self, FlowError> {
    Ok(Self {
      name: "async_batch_flow".to_string(),
      traversal: Traversal::new(graph, start)?,
      params: Params::new(),
      hooks: DefaultHooks,
      mode: BatchMode::Sequential,
    })
  }
}

impl<H: AsyncFlowHooks> AsyncBatchFlow<H> {
  pub fn with_hooks<T: AsyncFlowHooks>(self, hooks: T) -> AsyncBatchFlow<T> {
    AsyncBatchFlow {
      name: self.name,
      traversal: self.traversal,
      params: self.params,
      hooks,
      mode: self.mode,
    }
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn with_config(mut self, config: FlowConfig) -> Self {
    self.traversal.set_config(config);
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_mode(mut self, mode: BatchMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn concurrent(self) -> Self {
    self.with_mode(BatchMode::Concurrent)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn mode(&self) -> BatchMode {
    self.mode
  }

  pub fn graph(&self) -> &Arc<Graph> {
    self.traversal.graph()
  }

  #[instrument(name = "flow_run", skip_all, fields(flow = %self.name, mode = ?self.mode))]
  pub async fn run(&self, ctx: &SharedContext) -> Result<Action, FlowError> {
    let run_id = new_run_id();
    let notifier = self.traversal.notifier();
    emit_started(notifier, &run_id, &self.name);

    let scope = Scope {
      node: &self.name,
      run_id: &run_id,
      params: Arc::new(self.params.clone()),
      notifier,
    };
    let result = self.run_scoped(ctx, &scope).await;
    report(notifier, &run_id, &self.name, &result);
    result
  }

  async fn run_scoped(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let frame = scope.frame(1);
    let prep = self
      .hooks
      .prep(ctx, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Prep, e))?;

    let sets = param_sets(scope.node, &prep)?;
    debug!(flow = %scope.node, runs = sets.len(), mode = ?self.mode, "running batch flow");
    match self.mode {
      BatchMode::Sequential => {
        for set in &sets {
          let params = Arc::new(merge_params(&scope.params, set));
          self.traversal.run_async(ctx, params, scope.run_id).await?;
        }
      }
      BatchMode::Concurrent => {
        try_join_all(sets.iter().map(|set| {
          let params = Arc::new(merge_params(&scope.params, set));
          self.traversal.run_async(ctx, params, scope.run_id)
        }))
        .await?;
      }
    }

    self
      .hooks
      .post(ctx, prep, None, &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

#[async_trait]
impl<H: AsyncFlowHooks> AsyncStep for AsyncBatchFlow<H> {
  async fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let nested = nested_scope(&self.params, scope);
    self.run_scoped(ctx, &nested).await
  }
}

impl<H: AsyncFlowHooks + 'static> IntoStep for AsyncBatchFlow<H> {
  fn into_step(self) -> Step {
    Step::cooperative(self)
  }
}

/// Interpret a batch flow's prep value: `null` for no runs, otherwise an array
/// of JSON objects.
fn param_sets(flow: &str, prep: &Value) -> Result<Vec<Params>, FlowError> {
  let invalid = |message: String| FlowError::InvalidParamSets {
    flow: flow.to_string(),
    message,
  };

  match prep {
    Value::Null => Ok(Vec::new()),
    Value::Array(entries) => entries
      .iter()
      .enumerate()
      .map(|(index, entry)| match entry {
        Value::Object(set) => Ok(set.clone()),
        other => Err(invalid(format!(
          "entry {index} is {}, expected an object",
          kind(other)
        ))),
      })
      .collect(),
    other => Err(invalid(format!(
      "expected an array of objects, got {}",
      kind(other)
    ))),
  }
}

fn kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
