//! Flows: units of work whose execute phase is a graph traversal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use waypoint_config::FlowConfig;
use waypoint_context::{Params, SharedContext, merge_params};

use crate::action::Action;
use crate::error::{FlowError, Phase};
use crate::events::{EventNotifier, FlowEvent, emit};
use crate::frame::new_run_id;
use crate::graph::{Graph, NodeId};
use crate::node::{AsyncFlowHooks, DefaultHooks, FlowHooks};
use crate::step::{AsyncStep, IntoStep, Scope, Step, SyncStep};
use crate::traversal::{Traversal, report};

/// Synchronous flow over a graph.
///
/// Running a flow calls the hooks' `prep`, traverses the graph from the start
/// node with the flow's params, then calls the hooks' `post` with the last
/// action. Flows can be added to another graph and then run as a single node;
/// the action returned by `post` (`"default"` unless the hooks pick another)
/// selects the successor in the parent graph.
pub struct Flow<H = DefaultHooks> {
  name: String,
  traversal: Traversal,
  params: Params,
  hooks: H,
}

impl Flow<DefaultHooks> {
  pub fn new(graph: Arc<Graph>, start: NodeId) -> Result<Self, FlowError> {
    Ok(Self {
      name: "flow".to_string(),
      traversal: Traversal::new(graph, start)?,
      params: Params::new(),
      hooks: DefaultHooks,
    })
  }
}

impl<H: FlowHooks> Flow<H> {
  pub fn with_hooks<T: FlowHooks>(self, hooks: T) -> Flow<T> {
    Flow {
      name: self.name,
      traversal: self.traversal,
      params: self.params,
      hooks,
    }
  }

  /// Base params injected into every node of the traversal.
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

  pub fn start(&self) -> NodeId {
    self.traversal.start()
  }

  /// Run the flow as a top-level invocation.
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
    let last = self
      .traversal
      .run_blocking(ctx, scope.params.clone(), scope.run_id)?;
    self
      .hooks
      .post(ctx, prep, Some(last), &frame)
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

#[async_trait]
impl<H: FlowHooks> SyncStep for Flow<H> {
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
    let last = self
      .traversal
      .run_sync_nested(ctx, nested.params.clone(), nested.run_id)
      .await?;
    self
      .hooks
      .post(ctx, prep, Some(last), &frame)
      .map_err(|e| FlowError::node(nested.node, Phase::Post, e))
  }
}

impl<H: FlowHooks + 'static> IntoStep for Flow<H> {
  fn into_step(self) -> Step {
    Step::blocking(self)
  }
}

/// Flow for the cooperative-concurrent regime. Runs async and sync nodes.
pub struct AsyncFlow<H = DefaultHooks> {
  name: String,
  traversal: Traversal,
  params: Params,
  hooks: H,
}

impl AsyncFlow<DefaultHooks> {
  pub fn new(graph: Arc<Graph>, start: NodeId) -> Result<Self, FlowError> {
    Ok(Self {
      name: "async_flow".to_string(),
      traversal: Traversal::new(graph, start)?,
      params: Params::new(),
      hooks: DefaultHooks,
    })
  }
}

impl<H: AsyncFlowHooks> AsyncFlow<H> {
  pub fn with_hooks<T: AsyncFlowHooks>(self, hooks: T) -> AsyncFlow<T> {
    AsyncFlow {
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
    let last = self
      .traversal
      .run_async(ctx, scope.params.clone(), scope.run_id)
      .await?;
    self
      .hooks
      .post(ctx, prep, Some(last), &frame)
      .await
      .map_err(|e| FlowError::node(scope.node, Phase::Post, e))
  }
}

#[async_trait]
impl<H: AsyncFlowHooks> AsyncStep for AsyncFlow<H> {
  async fn run(&self, ctx: &SharedContext, scope: &Scope<'_>) -> Result<Action, FlowError> {
    let nested = nested_scope(&self.params, scope);
    self.run_scoped(ctx, &nested).await
  }
}

impl<H: AsyncFlowHooks + 'static> IntoStep for AsyncFlow<H> {
  fn into_step(self) -> Step {
    Step::cooperative(self)
  }
}

/// Scope for a flow running as a node of another traversal: the flow's own
/// params overlaid with the params injected by the parent.
pub(crate) fn nested_scope<'a>(own: &Params, scope: &Scope<'a>) -> Scope<'a> {
  Scope {
    node: scope.node,
    run_id: scope.run_id,
    params: Arc::new(merge_params(own, &scope.params)),
    notifier: scope.notifier,
  }
}

pub(crate) fn emit_started(notifier: &dyn EventNotifier, run_id: &str, flow: &str) {
  emit(
    notifier,
    FlowEvent::FlowStarted {
      run_id: run_id.to_string(),
      flow: flow.to_string(),
    },
  );
}
