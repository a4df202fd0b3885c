//! Capability traits implemented by units of work.
//!
//! Every phase has a default, so implementors override only what they need:
//! `prep` reads from the context, `exec` does the work (and may be retried),
//! `post` writes results back and picks the next action.

use async_trait::async_trait;
use serde_json::Value;
use waypoint_context::SharedContext;

use crate::action::Action;
use crate::frame::Frame;

/// A synchronous unit of work.
pub trait Node: Send + Sync {
  fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  fn exec(&self, _prep: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  /// Called once every execute attempt has failed, with the last error.
  /// Its result replaces the exec result. Re-raises by default.
  fn exec_fallback(
    &self,
    _prep: &Value,
    error: anyhow::Error,
    _frame: &Frame,
  ) -> anyhow::Result<Value> {
    Err(error)
  }

  fn post(
    &self,
    _ctx: &SharedContext,
    _prep: Value,
    _exec: Value,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// A synchronous unit of work applied to every item produced by `prep`.
pub trait BatchNode: Send + Sync {
  fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Vec<Value>> {
    Ok(Vec::new())
  }

  fn exec(&self, _item: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  fn exec_fallback(
    &self,
    _item: &Value,
    error: anyhow::Error,
    _frame: &Frame,
  ) -> anyhow::Result<Value> {
    Err(error)
  }

  /// Receives the items and their results, in item order.
  fn post(
    &self,
    _ctx: &SharedContext,
    _items: Vec<Value>,
    _results: Vec<Value>,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// An asynchronous unit of work. Runs only inside async flows or through
/// the async entry points of [`crate::Graph`].
#[async_trait]
pub trait AsyncNode: Send + Sync {
  async fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  async fn exec(&self, _prep: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  async fn exec_fallback(
    &self,
    _prep: &Value,
    error: anyhow::Error,
    _frame: &Frame,
  ) -> anyhow::Result<Value> {
    Err(error)
  }

  async fn post(
    &self,
    _ctx: &SharedContext,
    _prep: Value,
    _exec: Value,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// An asynchronous batch node. Items run sequentially or concurrently
/// depending on the [`crate::BatchMode`] of its [`crate::AsyncBatchUnit`].
#[async_trait]
pub trait AsyncBatchNode: Send + Sync {
  async fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Vec<Value>> {
    Ok(Vec::new())
  }

  async fn exec(&self, _item: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  async fn exec_fallback(
    &self,
    _item: &Value,
    error: anyhow::Error,
    _frame: &Frame,
  ) -> anyhow::Result<Value> {
    Err(error)
  }

  async fn post(
    &self,
    _ctx: &SharedContext,
    _items: Vec<Value>,
    _results: Vec<Value>,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// Flow-level phases around a traversal.
///
/// There is no `exec`: a flow's execute phase is always the traversal itself.
pub trait FlowHooks: Send + Sync {
  /// For batch flows the returned value holds the parameter sets, one JSON
  /// object per run. `Null` means no runs.
  fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  /// `last_action` is the final action of the traversal; batch flows pass `None`.
  ///
  /// The returned action is what a parent graph sees when the flow runs as one
  /// of its nodes. The default is [`Action::default`], whatever the traversal
  /// ended on, so a nested flow follows its parent's default successor.
  fn post(
    &self,
    _ctx: &SharedContext,
    _prep: Value,
    _last_action: Option<Action>,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// Async counterpart of [`FlowHooks`].
#[async_trait]
pub trait AsyncFlowHooks: Send + Sync {
  async fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Null)
  }

  async fn post(
    &self,
    _ctx: &SharedContext,
    _prep: Value,
    _last_action: Option<Action>,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    Ok(Action::default())
  }
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl FlowHooks for DefaultHooks {}

impl AsyncFlowHooks for DefaultHooks {}
