//! Waypoint
//!
//! A minimal graph execution engine. Small units of work ("nodes") read from
//! and write to a shared context, and the action each one returns picks the
//! next node to run. Flows drive the traversal; batch flows repeat it once per
//! parameter set; the async variants run under tokio and can execute batch
//! items concurrently.
//!
//! This crate re-exports the workspace crates:
//! - [`config`]: serializable retry and flow configuration
//! - [`context`]: the shared context and parameter maps
//! - the engine API at the crate root
//!
//! Most programs only need the [`prelude`].

pub use waypoint_config as config;
pub use waypoint_context as context;
pub use waypoint_engine::*;

/// The types needed to define nodes, wire a graph and run a flow.
pub mod prelude {
  pub use waypoint_engine::{
    Action, AsyncBatchFlow, AsyncBatchNode, AsyncBatchUnit, AsyncFlow, AsyncFlowHooks, AsyncNode,
    AsyncUnit, BatchFlow, BatchMode, BatchNode, BatchUnit, EngineConfig, Flow, FlowError,
    FlowHooks, Frame, Graph, Node, NodeId, Params, RetryPolicy, SharedContext, Unit,
  };
}
