//! Waypoint Engine
//!
//! Executes graphs of small units of work. Each node runs a three-phase
//! lifecycle against a shared context and returns an action label; the label
//! picks the next node to visit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Flow / AsyncFlow / BatchFlow / AsyncBatchFlow    │
//! │  - hooks.prep → traversal(s) → hooks.post                   │
//! │  - batch flows run one traversal per parameter set          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Graph                              │
//! │  - arena of named steps, action-labelled successor edges    │
//! │  - owns the EventNotifier for warnings and progress         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Unit / BatchUnit / AsyncUnit / AsyncBatchUnit      │
//! │  - prep → exec (retries, fallback) → post                   │
//! │  - fresh Frame per visit and per batch item                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use waypoint_engine::{Flow, Graph, SharedContext, Unit};
//!
//! let mut graph = Graph::new();
//! let load = graph.add("load", Unit::new(Load));
//! let summarize = graph.add("summarize", Unit::new(Summarize));
//! graph.add_successor(load, summarize);
//!
//! let flow = Flow::new(Arc::new(graph), load)?;
//! let ctx = SharedContext::new();
//! let action = flow.run(&ctx)?;
//! ```

mod action;
mod batch_flow;
mod error;
mod events;
mod flow;
mod frame;
mod graph;
mod node;
mod retry;
mod step;
mod traversal;
mod unit;

pub use action::{Action, DEFAULT_ACTION};
pub use batch_flow::{AsyncBatchFlow, BatchFlow};
pub use error::{FlowError, Phase};
pub use events::{ChannelNotifier, EventNotifier, FlowEvent, MemoryNotifier, NoopNotifier};
pub use flow::{AsyncFlow, Flow};
pub use frame::Frame;
pub use graph::{Graph, NodeId, Transition, Wiring};
pub use node::{AsyncBatchNode, AsyncFlowHooks, AsyncNode, BatchNode, DefaultHooks, FlowHooks, Node};
pub use retry::RetryPolicy;
pub use step::{IntoStep, Step};
pub use unit::{AsyncBatchUnit, AsyncUnit, BatchUnit, Unit};

// Re-export the configuration and context types the engine API is built on.
pub use waypoint_config::{BatchMode, EngineConfig, FlowConfig, RetryBackoff, RetryConfig, UnmatchedAction};
pub use waypoint_context::{ContextError, Params, SharedContext, merge_params};
