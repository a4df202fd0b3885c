//! Waypoint Context
//!
//! The state that travels through a flow run:
//! - [`SharedContext`]: the mutable key-value store every node of a run reads and writes.
//! - [`Params`]: the run-scoped parameters an orchestrator injects into each node it visits.

mod error;
mod params;
mod store;

pub use error::ContextError;
pub use params::{Params, merge_params};
pub use store::SharedContext;
