//! Waypoint Config
//!
//! Serializable configuration for the waypoint engine. These types describe how
//! nodes retry and how flows behave; the engine turns them into runtime policies.
//!
//! Configuration can be loaded from:
//! - JSON strings (`EngineConfig::from_json_str`)
//! - JSON files (`EngineConfig::from_path`)

mod engine;
mod enums;
mod error;
mod flow;
mod retry;

pub use engine::EngineConfig;
pub use enums::{BatchMode, RetryBackoff, UnmatchedAction};
pub use error::ConfigError;
pub use flow::FlowConfig;
pub use retry::RetryConfig;
