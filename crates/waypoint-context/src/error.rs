use thiserror::Error;

/// Errors from the typed accessors of [`crate::SharedContext`].
#[derive(Debug, Error)]
pub enum ContextError {
  #[error("failed to serialize value for key '{key}': {source}")]
  Serialize {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to deserialize value for key '{key}': {source}")]
  Deserialize {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}
