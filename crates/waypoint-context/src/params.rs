use serde_json::{Map, Value};

/// Run-scoped parameters, set on a node by its orchestrator just before it runs.
pub type Params = Map<String, Value>;

/// Overlay `overrides` on top of `base`. Keys present in both take the override value.
pub fn merge_params(base: &Params, overrides: &Params) -> Params {
  let mut merged = base.clone();
  for (key, value) in overrides {
    merged.insert(key.clone(), value.clone());
  }
  merged
}
