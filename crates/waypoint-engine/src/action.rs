use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used when a node does not pick a specific transition.
pub const DEFAULT_ACTION: &str = "default";

/// Transition label returned by a node's `post` phase.
///
/// The label is looked up verbatim in the issuing node's successors; there is no
/// fallback to [`DEFAULT_ACTION`] when the lookup misses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
  pub fn new(label: impl Into<String>) -> Self {
    Self(label.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_default(&self) -> bool {
    self.0 == DEFAULT_ACTION
  }
}

impl Default for Action {
  fn default() -> Self {
    Self(DEFAULT_ACTION.to_string())
  }
}

impl From<&str> for Action {
  fn from(label: &str) -> Self {
    Self::new(label)
  }
}

impl From<String> for Action {
  fn from(label: String) -> Self {
    Self(label)
  }
}

impl Borrow<str> for Action {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl AsRef<str> for Action {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl PartialEq<str> for Action {
  fn eq(&self, other: &str) -> bool {
    self.0 == other
  }
}

impl PartialEq<&str> for Action {
  fn eq(&self, other: &&str) -> bool {
    self.0 == *other
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
