use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ContextError;

/// Run-scoped key-value store shared by every node of a flow run.
///
/// Cloning is cheap: clones are handles to the same underlying map. Each method is
/// atomic on its own, but there is no transaction spanning several calls. When
/// concurrent batch items write to the same key, use [`SharedContext::update`] or
/// [`SharedContext::push`], or give every item its own key.
#[derive(Clone, Default)]
pub struct SharedContext {
  data: Arc<RwLock<Map<String, Value>>>,
}

impl SharedContext {
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
    self.data.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
    self.data.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get a copy of the value stored under `key`.
  pub fn get(&self, key: &str) -> Option<Value> {
    self.read().get(key).cloned()
  }

  /// Get the value under `key` decoded as `T`.
  pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => serde_json::from_value(value)
        .map(Some)
        .map_err(|source| ContextError::Deserialize {
          key: key.to_string(),
          source,
        }),
    }
  }

  /// Store a value, returning the previous one.
  pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    self.write().insert(key.into(), value.into())
  }

  /// Serialize `value` and store it under `key`.
  pub fn insert_as<T: Serialize>(
    &self,
    key: impl Into<String>,
    value: &T,
  ) -> Result<Option<Value>, ContextError> {
    let key = key.into();
    let value = serde_json::to_value(value).map_err(|source| ContextError::Serialize {
      key: key.clone(),
      source,
    })?;
    Ok(self.insert(key, value))
  }

  pub fn remove(&self, key: &str) -> Option<Value> {
    self.write().remove(key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.read().contains_key(key)
  }

  /// Replace the value under `key` with `f(current)` while holding the write lock.
  ///
  /// `f` must not call back into this context.
  pub fn update<F>(&self, key: &str, f: F)
  where
    F: FnOnce(Option<Value>) -> Value,
  {
    let mut data = self.write();
    let current = data.remove(key);
    data.insert(key.to_string(), f(current));
  }

  /// Append `value` to the array under `key`, creating the array if needed.
  ///
  /// A non-array value already stored under `key` becomes the first element.
  pub fn push(&self, key: &str, value: impl Into<Value>) {
    let value = value.into();
    self.update(key, move |current| match current {
      Some(Value::Array(mut items)) => {
        items.push(value);
        Value::Array(items)
      }
      Some(other) => Value::Array(vec![other, value]),
      None => Value::Array(vec![value]),
    });
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  pub fn keys(&self) -> Vec<String> {
    self.read().keys().cloned().collect()
  }

  /// Copy of the whole store.
  pub fn snapshot(&self) -> Map<String, Value> {
    self.read().clone()
  }
}

impl From<Map<String, Value>> for SharedContext {
  fn from(map: Map<String, Value>) -> Self {
    Self {
      data: Arc::new(RwLock::new(map)),
    }
  }
}

impl fmt::Debug for SharedContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("SharedContext").field(&*self.read()).finish()
  }
}
