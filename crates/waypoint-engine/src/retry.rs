//! Retry and fallback around the execute phase.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use waypoint_config::{RetryBackoff, RetryConfig};

use crate::error::{FlowError, is_misuse};
use crate::events::{EventNotifier, FlowEvent, emit};
use crate::frame::Frame;

/// How many times `exec` is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  max_retries: u32,
  wait: Duration,
  backoff: RetryBackoff,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 1,
      wait: Duration::ZERO,
      backoff: RetryBackoff::Constant,
    }
  }
}

impl RetryPolicy {
  /// `max_retries` counts every attempt, including the first, and must be at least 1.
  pub fn new(max_retries: u32, wait: Duration) -> Result<Self, FlowError> {
    if max_retries == 0 {
      return Err(FlowError::InvalidRetryPolicy {
        message: "max_retries must be at least 1".to_string(),
      });
    }
    Ok(Self {
      max_retries,
      wait,
      backoff: RetryBackoff::Constant,
    })
  }

  pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
    self.backoff = backoff;
    self
  }

  pub fn max_retries(&self) -> u32 {
    self.max_retries
  }

  pub fn wait(&self) -> Duration {
    self.wait
  }

  pub fn backoff(&self) -> RetryBackoff {
    self.backoff
  }

  /// Delay after the failed attempt with zero-based index `retry`.
  pub fn delay_after(&self, retry: u32) -> Duration {
    match self.backoff {
      RetryBackoff::Constant => self.wait,
      RetryBackoff::Linear => self.wait.saturating_mul(retry.saturating_add(1)),
      RetryBackoff::Exponential => {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.wait.saturating_mul(factor)
      }
    }
  }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
  type Error = FlowError;

  fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
    Ok(
      RetryPolicy::new(config.max_retries, Duration::from_millis(config.wait_ms))?
        .with_backoff(config.backoff),
    )
  }
}

enum AfterFailure {
  Abort(anyhow::Error),
  Fallback(anyhow::Error),
  Retry(Duration),
}

fn after_failure(
  policy: &RetryPolicy,
  frame: &Frame,
  error: anyhow::Error,
  notifier: &dyn EventNotifier,
) -> AfterFailure {
  if is_misuse(&error) {
    return AfterFailure::Abort(error);
  }

  if frame.retry() + 1 >= policy.max_retries {
    emit(
      notifier,
      FlowEvent::FallbackInvoked {
        run_id: frame.run_id().to_string(),
        node: frame.node().to_string(),
        item: frame.item(),
        attempts: frame.retry() + 1,
        error: format!("{error:#}"),
      },
    );
    return AfterFailure::Fallback(error);
  }

  let delay = policy.delay_after(frame.retry());
  emit(
    notifier,
    FlowEvent::RetryScheduled {
      run_id: frame.run_id().to_string(),
      node: frame.node().to_string(),
      item: frame.item(),
      attempt: frame.retry() + 1,
      max_retries: policy.max_retries,
      delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
      error: format!("{error:#}"),
    },
  );
  AfterFailure::Retry(delay)
}

/// Run `attempt` until it succeeds or the policy is exhausted, blocking the
/// thread between attempts. The last error goes to `fallback`.
pub(crate) fn execute_blocking<F, B>(
  policy: &RetryPolicy,
  frame: &mut Frame,
  notifier: &dyn EventNotifier,
  mut attempt: F,
  fallback: B,
) -> anyhow::Result<Value>
where
  F: FnMut(&Frame) -> anyhow::Result<Value>,
  B: FnOnce(anyhow::Error, &Frame) -> anyhow::Result<Value>,
{
  loop {
    let error = match attempt(frame) {
      Ok(value) => return Ok(value),
      Err(error) => error,
    };
    match after_failure(policy, frame, error, notifier) {
      AfterFailure::Abort(error) => return Err(error),
      AfterFailure::Fallback(error) => return fallback(error, frame),
      AfterFailure::Retry(delay) => {
        if !delay.is_zero() {
          std::thread::sleep(delay);
        }
        frame.next_retry();
      }
    }
  }
}

/// Async counterpart of [`execute_blocking`]; waits yield to the runtime.
///
/// Also drives synchronous nodes running inside an async flow, with
/// `attempt` and `fallback` returning ready futures.
pub(crate) async fn execute_async<F, Fut, B, BFut>(
  policy: &RetryPolicy,
  frame: &mut Frame,
  notifier: &dyn EventNotifier,
  mut attempt: F,
  fallback: B,
) -> anyhow::Result<Value>
where
  F: FnMut(Frame) -> Fut,
  Fut: Future<Output = anyhow::Result<Value>>,
  B: FnOnce(anyhow::Error, Frame) -> BFut,
  BFut: Future<Output = anyhow::Result<Value>>,
{
  loop {
    let error = match attempt(frame.clone()).await {
      Ok(value) => return Ok(value),
      Err(error) => error,
    };
    match after_failure(policy, frame, error, notifier) {
      AfterFailure::Abort(error) => return Err(error),
      AfterFailure::Fallback(error) => return fallback(error, frame.clone()).await,
      AfterFailure::Retry(delay) => {
        if !delay.is_zero() {
          tokio::time::sleep(delay).await;
        }
        frame.next_retry();
      }
    }
  }
}
