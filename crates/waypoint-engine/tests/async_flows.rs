//! Integration tests for the cooperative-concurrent regime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use waypoint_engine::{
  Action, AsyncBatchFlow, AsyncBatchNode, AsyncBatchUnit, AsyncFlow, AsyncFlowHooks, AsyncNode,
  AsyncUnit, BatchMode, ChannelNotifier, Flow, FlowError, FlowEvent, Frame, Graph, Node, Phase,
  RetryPolicy, SharedContext, Unit,
};

/// Sleeps, then records its name.
struct Fetch {
  name: &'static str,
  delay: Duration,
}

#[async_trait]
impl AsyncNode for Fetch {
  async fn exec(&self, _prep: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    tokio::time::sleep(self.delay).await;
    Ok(json!(self.name))
  }

  async fn post(
    &self,
    ctx: &SharedContext,
    _prep: Value,
    exec: Value,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    ctx.push("visited", exec);
    Ok(Action::default())
  }
}

fn fetch(name: &'static str) -> AsyncUnit<Fetch> {
  AsyncUnit::new(Fetch {
    name,
    delay: Duration::from_millis(1),
  })
}

struct Record(&'static str);

impl Node for Record {
  fn post(&self, ctx: &SharedContext, _prep: Value, _exec: Value, _frame: &Frame) -> anyhow::Result<Action> {
    ctx.push("visited", self.0);
    Ok(Action::default())
  }
}

#[tokio::test]
async fn test_async_flow_runs_async_and_sync_nodes() {
  let mut graph = Graph::new();
  let a = graph.add("a", fetch("a"));
  let b = graph.add("b", Unit::new(Record("b")));
  let c = graph.add("c", fetch("c"));
  graph.wire(a).then(b).then(c);

  let ctx = SharedContext::new();
  let action = AsyncFlow::new(Arc::new(graph), a)
    .unwrap()
    .run(&ctx)
    .await
    .unwrap();

  assert_eq!(action, "default");
  assert_eq!(ctx.get("visited"), Some(json!(["a", "b", "c"])));
}

#[tokio::test]
async fn test_async_flow_nests_sync_and_async_flows() {
  let mut sync_graph = Graph::new();
  let record = sync_graph.add("record", Unit::new(Record("inner_sync")));
  let sync_flow = Flow::new(Arc::new(sync_graph), record).unwrap();

  let mut async_graph = Graph::new();
  let inner = async_graph.add("inner", fetch("inner_async"));
  let async_flow = AsyncFlow::new(Arc::new(async_graph), inner).unwrap();

  let mut graph = Graph::new();
  let first = graph.add("sync_flow", sync_flow);
  let second = graph.add("async_flow", async_flow);
  graph.add_successor(first, second);

  let ctx = SharedContext::new();
  AsyncFlow::new(Arc::new(graph), first)
    .unwrap()
    .run(&ctx)
    .await
    .unwrap();

  assert_eq!(ctx.get("visited"), Some(json!(["inner_sync", "inner_async"])));
}

#[tokio::test]
async fn test_run_node_async_accepts_both_kinds() {
  let mut graph = Graph::new();
  let a = graph.add("a", fetch("a"));
  let b = graph.add("b", Unit::new(Record("b")));

  let ctx = SharedContext::new();
  graph.run_node_async(a, &ctx).await.unwrap();
  graph.run_node_async(b, &ctx).await.unwrap();
  assert_eq!(ctx.get("visited"), Some(json!(["a", "b"])));
}

/// Flaky async node that succeeds on its final attempt.
struct Eventually;

#[async_trait]
impl AsyncNode for Eventually {
  async fn exec(&self, _prep: &Value, frame: &Frame) -> anyhow::Result<Value> {
    if frame.is_last_attempt() {
      Ok(json!(frame.retry()))
    } else {
      anyhow::bail!("not yet")
    }
  }

  async fn post(
    &self,
    ctx: &SharedContext,
    _prep: Value,
    exec: Value,
    frame: &Frame,
  ) -> anyhow::Result<Action> {
    ctx.insert("succeeded_on", exec);
    ctx.insert("post_retry", frame.retry());
    Ok(Action::default())
  }
}

#[tokio::test]
async fn test_async_retry_waits_between_attempts() {
  let policy = RetryPolicy::new(3, Duration::from_millis(20)).unwrap();
  let mut graph = Graph::new();
  let node = graph.add("eventually", AsyncUnit::new(Eventually).with_retry(policy));

  let ctx = SharedContext::new();
  let started = Instant::now();
  graph.run_node_async(node, &ctx).await.unwrap();

  assert!(started.elapsed() >= Duration::from_millis(40));
  assert_eq!(ctx.get("succeeded_on"), Some(json!(2)));
  // post sees the index of the attempt that produced the result
  assert_eq!(ctx.get("post_retry"), Some(json!(2)));
}

/// Squares each item after a delay that shrinks with the item's position.
struct Square;

#[async_trait]
impl AsyncBatchNode for Square {
  async fn prep(&self, ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Vec<Value>> {
    Ok(ctx.get_as::<Vec<Value>>("numbers")?.unwrap_or_default())
  }

  async fn exec(&self, item: &Value, frame: &Frame) -> anyhow::Result<Value> {
    let n = item.as_i64().unwrap_or_default();
    let index = frame.item().unwrap_or_default() as u64;
    tokio::time::sleep(Duration::from_millis(60 - 10 * index)).await;
    if n < 0 {
      anyhow::bail!("negative item {n}");
    }
    Ok(json!(n * n))
  }

  async fn post(
    &self,
    ctx: &SharedContext,
    _items: Vec<Value>,
    results: Vec<Value>,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    ctx.insert("squares", results);
    Ok(Action::default())
  }
}

#[tokio::test]
async fn test_concurrent_batch_node_keeps_item_order() {
  let mut graph = Graph::new();
  let square = graph.add("square", AsyncBatchUnit::concurrent(Square));
  let ctx = SharedContext::new();
  ctx.insert("numbers", json!([1, 2, 3, 4, 5]));

  let started = Instant::now();
  graph.run_node_async(square, &ctx).await.unwrap();

  assert_eq!(ctx.get("squares"), Some(json!([1, 4, 9, 16, 25])));
  // sequential execution would take 60+50+40+30+20 ms
  assert!(started.elapsed() < Duration::from_millis(180));
}

#[tokio::test]
async fn test_sequential_async_batch_node() {
  let mut graph = Graph::new();
  let square = graph.add("square", AsyncBatchUnit::new(Square, BatchMode::Sequential));
  let ctx = SharedContext::new();
  ctx.insert("numbers", json!([2, 3]));

  graph.run_node_async(square, &ctx).await.unwrap();
  assert_eq!(ctx.get("squares"), Some(json!([4, 9])));
}

#[tokio::test]
async fn test_concurrent_batch_node_fails_fast() {
  let mut graph = Graph::new();
  let square = graph.add("square", AsyncBatchUnit::concurrent(Square));
  let ctx = SharedContext::new();
  ctx.insert("numbers", json!([1, 2, -3, 4]));

  let err = graph.run_node_async(square, &ctx).await.unwrap_err();

  assert!(matches!(err, FlowError::ItemFailed { index: 2, .. }));
  assert_eq!(ctx.get("squares"), None);
}

/// Fails for the run whose `index` param is 3.
struct Process;

#[async_trait]
impl AsyncNode for Process {
  async fn prep(&self, _ctx: &SharedContext, frame: &Frame) -> anyhow::Result<Value> {
    Ok(frame.param("index").cloned().unwrap_or(Value::Null))
  }

  async fn exec(&self, prep: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    if prep == &json!(3) {
      anyhow::bail!("run 3 failed");
    }
    Ok(prep.clone())
  }

  async fn post(
    &self,
    ctx: &SharedContext,
    _prep: Value,
    exec: Value,
    _frame: &Frame,
  ) -> anyhow::Result<Action> {
    ctx.push("processed", exec);
    Ok(Action::default())
  }
}

struct Runs(usize);

#[async_trait]
impl AsyncFlowHooks for Runs {
  async fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Value> {
    Ok(Value::Array(
      (0..self.0).map(|index| json!({ "index": index })).collect(),
    ))
  }
}

#[tokio::test]
async fn test_async_batch_flow_sequential_order() {
  let mut graph = Graph::new();
  let process = graph.add("process", AsyncUnit::new(Process));
  let flow = AsyncBatchFlow::new(Arc::new(graph), process)
    .unwrap()
    .with_hooks(Runs(3));

  let ctx = SharedContext::new();
  let action = flow.run(&ctx).await.unwrap();

  assert_eq!(action, "default");
  assert_eq!(ctx.get("processed"), Some(json!([0, 1, 2])));
}

#[tokio::test]
async fn test_concurrent_batch_flow_surfaces_failure() {
  let mut graph = Graph::new();
  let process = graph.add("process", AsyncUnit::new(Process));
  let flow = AsyncBatchFlow::new(Arc::new(graph), process)
    .unwrap()
    .with_hooks(Runs(5))
    .concurrent();

  let err = flow.run(&SharedContext::new()).await.unwrap_err();

  match err {
    FlowError::NodeFailed { node, phase, source } => {
      assert_eq!(node, "process");
      assert_eq!(phase, Phase::Exec);
      assert_eq!(source.to_string(), "run 3 failed");
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_concurrent_batch_flow_runs_every_set() {
  let mut graph = Graph::new();
  let process = graph.add("process", AsyncUnit::new(Process));
  let flow = AsyncBatchFlow::new(Arc::new(graph), process)
    .unwrap()
    .with_hooks(Runs(3))
    .with_mode(BatchMode::Concurrent);

  let ctx = SharedContext::new();
  flow.run(&ctx).await.unwrap();

  let mut processed = ctx.get_as::<Vec<i64>>("processed").unwrap().unwrap();
  processed.sort_unstable();
  assert_eq!(processed, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_channel_notifier_streams_events() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let mut graph = Graph::with_notifier(ChannelNotifier::new(tx));
  let a = graph.add("a", fetch("a"));
  let b = graph.add("b", fetch("b"));
  graph.add_successor(a, b);

  let flow = AsyncFlow::new(Arc::new(graph), a).unwrap().with_name("stream");
  flow.run(&SharedContext::new()).await.unwrap();
  drop(flow);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  let names: Vec<&str> = events
    .iter()
    .map(|event| match event {
      FlowEvent::FlowStarted { .. } => "flow_started",
      FlowEvent::NodeStarted { .. } => "node_started",
      FlowEvent::NodeCompleted { .. } => "node_completed",
      FlowEvent::FlowCompleted { .. } => "flow_completed",
      _ => "other",
    })
    .collect();
  assert_eq!(
    names,
    vec![
      "flow_started",
      "node_started",
      "node_completed",
      "node_started",
      "node_completed",
      "flow_completed",
    ]
  );
}

/// Synchronous node whose first attempt fails on every visit.
struct FirstAttemptFails;

impl Node for FirstAttemptFails {
  fn exec(&self, _prep: &Value, frame: &Frame) -> anyhow::Result<Value> {
    if frame.retry() == 0 {
      anyhow::bail!("first attempt");
    }
    Ok(json!(frame.retry()))
  }

  fn post(&self, ctx: &SharedContext, _prep: Value, exec: Value, frame: &Frame) -> anyhow::Result<Action> {
    assert_eq!(frame.retry(), 1);
    ctx.push("recovered", exec);
    Ok(Action::default())
  }
}

fn first_attempt_fails() -> Unit<FirstAttemptFails> {
  let policy = RetryPolicy::new(2, Duration::from_millis(100)).unwrap();
  Unit::new(FirstAttemptFails).with_retry(policy)
}

#[tokio::test]
async fn test_sync_retry_waits_overlap_in_concurrent_batch_flow() {
  let mut graph = Graph::new();
  let flaky = graph.add("flaky", first_attempt_fails());
  let flow = AsyncBatchFlow::new(Arc::new(graph), flaky)
    .unwrap()
    .with_hooks(Runs(5))
    .concurrent();

  let ctx = SharedContext::new();
  let started = Instant::now();
  flow.run(&ctx).await.unwrap();
  let elapsed = started.elapsed();

  assert_eq!(ctx.get("recovered"), Some(json!([1, 1, 1, 1, 1])));
  // five waits of 100ms, taken together rather than one after another
  assert!(elapsed >= Duration::from_millis(100));
  assert!(elapsed < Duration::from_millis(300));
}

#[tokio::test]
async fn test_nested_sync_flow_yields_inside_concurrent_batch_flow() {
  let mut inner_graph = Graph::new();
  let flaky = inner_graph.add("flaky", first_attempt_fails());
  let inner = Flow::new(Arc::new(inner_graph), flaky).unwrap();

  let mut graph = Graph::new();
  let nested = graph.add("nested", inner);
  let flow = AsyncBatchFlow::new(Arc::new(graph), nested)
    .unwrap()
    .with_hooks(Runs(4))
    .concurrent();

  let ctx = SharedContext::new();
  let started = Instant::now();
  flow.run(&ctx).await.unwrap();

  assert_eq!(ctx.get("recovered"), Some(json!([1, 1, 1, 1])));
  assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn test_nested_sync_flow_still_rejects_async_nodes() {
  let mut inner_graph = Graph::new();
  let sleeper = inner_graph.add("fetch", fetch("fetch"));
  let inner = Flow::new(Arc::new(inner_graph), sleeper).unwrap();

  let mut graph = Graph::new();
  let nested = graph.add("nested", inner);
  let err = AsyncFlow::new(Arc::new(graph), nested)
    .unwrap()
    .run(&SharedContext::new())
    .await
    .unwrap_err();

  assert!(err.is_misuse());
}

/// Run 0 fails at once; every other run takes 800ms.
struct FirstRunFails;

#[async_trait]
impl AsyncNode for FirstRunFails {
  async fn exec(&self, _prep: &Value, frame: &Frame) -> anyhow::Result<Value> {
    if frame.param("index") == Some(&json!(0)) {
      anyhow::bail!("run 0 failed");
    }
    tokio::time::sleep(Duration::from_millis(800)).await;
    Ok(Value::Null)
  }
}

#[tokio::test]
async fn test_concurrent_batch_flow_returns_before_slow_siblings() {
  let mut graph = Graph::new();
  let node = graph.add("node", AsyncUnit::new(FirstRunFails));
  let flow = AsyncBatchFlow::new(Arc::new(graph), node)
    .unwrap()
    .with_hooks(Runs(5))
    .concurrent();

  let started = Instant::now();
  let err = flow.run(&SharedContext::new()).await.unwrap_err();

  assert!(started.elapsed() < Duration::from_millis(800));
  assert!(matches!(err, FlowError::NodeFailed { ref node, .. } if node == "node"));
}

/// Item 0 fails at once; every other item takes 800ms.
struct FirstItemFails;

#[async_trait]
impl AsyncBatchNode for FirstItemFails {
  async fn prep(&self, _ctx: &SharedContext, _frame: &Frame) -> anyhow::Result<Vec<Value>> {
    Ok((0..4).map(Value::from).collect())
  }

  async fn exec(&self, item: &Value, _frame: &Frame) -> anyhow::Result<Value> {
    if item == &json!(0) {
      anyhow::bail!("item 0 failed");
    }
    tokio::time::sleep(Duration::from_millis(800)).await;
    Ok(item.clone())
  }
}

#[tokio::test]
async fn test_concurrent_batch_node_returns_before_slow_items() {
  let mut graph = Graph::new();
  let node = graph.add("items", AsyncBatchUnit::concurrent(FirstItemFails));

  let started = Instant::now();
  let err = graph
    .run_node_async(node, &SharedContext::new())
    .await
    .unwrap_err();

  assert!(started.elapsed() < Duration::from_millis(800));
  assert!(matches!(err, FlowError::ItemFailed { index: 0, .. }));
}
