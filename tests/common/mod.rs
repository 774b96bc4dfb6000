#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use rowdag::custom::CustomCodeEvaluator;
use rowdag::errors::CustomCodeResult;
use rowdag::rows::{rows_from_json, RowSet};
use rowdag::store::{InMemoryPipelineStore, InMemoryRowStore};
use rowdag::{AppContext, EngineConfig, Pipeline};

/// Custom code evaluator that records its arguments and answers with a fixed
/// value, optionally after a delay.
pub struct RecordingEvaluator {
    pub calls: Mutex<Vec<Vec<RowSet>>>,
    response: Value,
    delay: Option<Duration>,
}

impl RecordingEvaluator {
    pub fn returning(response: Value) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<RowSet>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CustomCodeEvaluator for RecordingEvaluator {
    async fn evaluate(&self, _code: &str, inputs: Vec<RowSet>) -> CustomCodeResult<Value> {
        self.calls.lock().unwrap().push(inputs);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

pub struct TestContext {
    pub context: AppContext,
    pub rows: Arc<InMemoryRowStore>,
    pub evaluator: Arc<RecordingEvaluator>,
}

pub async fn test_context(config: EngineConfig, evaluator: RecordingEvaluator) -> TestContext {
    let rows = Arc::new(InMemoryRowStore::new());
    rows.insert_table("numbers", rows_from_json(json!([{"a": 1}, {"a": 2}, {"a": 3}])))
        .await;
    rows.insert_table(
        "orders",
        rows_from_json(json!([
            {"id": 1, "customer": "c1", "amount": "12.5", "region": "north"},
            {"id": 2, "customer": "c2", "amount": "7", "region": "south"},
            {"id": 3, "customer": "c1", "amount": "30", "region": "north"},
        ])),
    )
    .await;
    rows.insert_table(
        "customers",
        rows_from_json(json!([
            {"customer": "c1", "name": "Ada"},
            {"customer": "c3", "name": "Grace"},
        ])),
    )
    .await;

    let evaluator = Arc::new(evaluator);
    let context = AppContext::with_collaborators(
        config,
        rows.clone(),
        Arc::new(InMemoryPipelineStore::new()),
        evaluator.clone(),
    );

    TestContext {
        context,
        rows,
        evaluator,
    }
}

pub async fn default_context() -> TestContext {
    test_context(EngineConfig::default(), RecordingEvaluator::returning(json!([]))).await
}

pub fn pipeline(value: Value) -> Pipeline {
    serde_json::from_value(value).expect("valid pipeline fixture")
}

/// Source(numbers) -> Filter(a > 1) -> Aggregate(sum(a) as total)
pub fn sum_pipeline(id: &str) -> Pipeline {
    pipeline(json!({
        "id": id,
        "name": "Sum of large numbers",
        "nodes": [
            {"id": "src", "type": "dataSource", "label": "Numbers",
             "position": {"x": 0, "y": 0}, "config": {"databaseId": "numbers"}},
            {"id": "filter", "type": "filter",
             "config": {"conditions": [{"field": "a", "operator": "greaterThan", "value": 1}]}},
            {"id": "agg", "type": "aggregate",
             "config": {"aggregations": [{"field": "a", "function": "sum", "alias": "total"}]}}
        ],
        "edges": [
            {"source": "src", "target": "filter"},
            {"source": "filter", "target": "agg"}
        ]
    }))
}
