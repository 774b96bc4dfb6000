mod common;

use std::time::Duration;

use serde_json::json;

use common::{default_context, pipeline, sum_pipeline, test_context, RecordingEvaluator};
use rowdag::engine::{ExecutionStatus, LeafResult};
use rowdag::pipeline::NodeType;
use rowdag::rows::rows_from_json;
use rowdag::EngineConfig;

#[tokio::test]
async fn test_filter_then_aggregate_scenario() {
    let ctx = default_context().await;
    let result = ctx
        .context
        .executor()
        .execute(&sum_pipeline("p1"), false)
        .await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(!result.cached);
    assert_eq!(result.data, rows_from_json(json!([{"total": 5}])));
    assert_eq!(
        result.leaf_results,
        vec![LeafResult::new(
            "agg",
            "agg",
            NodeType::Aggregate,
            rows_from_json(json!([{"total": 5}]))
        )]
    );
    let order: Vec<&str> = result.node_results.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["src", "filter", "agg"]);
    assert_eq!(result.structural_hash.len(), 64);
}

#[tokio::test]
async fn test_only_reachable_nodes_execute() {
    let ctx = default_context().await;
    let definition = pipeline(json!({
        "id": "p2",
        "name": "with orphans",
        "nodes": [
            {"id": "orphan", "type": "filter"},
            {"id": "src", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "chart", "type": "visualization", "config": {"chartType": "bar"}},
            {"id": "dangling", "type": "aggregate"}
        ],
        "edges": [
            {"source": "src", "target": "chart"},
            {"source": "orphan", "target": "dangling"}
        ]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert!(result.is_success(), "{:?}", result.error);

    let executed: Vec<&str> = result.node_results.keys().map(String::as_str).collect();
    assert_eq!(executed, vec!["src", "chart"]);
    let leaves: Vec<&str> = result.leaf_results.iter().map(|l| l.node_id.as_str()).collect();
    assert_eq!(leaves, vec!["chart"]);
}

#[tokio::test]
async fn test_every_reachable_edge_respects_order() {
    let ctx = default_context().await;
    let definition = pipeline(json!({
        "id": "p3",
        "name": "diamond",
        "nodes": [
            {"id": "join", "type": "join",
             "config": {"joinType": "inner", "condition": {"leftField": "customer", "rightField": "customer"}}},
            {"id": "high", "type": "filter",
             "config": {"conditions": [{"field": "amount", "operator": "gte", "value": 10}]}},
            {"id": "customers", "type": "dataSource", "config": {"databaseId": "customers"}},
            {"id": "orders", "type": "dataSource", "config": {"databaseId": "orders"}},
            {"id": "by_name", "type": "aggregate",
             "config": {"groupBy": ["name"],
                        "aggregations": [{"field": "amount", "function": "sum", "alias": "spent"},
                                         {"function": "count"}]}}
        ],
        "edges": [
            {"source": "orders", "target": "high"},
            {"source": "high", "target": "join", "targetHandle": "input-0"},
            {"source": "customers", "target": "join", "targetHandle": "input-1"},
            {"source": "join", "target": "by_name"}
        ]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert!(result.is_success(), "{:?}", result.error);

    let position = |id: &str| result.node_results.get_index_of(id).unwrap();
    for edge in &definition.edges {
        assert!(position(&edge.source) < position(&edge.target));
    }

    assert_eq!(
        result.data,
        rows_from_json(json!([{"name": "Ada", "spent": 42.5, "count": 2}]))
    );
}

#[tokio::test]
async fn test_linear_chain_has_single_leaf() {
    let ctx = default_context().await;
    let result = ctx
        .context
        .executor()
        .execute(&sum_pipeline("p4"), false)
        .await;
    assert_eq!(result.leaf_results.len(), 1);
    assert_eq!(result.leaf_results[0].node_id, "agg");
}

#[tokio::test]
async fn test_custom_node_receives_inputs_in_handle_order() {
    let ctx = test_context(
        EngineConfig::default(),
        RecordingEvaluator::returning(json!([{"merged": true}])),
    )
    .await;
    let definition = pipeline(json!({
        "id": "p5",
        "name": "custom merge",
        "nodes": [
            {"id": "numbers", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "customers", "type": "dataSource", "config": {"databaseId": "customers"}},
            {"id": "code", "type": "custom",
             "config": {"code": "function process(a, b) { return a.concat(b); }"}}
        ],
        "edges": [
            {"source": "numbers", "target": "code", "targetHandle": "input-1"},
            {"source": "customers", "target": "code", "targetHandle": "input-0"}
        ]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.data, rows_from_json(json!([{"merged": true}])));

    let calls = ctx.evaluator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    assert_eq!(calls[0][0][0]["name"], json!("Ada"));
    assert_eq!(calls[0][1][0]["a"], json!(1));
}

#[tokio::test]
async fn test_single_input_custom_node_gets_one_argument() {
    let ctx = test_context(EngineConfig::default(), RecordingEvaluator::returning(json!([]))).await;
    let definition = pipeline(json!({
        "id": "p6",
        "name": "custom single",
        "nodes": [
            {"id": "numbers", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "code", "type": "custom", "config": {"code": "function process(rows) { return rows; }"}}
        ],
        "edges": [{"source": "numbers", "target": "code"}]
    }));

    ctx.context.executor().execute(&definition, false).await;
    let calls = ctx.evaluator.calls();
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0].len(), 3);
}

#[tokio::test]
async fn test_non_array_custom_result_fails_pipeline() {
    let ctx = test_context(
        EngineConfig::default(),
        RecordingEvaluator::returning(json!({"not": "rows"})),
    )
    .await;
    let definition = pipeline(json!({
        "id": "p7",
        "name": "bad custom",
        "nodes": [
            {"id": "numbers", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "code", "type": "custom", "label": "Script"}
        ],
        "edges": [{"source": "numbers", "target": "code"}]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("Custom code failed at node 'Script': process() must return an array, got object")
    );
    assert!(result.node_results.is_empty());
    assert!(result.leaf_results.is_empty());
    assert!(result.data.is_empty());
}

#[tokio::test]
async fn test_missing_table_aborts_with_node_label() {
    let ctx = default_context().await;
    let definition = pipeline(json!({
        "id": "p8",
        "name": "missing table",
        "nodes": [
            {"id": "ok", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "gone", "type": "dataSource", "label": "Archive", "config": {"databaseId": "archive"}}
        ],
        "edges": []
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert_eq!(
        result.error.as_deref(),
        Some("Failed to load data for node 'Archive': Table 'archive' not found")
    );
    assert!(result.node_results.is_empty());
}

#[tokio::test]
async fn test_pipeline_without_data_source_fails() {
    let ctx = default_context().await;
    let definition = pipeline(json!({
        "id": "p9",
        "name": "no source",
        "nodes": [{"id": "f", "type": "filter"}],
        "edges": []
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert_eq!(result.error.as_deref(), Some("Pipeline has no data source node"));
}

#[tokio::test]
async fn test_transform_chain() {
    let ctx = default_context().await;
    let definition = pipeline(json!({
        "id": "p10",
        "name": "transforms",
        "nodes": [
            {"id": "orders", "type": "dataSource", "config": {"databaseId": "orders"}},
            {"id": "t", "type": "transform", "config": {"operations": [
                {"type": "cast", "field": "amount", "to": "number"},
                {"type": "calculate", "field": "with_tax", "expression": "amount * 2"},
                {"type": "rename", "from": "customer", "to": "client"},
                {"type": "drop", "fields": ["region", "id"]}
            ]}},
            {"id": "south", "type": "filter",
             "config": {"conditions": [{"field": "client", "operator": "equals", "value": "c2"}]}}
        ],
        "edges": [
            {"source": "orders", "target": "t"},
            {"source": "t", "target": "south"}
        ]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(
        result.data,
        rows_from_json(json!([{"client": "c2", "amount": 7, "with_tax": 14}]))
    );
}

#[tokio::test(start_paused = true)]
async fn test_execution_deadline_turns_into_error() {
    let config = EngineConfig {
        execution_timeout_secs: Some(2),
        ..EngineConfig::default()
    };
    let ctx = test_context(
        config,
        RecordingEvaluator::returning(json!([])).with_delay(Duration::from_secs(30)),
    )
    .await;
    let definition = pipeline(json!({
        "id": "p11",
        "name": "slow",
        "nodes": [
            {"id": "numbers", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "code", "type": "custom"}
        ],
        "edges": [{"source": "numbers", "target": "code"}]
    }));

    let result = ctx.context.executor().execute(&definition, true).await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("Pipeline execution timed out after 2s")
    );

    // failures are never cached
    assert_eq!(ctx.context.cache_stats().await.executions.entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_in_toml_runs_without_deadline() {
    let config = EngineConfig::from_toml_str("execution_timeout_secs = 0\n").unwrap();
    let ctx = test_context(
        config,
        RecordingEvaluator::returning(json!([{"done": true}]))
            .with_delay(Duration::from_millis(20)),
    )
    .await;
    let definition = pipeline(json!({
        "id": "p12",
        "name": "no deadline",
        "nodes": [
            {"id": "numbers", "type": "dataSource", "config": {"databaseId": "numbers"}},
            {"id": "code", "type": "custom"}
        ],
        "edges": [{"source": "numbers", "target": "code"}]
    }));

    let result = ctx.context.executor().execute(&definition, false).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.data, rows_from_json(json!([{"done": true}])));
}
