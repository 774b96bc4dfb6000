//! Pipeline execution engine
//!
//! Executes every node reachable from a data source, in dependency order,
//! and memoizes successful runs in the [`CacheStore`] keyed by pipeline id and
//! structural hash.

pub mod events;
pub mod graph;
pub mod result;

pub use events::{ExecutionEvent, ExecutionEvents};
pub use graph::{ExecutionGraph, NodeInput};
pub use result::{ExecutionResult, ExecutionStatus, LeafResult};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::custom::{rows_from_output, CustomCodeEvaluator};
use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::{NodeConfig, Pipeline, PipelineNode};
use crate::rows::{aggregate_rows, filter_rows, join_rows, transform_rows, RowSet};
use crate::store::RowStore;

/// Rows per node plus the leaf outputs of one successful run.
type RunOutput = (IndexMap<String, RowSet>, Vec<LeafResult>);

pub struct PipelineExecutor {
    row_store: Arc<dyn RowStore>,
    cache: Arc<CacheStore>,
    evaluator: Arc<dyn CustomCodeEvaluator>,
    events: ExecutionEvents,
    page_size: usize,
    execution_timeout: Option<Duration>,
}

impl PipelineExecutor {
    pub fn new(
        config: &EngineConfig,
        row_store: Arc<dyn RowStore>,
        cache: Arc<CacheStore>,
        evaluator: Arc<dyn CustomCodeEvaluator>,
    ) -> Self {
        Self {
            row_store,
            cache,
            evaluator,
            events: ExecutionEvents::default(),
            page_size: config.data_source_page_size.max(1),
            execution_timeout: config.execution_timeout(),
        }
    }

    /// Publishes lifecycle events on `events` instead of a private broadcaster.
    pub fn with_events(mut self, events: ExecutionEvents) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &ExecutionEvents {
        &self.events
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Executes `pipeline`, or serves its cached result when `use_cache` is
    /// set and a fresh entry with the same structural hash exists. Failures
    /// are reported through the result's status.
    pub async fn execute(&self, pipeline: &Pipeline, use_cache: bool) -> ExecutionResult {
        let idle = self.events.cleanup_idle().await;
        if idle > 0 {
            debug!("Dropped {} idle event channel(s)", idle);
        }

        let execution_id = Uuid::new_v4().to_string();
        let structural_hash = pipeline.structural_hash();

        if use_cache {
            if let Some(cached) = self.cache.get(&pipeline.id, &structural_hash).await {
                info!(
                    "Serving pipeline {} from cache (hash {})",
                    pipeline.id,
                    &structural_hash[..12]
                );
                self.publish(
                    pipeline,
                    ExecutionEvent::CacheHit {
                        execution_id: execution_id.clone(),
                        structural_hash: structural_hash.clone(),
                    },
                )
                .await;
                let node_results = cached.node_rows();
                return ExecutionResult::success(
                    execution_id,
                    &pipeline.id,
                    structural_hash,
                    node_results,
                    cached.leaf_results,
                    cached.execution_time,
                    true,
                );
            }
        }

        info!(
            "Executing pipeline {} ({} nodes, {} edges)",
            pipeline.id,
            pipeline.nodes.len(),
            pipeline.edges.len()
        );
        self.publish(
            pipeline,
            ExecutionEvent::Started {
                execution_id: execution_id.clone(),
                pipeline_id: pipeline.id.clone(),
                structural_hash: structural_hash.clone(),
                timestamp: Utc::now(),
            },
        )
        .await;

        let started = Instant::now();
        let run = self.run(pipeline, &execution_id);
        let outcome = match self.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(PipelineError::Timeout(limit))),
            None => run.await,
        };
        let execution_time = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((node_results, leaf_results)) => {
                self.cache
                    .put(
                        &pipeline.id,
                        &structural_hash,
                        &node_results,
                        &leaf_results,
                        execution_time,
                    )
                    .await;
                info!(
                    "Pipeline {} finished in {}ms with {} leaf result(s)",
                    pipeline.id,
                    execution_time,
                    leaf_results.len()
                );
                self.publish(
                    pipeline,
                    ExecutionEvent::Completed {
                        execution_id: execution_id.clone(),
                        execution_time,
                        leaf_count: leaf_results.len(),
                        timestamp: Utc::now(),
                    },
                )
                .await;
                ExecutionResult::success(
                    execution_id,
                    &pipeline.id,
                    structural_hash,
                    node_results,
                    leaf_results,
                    execution_time,
                    false,
                )
            }
            Err(err) => {
                if err.is_configuration_error() {
                    warn!("Pipeline {} is misconfigured: {}", pipeline.id, err);
                } else {
                    error!("Pipeline {} failed: {}", pipeline.id, err);
                }
                let message = err.to_string();
                self.publish(
                    pipeline,
                    ExecutionEvent::Failed {
                        execution_id: execution_id.clone(),
                        error: message.clone(),
                        timestamp: Utc::now(),
                    },
                )
                .await;
                ExecutionResult::failure(
                    execution_id,
                    &pipeline.id,
                    structural_hash,
                    message,
                    execution_time,
                )
            }
        }
    }

    async fn publish(&self, pipeline: &Pipeline, event: ExecutionEvent) {
        self.events.publish(pipeline.id.clone(), event).await;
    }

    async fn run(&self, pipeline: &Pipeline, execution_id: &str) -> PipelineResult<RunOutput> {
        pipeline.validate()?;
        if pipeline.data_sources().next().is_none() {
            return Err(PipelineError::NoDataSource);
        }

        let graph = ExecutionGraph::new(pipeline);
        let reachable = graph.reachable();
        let order = graph.topological_order(&reachable)?;
        debug!(
            "Pipeline {}: {} of {} nodes reachable",
            pipeline.id,
            order.len(),
            pipeline.nodes.len()
        );

        let mut node_results: IndexMap<String, RowSet> = IndexMap::with_capacity(order.len());
        for &node in &order {
            let input = graph.resolve_input(node, &node_results);
            let rows = self.execute_node(node, input).await?;
            debug!(
                "Node {} ({}) produced {} rows",
                node.label,
                node.node_type().as_str(),
                rows.len()
            );
            self.publish(
                pipeline,
                ExecutionEvent::NodeCompleted {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    node_type: node.node_type(),
                    row_count: rows.len(),
                },
            )
            .await;
            node_results.insert(node.id.clone(), rows);
        }

        let leaf_results = graph
            .leaves(&order)
            .into_iter()
            .map(|node| {
                let rows = node_results.get(&node.id).cloned().unwrap_or_default();
                LeafResult::new(&node.id, &node.label, node.node_type(), rows)
            })
            .collect();

        Ok((node_results, leaf_results))
    }

    async fn execute_node(&self, node: &PipelineNode, input: NodeInput) -> PipelineResult<RowSet> {
        match &node.config {
            NodeConfig::DataSource(_) => {
                let table = node
                    .config
                    .database_id()
                    .ok_or_else(|| PipelineError::MissingDataSource {
                        node: node.label.clone(),
                    })?;
                let page = self
                    .row_store
                    .fetch_rows(table, 1, self.page_size)
                    .await
                    .map_err(|source| PipelineError::UpstreamFetch {
                        node: node.label.clone(),
                        source,
                    })?;
                if page.total > page.rows.len() {
                    warn!(
                        "Data source {} loaded {} of {} rows",
                        node.label,
                        page.rows.len(),
                        page.total
                    );
                }
                Ok(page.rows)
            }
            NodeConfig::Filter(config) => Ok(filter_rows(&input.into_rows(), &config.conditions)),
            NodeConfig::Transform(config) => transform_rows(&input.into_rows(), &config.operations)
                .map_err(|err| PipelineError::evaluation(&node.label, err.to_string())),
            NodeConfig::Aggregate(config) => Ok(aggregate_rows(
                &input.into_rows(),
                &config.group_by,
                &config.aggregations,
            )),
            NodeConfig::Join(config) => {
                let condition = config
                    .condition
                    .as_ref()
                    .filter(|condition| condition.is_complete())
                    .ok_or_else(|| {
                        PipelineError::invalid_config(
                            &node.label,
                            "join requires leftField and rightField",
                        )
                    })?;
                let slots = input.into_slots();
                let [left, right, ..] = slots.as_slice() else {
                    return Err(PipelineError::invalid_config(
                        &node.label,
                        format!("join requires two inputs, got {}", slots.len()),
                    ));
                };
                Ok(join_rows(left, right, config.join_type, condition))
            }
            NodeConfig::Visualization(_) | NodeConfig::Dashboard(_) => Ok(input.into_rows()),
            NodeConfig::Custom(config) => {
                let wrap = |source| PipelineError::CustomCode {
                    node: node.label.clone(),
                    source,
                };
                let output = self
                    .evaluator
                    .evaluate(&config.code, input.into_slots())
                    .await
                    .map_err(wrap)?;
                rows_from_output(output).map_err(wrap)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::ProcessEvaluator;
    use crate::pipeline::{DataSourceConfig, FilterNodeConfig, JoinNodeConfig, PipelineEdge};
    use crate::rows::{rows_from_json, FilterCondition, FilterOperator, JoinCondition, JoinType};
    use crate::store::InMemoryRowStore;
    use serde_json::json;

    async fn executor(config: EngineConfig) -> PipelineExecutor {
        let store = InMemoryRowStore::new();
        store
            .insert_table("orders", rows_from_json(json!([{"id": 1, "c": 10}, {"id": 2, "c": 20}])))
            .await;
        store
            .insert_table("customers", rows_from_json(json!([{"c": 10, "name": "Ada"}])))
            .await;
        PipelineExecutor::new(
            &config,
            Arc::new(store),
            Arc::new(CacheStore::new(config.cache_config())),
            Arc::new(ProcessEvaluator::default()),
        )
    }

    fn source(id: &str, table: Option<&str>) -> PipelineNode {
        PipelineNode::new(
            id,
            NodeConfig::DataSource(DataSourceConfig {
                database_id: table.map(str::to_string),
            }),
        )
    }

    #[tokio::test]
    async fn join_uses_handle_order() {
        let pipeline = Pipeline::new(
            "p",
            "join",
            vec![
                source("customers", Some("customers")),
                source("orders", Some("orders")),
                PipelineNode::new(
                    "j",
                    NodeConfig::Join(JoinNodeConfig {
                        join_type: JoinType::Left,
                        condition: Some(JoinCondition::new("c", "c")),
                    }),
                ),
            ],
            vec![
                PipelineEdge::new("customers", "j").with_handle("input-1"),
                PipelineEdge::new("orders", "j").with_handle("input-0"),
            ],
        );
        let result = executor(EngineConfig::default()).await.execute(&pipeline, false).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            result.data,
            rows_from_json(json!([
                {"id": 1, "c": 10, "name": "Ada"},
                {"id": 2, "c": 20},
            ]))
        );
    }

    #[tokio::test]
    async fn join_without_condition_is_rejected() {
        let pipeline = Pipeline::new(
            "p",
            "join",
            vec![
                source("orders", Some("orders")),
                source("customers", Some("customers")),
                PipelineNode::new("j", NodeConfig::Join(JoinNodeConfig::default()))
                    .with_label("Match"),
            ],
            vec![
                PipelineEdge::new("orders", "j"),
                PipelineEdge::new("customers", "j").with_handle("input-1"),
            ],
        );
        let result = executor(EngineConfig::default()).await.execute(&pipeline, false).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(
            result.error.as_deref(),
            Some("Invalid configuration for node 'Match': join requires leftField and rightField")
        );
    }

    #[tokio::test]
    async fn missing_table_reference_names_node() {
        let pipeline = Pipeline::new(
            "p",
            "bad",
            vec![source("s", None).with_label("Orders")],
            vec![],
        );
        let result = executor(EngineConfig::default()).await.execute(&pipeline, false).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Data source node 'Orders' has no database configured")
        );
        assert!(result.node_results.is_empty());
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let pipeline = Pipeline::new(
            "p",
            "events",
            vec![
                source("s", Some("orders")),
                PipelineNode::new(
                    "f",
                    NodeConfig::Filter(FilterNodeConfig {
                        conditions: vec![FilterCondition::new("c", FilterOperator::Equals, json!(20))],
                    }),
                ),
            ],
            vec![PipelineEdge::new("s", "f")],
        );
        let executor = executor(EngineConfig::default()).await;
        let mut events = executor.events().subscribe("p".to_string()).await;

        let first = executor.execute(&pipeline, true).await;
        let second = executor.execute(&pipeline, true).await;
        assert!(second.cached);

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert!(matches!(received[0], ExecutionEvent::Started { .. }));
        assert!(matches!(
            received[2],
            ExecutionEvent::NodeCompleted { ref node_id, row_count: 1, .. } if node_id == "f"
        ));
        assert!(matches!(received[3], ExecutionEvent::Completed { leaf_count: 1, .. }));
        assert_eq!(received[3].execution_id(), first.execution_id);
        assert!(matches!(received[4], ExecutionEvent::CacheHit { .. }));
        assert_eq!(received.len(), 5);
    }

    #[tokio::test]
    async fn idle_event_channels_are_dropped_on_next_run() {
        let pipeline = Pipeline::new("p", "idle", vec![source("s", Some("orders"))], vec![]);
        let executor = executor(EngineConfig::default()).await;
        let gone = executor.events().subscribe("gone".to_string()).await;
        let _kept = executor.events().subscribe("p".to_string()).await;
        drop(gone);
        assert_eq!(executor.events().channel_count().await, 2);

        executor.execute(&pipeline, false).await;
        assert_eq!(executor.events().channel_count().await, 1);
        assert_eq!(executor.events().receiver_count(&"p".to_string()).await, 1);
    }
}
