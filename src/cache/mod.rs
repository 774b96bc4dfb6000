//! Result cache
//!
//! Three independent TTL maps: pipeline execution results keyed by pipeline
//! id, node column metadata keyed by `(pipelineId, nodeId)` and dashboard element
//! rows keyed by `(dashboardId, elementId)`. Stored row sets are bounded, so a
//! cached result may only be a sample of the real one; `truncated` and
//! `total_rows` say so.
//!
//! Lookups never hold a lock across compute: callers check, compute and then
//! write, and concurrent writers simply overwrite each other.

mod entry;
mod sweeper;

pub use entry::CacheEntry;
pub use sweeper::SweeperHandle;

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::LeafResult;
use crate::pipeline::Pipeline;
use crate::rows::{ColumnMetadata, Row, RowSet};

use entry::TimedMap;

/// TTL and capacity of one cache map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CachePolicy {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub executions: CachePolicy,
    pub metadata: CachePolicy,
    pub dashboard: CachePolicy,
    pub node_row_limit: usize,
    pub leaf_row_limit: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            executions: CachePolicy::new(Duration::from_secs(300), 100),
            metadata: CachePolicy::new(Duration::from_secs(600), 500),
            dashboard: CachePolicy::new(Duration::from_secs(120), 200),
            node_row_limit: 1_000,
            leaf_row_limit: 500,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// A row set cut down to a row limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundedRows {
    pub rows: RowSet,
    pub truncated: bool,
    pub total_rows: usize,
}

impl BoundedRows {
    pub fn bound(rows: &[Row], limit: usize) -> Self {
        Self {
            rows: rows.iter().take(limit).cloned().collect(),
            truncated: rows.len() > limit,
            total_rows: rows.len(),
        }
    }
}

/// Cached outcome of a successful pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineExecutionCache {
    pub pipeline_id: String,
    pub structural_hash: String,
    pub node_results: IndexMap<String, BoundedRows>,
    pub leaf_results: Vec<LeafResult>,
    pub execution_time: u64,
}

impl PipelineExecutionCache {
    pub fn node_rows(&self) -> IndexMap<String, RowSet> {
        self.node_results
            .iter()
            .map(|(id, bounded)| (id.clone(), bounded.rows.clone()))
            .collect()
    }
}

/// Rows shown by one dashboard element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardElementData {
    pub pipeline_id: String,
    pub node_id: String,
    #[serde(flatten)]
    pub rows: BoundedRows,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub executions: MapStats,
    pub metadata: MapStats,
    pub dashboard: MapStats,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct CacheStore {
    config: CacheConfig,
    executions: RwLock<TimedMap<String, PipelineExecutionCache>>,
    metadata: RwLock<TimedMap<(String, String), Vec<ColumnMetadata>>>,
    dashboard: RwLock<TimedMap<(String, String), DashboardElementData>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn metadata_key(pipeline_id: &str, node_id: &str) -> (String, String) {
    (pipeline_id.to_string(), node_id.to_string())
}

fn dashboard_key(dashboard_id: &str, element_id: &str) -> (String, String) {
    (dashboard_id.to_string(), element_id.to_string())
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            executions: RwLock::new(TimedMap::new(config.executions)),
            metadata: RwLock::new(TimedMap::new(config.metadata)),
            dashboard: RwLock::new(TimedMap::new(config.dashboard)),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Starts the periodic purge of expired entries.
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        sweeper::spawn_sweeper(self, self.config.sweep_interval)
    }

    fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    /// Stores a pipeline run, bounding every node and leaf row set.
    pub async fn put(
        &self,
        pipeline_id: &str,
        structural_hash: &str,
        node_results: &IndexMap<String, RowSet>,
        leaf_results: &[LeafResult],
        execution_time: u64,
    ) {
        let node_results = node_results
            .iter()
            .map(|(id, rows)| (id.clone(), BoundedRows::bound(rows, self.config.node_row_limit)))
            .collect();
        let leaf_results = leaf_results
            .iter()
            .map(|leaf| {
                let bounded = BoundedRows::bound(&leaf.rows, self.config.leaf_row_limit);
                LeafResult {
                    node_id: leaf.node_id.clone(),
                    node_label: leaf.node_label.clone(),
                    node_type: leaf.node_type,
                    rows: bounded.rows,
                    truncated: leaf.truncated || bounded.truncated,
                    total_rows: leaf.total_rows.max(bounded.total_rows),
                }
            })
            .collect();

        let cached = PipelineExecutionCache {
            pipeline_id: pipeline_id.to_string(),
            structural_hash: structural_hash.to_string(),
            node_results,
            leaf_results,
            execution_time,
        };

        let evicted = self
            .executions
            .write()
            .await
            .insert(pipeline_id.to_string(), cached);
        self.record_evictions(evicted);
        debug!("Cached execution of pipeline {}", pipeline_id);
    }

    /// Cached run of `pipeline_id`, if present, fresh and computed from a
    /// pipeline with the same structural hash. Stale entries are dropped.
    pub async fn get(
        &self,
        pipeline_id: &str,
        structural_hash: &str,
    ) -> Option<PipelineExecutionCache> {
        let now = Instant::now();
        {
            let executions = self.executions.read().await;
            match executions.get(pipeline_id) {
                None => {
                    self.record_lookup(false);
                    return None;
                }
                Some(entry)
                    if !entry.is_expired_at(now)
                        && entry.value.structural_hash == structural_hash =>
                {
                    self.record_lookup(true);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut executions = self.executions.write().await;
        let stale = executions.get(pipeline_id).is_some_and(|entry| {
            entry.is_expired_at(now) || entry.value.structural_hash != structural_hash
        });
        if stale {
            executions.remove(pipeline_id);
            debug!("Dropped stale cache entry for pipeline {}", pipeline_id);
        }
        self.record_lookup(false);
        None
    }

    pub async fn put_metadata(
        &self,
        pipeline_id: &str,
        node_id: &str,
        columns: Vec<ColumnMetadata>,
    ) {
        let evicted = self
            .metadata
            .write()
            .await
            .insert(metadata_key(pipeline_id, node_id), columns);
        self.record_evictions(evicted);
    }

    pub async fn get_metadata(&self, pipeline_id: &str, node_id: &str) -> Option<Vec<ColumnMetadata>> {
        let key = metadata_key(pipeline_id, node_id);
        let value = get_fresh(&self.metadata, &key).await;
        self.record_lookup(value.is_some());
        value
    }

    /// Stores dashboard element rows, bounded by the leaf row limit.
    pub async fn put_dashboard_element(
        &self,
        dashboard_id: &str,
        element_id: &str,
        pipeline_id: &str,
        node_id: &str,
        rows: &[Row],
    ) -> DashboardElementData {
        let data = DashboardElementData {
            pipeline_id: pipeline_id.to_string(),
            node_id: node_id.to_string(),
            rows: BoundedRows::bound(rows, self.config.leaf_row_limit),
        };
        let evicted = self
            .dashboard
            .write()
            .await
            .insert(dashboard_key(dashboard_id, element_id), data.clone());
        self.record_evictions(evicted);
        data
    }

    pub async fn get_dashboard_element(
        &self,
        dashboard_id: &str,
        element_id: &str,
    ) -> Option<DashboardElementData> {
        let key = dashboard_key(dashboard_id, element_id);
        let value = get_fresh(&self.dashboard, &key).await;
        self.record_lookup(value.is_some());
        value
    }

    /// Drops everything cached for a pipeline: its execution result, node
    /// metadata and dashboard elements fed by it.
    pub async fn invalidate(&self, pipeline_id: &str) {
        let removed_execution = self.executions.write().await.remove(pipeline_id).is_some();

        let removed_metadata = self
            .metadata
            .write()
            .await
            .remove_where(|(pipeline, _), _| pipeline == pipeline_id);

        let removed_elements = self
            .dashboard
            .write()
            .await
            .remove_where(|_, data| data.pipeline_id == pipeline_id);

        debug!(
            "Invalidated pipeline {} (execution: {}, metadata: {}, dashboard elements: {})",
            pipeline_id, removed_execution, removed_metadata, removed_elements
        );
    }

    /// Invalidates every pipeline with a data source reading `database_id`
    /// and returns their ids.
    pub async fn invalidate_by_data_source(
        &self,
        database_id: &str,
        pipelines: &[Pipeline],
    ) -> Vec<String> {
        let mut invalidated = Vec::new();
        for pipeline in pipelines
            .iter()
            .filter(|pipeline| pipeline.references_database(database_id))
        {
            self.invalidate(&pipeline.id).await;
            invalidated.push(pipeline.id.clone());
        }

        if !invalidated.is_empty() {
            info!(
                "Database {} changed, invalidated pipelines: {}",
                database_id,
                invalidated.join(", ")
            );
        }
        invalidated
    }

    /// Removes expired entries from all maps, returning how many went.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.executions.write().await.purge_expired(now)
            + self.metadata.write().await.purge_expired(now)
            + self.dashboard.write().await.purge_expired(now)
    }

    pub async fn clear_all(&self) {
        self.executions.write().await.clear();
        self.metadata.write().await.clear();
        self.dashboard.write().await.clear();
        info!("Cleared all caches");
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            executions: map_stats(&self.executions).await,
            metadata: map_stats(&self.metadata).await,
            dashboard: map_stats(&self.dashboard).await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

async fn get_fresh<K: Hash + Eq, T: Clone>(map: &RwLock<TimedMap<K, T>>, key: &K) -> Option<T> {
    let now = Instant::now();
    {
        let guard = map.read().await;
        match guard.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
    }

    let mut guard = map.write().await;
    if guard.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
        guard.remove(key);
    }
    None
}

async fn map_stats<K: Hash + Eq, T>(map: &RwLock<TimedMap<K, T>>) -> MapStats {
    let guard = map.read().await;
    let policy = guard.policy();
    MapStats {
        entries: guard.len(),
        max_entries: policy.max_entries,
        ttl_secs: policy.ttl.as_secs(),
    }
}
