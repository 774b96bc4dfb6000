use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::pipeline::NodeType;
use crate::rows::RowSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Output of a leaf node. `truncated` and `total_rows` describe how the rows
/// relate to the full result when they were served from the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafResult {
    pub node_id: String,
    pub node_label: String,
    pub node_type: NodeType,
    pub rows: RowSet,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub total_rows: usize,
}

impl LeafResult {
    pub fn new(
        node_id: impl Into<String>,
        node_label: impl Into<String>,
        node_type: NodeType,
        rows: RowSet,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_label: node_label.into(),
            node_type,
            total_rows: rows.len(),
            rows,
            truncated: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub pipeline_id: String,
    pub structural_hash: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rows per reachable node, in execution order.
    pub node_results: IndexMap<String, RowSet>,
    pub leaf_results: Vec<LeafResult>,
    /// Rows of the first leaf, for consumers that predate `leaf_results`.
    pub data: RowSet,
    /// Milliseconds spent executing. A cache hit reports the original run's time.
    pub execution_time: u64,
    pub cached: bool,
}

impl ExecutionResult {
    pub fn success(
        execution_id: String,
        pipeline_id: &str,
        structural_hash: String,
        node_results: IndexMap<String, RowSet>,
        leaf_results: Vec<LeafResult>,
        execution_time: u64,
        cached: bool,
    ) -> Self {
        let data = leaf_results
            .first()
            .map(|leaf| leaf.rows.clone())
            .unwrap_or_default();
        Self {
            execution_id,
            pipeline_id: pipeline_id.to_string(),
            structural_hash,
            status: ExecutionStatus::Success,
            error: None,
            node_results,
            leaf_results,
            data,
            execution_time,
            cached,
        }
    }

    pub fn failure(
        execution_id: String,
        pipeline_id: &str,
        structural_hash: String,
        message: String,
        execution_time: u64,
    ) -> Self {
        Self {
            execution_id,
            pipeline_id: pipeline_id.to_string(),
            structural_hash,
            status: ExecutionStatus::Error,
            error: Some(message),
            node_results: IndexMap::new(),
            leaf_results: Vec::new(),
            data: Vec::new(),
            execution_time,
            cached: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn leaf(&self, node_id: &str) -> Option<&LeafResult> {
        self.leaf_results.iter().find(|leaf| leaf.node_id == node_id)
    }
}
