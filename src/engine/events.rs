use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::NodeType;
use crate::utils::EventBroadcaster;

/// Lifecycle of one pipeline execution, published per pipeline id.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        execution_id: String,
        pipeline_id: String,
        structural_hash: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        node_type: NodeType,
        row_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        execution_id: String,
        execution_time: u64,
        leaf_count: usize,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        execution_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    CacheHit {
        execution_id: String,
        structural_hash: String,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::Started { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::Completed { execution_id, .. }
            | ExecutionEvent::Failed { execution_id, .. }
            | ExecutionEvent::CacheHit { execution_id, .. } => execution_id,
        }
    }
}

/// Broadcaster keyed by pipeline id.
pub type ExecutionEvents = EventBroadcaster<String, ExecutionEvent>;
