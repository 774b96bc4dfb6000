//! Pipeline execution error types
//!
//! Every failure inside the node-execution loop is mapped onto one of these
//! variants. The engine never surfaces them as raw errors: they are rendered
//! into the `status` of an `ExecutionResult`.
//!
//! # Examples
//!
//! ```rust
//! use rowdag::errors::PipelineError;
//!
//! let err = PipelineError::MissingDataSource {
//!     node: "Orders".to_string(),
//! };
//! assert!(err.is_configuration_error());
//! assert_eq!(err.error_code(), "VALIDATION_FAILED");
//! ```

use std::time::Duration;

use thiserror::Error;

use super::{CustomCodeError, RowStoreError};

/// Pipeline validation and execution errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline not found by ID
    #[error("Pipeline '{0}' not found")]
    NotFound(String),

    /// The pipeline has no data source node at all
    #[error("Pipeline has no data source node")]
    NoDataSource,

    /// A data source node has no table reference configured
    #[error("Data source node '{node}' has no database configured")]
    MissingDataSource {
        /// Label of the offending node
        node: String,
    },

    /// Invalid pipeline or node configuration
    #[error("Invalid configuration for node '{node}': {reason}")]
    InvalidConfig {
        /// Node label, or the pipeline id for structural problems
        node: String,
        /// What is wrong with it
        reason: String,
    },

    /// Reachable nodes could not be ordered
    #[error("Cycle detected between nodes: {0}")]
    CycleDetected(String),

    /// Row store failure while loading a data source
    #[error("Failed to load data for node '{node}': {source}")]
    UpstreamFetch {
        /// Label of the data source node
        node: String,
        /// Underlying row store failure
        #[source]
        source: RowStoreError,
    },

    /// A row transform, aggregate or join failed
    #[error("Evaluation failed at node '{node}': {reason}")]
    Evaluation {
        /// Label of the failing node
        node: String,
        /// Reason for failure
        reason: String,
    },

    /// A custom code node failed
    #[error("Custom code failed at node '{node}': {source}")]
    CustomCode {
        /// Label of the custom node
        node: String,
        /// Evaluator failure
        #[source]
        source: CustomCodeError,
    },

    /// A run requested through a service ended with an error status
    #[error("Pipeline execution failed: {0}")]
    ExecutionFailed(String),

    /// Whole execution exceeded its deadline
    #[error("Pipeline execution timed out after {0:?}")]
    Timeout(Duration),

    /// Pipeline definition could not be parsed
    #[error("Invalid pipeline definition: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_config(node: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn evaluation(node: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Evaluation {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error stems from the pipeline definition itself
    pub fn is_configuration_error(&self) -> bool {
        match self {
            PipelineError::NoDataSource
            | PipelineError::MissingDataSource { .. }
            | PipelineError::InvalidConfig { .. }
            | PipelineError::CycleDetected(_)
            | PipelineError::InvalidFormat(_) => true,
            PipelineError::CustomCode { source, .. } => {
                matches!(source, CustomCodeError::NonArrayResult(_))
            }
            _ => false,
        }
    }

    /// Check if this is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound(_))
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::NoDataSource
            | PipelineError::MissingDataSource { .. }
            | PipelineError::InvalidConfig { .. }
            | PipelineError::InvalidFormat(_) => "VALIDATION_FAILED",
            PipelineError::CycleDetected(_) => "CYCLE_DETECTED",
            PipelineError::UpstreamFetch { .. } => "UPSTREAM_FAILED",
            PipelineError::Evaluation { .. }
            | PipelineError::CustomCode { .. }
            | PipelineError::ExecutionFailed(_) => "EXECUTION_FAILED",
            PipelineError::Timeout(_) => "TIMEOUT",
        }
    }
}
