use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::engine::{ExecutionResult, PipelineExecutor};
use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::Pipeline;
use crate::rows::{infer_columns, ColumnMetadata};
use crate::store::PipelineStore;

/// Pipeline lifecycle operations that keep the result cache coherent with the
/// stored definitions.
pub struct PipelineService {
    store: Arc<dyn PipelineStore>,
    executor: Arc<PipelineExecutor>,
}

impl PipelineService {
    pub fn new(store: Arc<dyn PipelineStore>, executor: Arc<PipelineExecutor>) -> Self {
        Self { store, executor }
    }

    fn cache(&self) -> &CacheStore {
        self.executor.cache()
    }

    pub async fn get_pipeline(&self, id: &str) -> PipelineResult<Pipeline> {
        self.store.get(id).await
    }

    pub async fn list_pipelines(&self) -> PipelineResult<Vec<Pipeline>> {
        self.store.list().await
    }

    /// Loads and executes a stored pipeline.
    pub async fn execute_pipeline(&self, id: &str, use_cache: bool) -> PipelineResult<ExecutionResult> {
        let pipeline = self.store.get(id).await?;
        Ok(self.executor.execute(&pipeline, use_cache).await)
    }

    /// Stores a new revision. Updating an existing pipeline bumps its version
    /// and drops everything cached for it.
    pub async fn save_pipeline(&self, mut pipeline: Pipeline) -> PipelineResult<Pipeline> {
        pipeline.validate()?;

        match self.store.get(&pipeline.id).await {
            Ok(existing) => {
                pipeline.version = existing.version + 1;
                self.cache().invalidate(&pipeline.id).await;
                info!("Updated pipeline {} to version {}", pipeline.id, pipeline.version);
            }
            Err(err) if err.is_not_found() => {
                pipeline.version = pipeline.version.max(1);
                info!("Created pipeline {}", pipeline.id);
            }
            Err(err) => return Err(err),
        }

        self.store.save(pipeline.clone()).await?;
        Ok(pipeline)
    }

    pub async fn delete_pipeline(&self, id: &str) -> PipelineResult<()> {
        if !self.store.delete(id).await? {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        self.cache().invalidate(id).await;
        info!("Deleted pipeline {}", id);
        Ok(())
    }

    /// Drops cached results of every pipeline reading `database_id`.
    pub async fn handle_database_deleted(&self, database_id: &str) -> PipelineResult<Vec<String>> {
        let pipelines = self.store.list().await?;
        Ok(self
            .cache()
            .invalidate_by_data_source(database_id, &pipelines)
            .await)
    }

    /// Columns produced by a node, inferred from its rows. Unreachable nodes
    /// produce no rows and therefore no columns.
    pub async fn node_columns(
        &self,
        pipeline_id: &str,
        node_id: &str,
    ) -> PipelineResult<Vec<ColumnMetadata>> {
        if let Some(columns) = self.cache().get_metadata(pipeline_id, node_id).await {
            return Ok(columns);
        }

        let pipeline = self.store.get(pipeline_id).await?;
        if pipeline.node(node_id).is_none() {
            return Err(PipelineError::NotFound(format!("{}:{}", pipeline_id, node_id)));
        }

        let result = self.executor.execute(&pipeline, true).await;
        if let Some(message) = result.error {
            return Err(PipelineError::ExecutionFailed(message));
        }

        let columns = result
            .node_results
            .get(node_id)
            .map(|rows| infer_columns(rows))
            .unwrap_or_default();
        debug!(
            "Inferred {} columns for {}:{}",
            columns.len(),
            pipeline_id,
            node_id
        );
        self.cache()
            .put_metadata(pipeline_id, node_id, columns.clone())
            .await;
        Ok(columns)
    }
}
