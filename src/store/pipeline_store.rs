use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::Pipeline;

/// Persistence of pipeline definitions.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get(&self, id: &str) -> PipelineResult<Pipeline>;

    async fn list(&self) -> PipelineResult<Vec<Pipeline>>;

    /// Stores the pipeline, replacing any previous revision with the same id.
    async fn save(&self, pipeline: Pipeline) -> PipelineResult<()>;

    /// Removes a pipeline. Returns false when no pipeline had that id.
    async fn delete(&self, id: &str) -> PipelineResult<bool>;
}

#[derive(Default)]
pub struct InMemoryPipelineStore {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn get(&self, id: &str) -> PipelineResult<Pipeline> {
        self.pipelines
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    async fn list(&self) -> PipelineResult<Vec<Pipeline>> {
        let mut pipelines: Vec<Pipeline> = self.pipelines.read().await.values().cloned().collect();
        pipelines.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pipelines)
    }

    async fn save(&self, pipeline: Pipeline) -> PipelineResult<()> {
        self.pipelines
            .write()
            .await
            .insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    async fn delete(&self, id: &str) -> PipelineResult<bool> {
        Ok(self.pipelines.write().await.remove(id).is_some())
    }
}
