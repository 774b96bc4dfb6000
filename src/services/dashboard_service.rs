use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStore, DashboardElementData};
use crate::errors::{PipelineError, PipelineResult};

use super::PipelineService;

/// Serves the rows behind dashboard elements. Each element shows the output
/// of one pipeline node.
pub struct DashboardService {
    pipelines: Arc<PipelineService>,
    cache: Arc<CacheStore>,
}

impl DashboardService {
    pub fn new(pipelines: Arc<PipelineService>, cache: Arc<CacheStore>) -> Self {
        Self { pipelines, cache }
    }

    pub async fn element_rows(
        &self,
        dashboard_id: &str,
        element_id: &str,
        pipeline_id: &str,
        node_id: &str,
        use_cache: bool,
    ) -> PipelineResult<DashboardElementData> {
        if use_cache {
            if let Some(data) = self.cache.get_dashboard_element(dashboard_id, element_id).await {
                if data.pipeline_id == pipeline_id && data.node_id == node_id {
                    return Ok(data);
                }
            }
        }

        let result = self.pipelines.execute_pipeline(pipeline_id, use_cache).await?;
        if let Some(message) = result.error {
            return Err(PipelineError::ExecutionFailed(message));
        }
        let rows = result.node_results.get(node_id).ok_or_else(|| {
            PipelineError::NotFound(format!("{}:{}", pipeline_id, node_id))
        })?;

        debug!(
            "Dashboard {} element {} refreshed from pipeline {}",
            dashboard_id, element_id, pipeline_id
        );
        Ok(self
            .cache
            .put_dashboard_element(dashboard_id, element_id, pipeline_id, node_id, rows)
            .await)
    }
}
