use std::sync::Arc;

use crate::cache::{CacheStats, CacheStore, SweeperHandle};
use crate::config::EngineConfig;
use crate::custom::{CustomCodeEvaluator, ProcessEvaluator};
use crate::engine::{ExecutionEvents, PipelineExecutor};
use crate::services::{DashboardService, PipelineService};
use crate::store::{InMemoryPipelineStore, PipelineStore, RowStore};

/// Owns one engine: cache, executor and the services on top of them.
/// Several contexts can live in one process without sharing state.
#[derive(Clone)]
pub struct AppContext {
    config: EngineConfig,
    cache: Arc<CacheStore>,
    executor: Arc<PipelineExecutor>,
    pipeline_service: Arc<PipelineService>,
    dashboard_service: Arc<DashboardService>,
}

impl AppContext {
    /// Context with an in-memory pipeline store and the out-of-process
    /// custom code evaluator.
    pub fn new(config: EngineConfig, row_store: Arc<dyn RowStore>) -> Self {
        let evaluator = Arc::new(ProcessEvaluator::new(config.custom_code()));
        Self::with_collaborators(
            config,
            row_store,
            Arc::new(InMemoryPipelineStore::new()),
            evaluator,
        )
    }

    pub fn with_collaborators(
        config: EngineConfig,
        row_store: Arc<dyn RowStore>,
        pipeline_store: Arc<dyn PipelineStore>,
        evaluator: Arc<dyn CustomCodeEvaluator>,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(config.cache_config()));
        let executor = Arc::new(PipelineExecutor::new(
            &config,
            row_store,
            cache.clone(),
            evaluator,
        ));
        let pipeline_service = Arc::new(PipelineService::new(pipeline_store, executor.clone()));
        let dashboard_service = Arc::new(DashboardService::new(
            pipeline_service.clone(),
            cache.clone(),
        ));

        Self {
            config,
            cache,
            executor,
            pipeline_service,
            dashboard_service,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<CacheStore> {
        self.cache.clone()
    }

    pub fn executor(&self) -> Arc<PipelineExecutor> {
        self.executor.clone()
    }

    pub fn pipeline_service(&self) -> Arc<PipelineService> {
        self.pipeline_service.clone()
    }

    pub fn dashboard_service(&self) -> Arc<DashboardService> {
        self.dashboard_service.clone()
    }

    pub fn events(&self) -> &ExecutionEvents {
        self.executor.events()
    }

    /// Starts the background purge of expired cache entries. Must be called
    /// from within a tokio runtime; the sweep stops when the handle drops.
    pub fn start_sweeper(&self) -> SweeperHandle {
        self.cache.start_sweeper()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}
