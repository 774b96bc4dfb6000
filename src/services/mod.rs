pub mod dashboard_service;
pub mod pipeline_service;

pub use dashboard_service::DashboardService;
pub use pipeline_service::PipelineService;
