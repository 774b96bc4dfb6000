pub mod cache;
pub mod config;
pub mod custom;
pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod rows;
pub mod store;

pub mod app_context;
pub use app_context::AppContext;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use engine::{ExecutionResult, PipelineExecutor};
pub use pipeline::Pipeline;
