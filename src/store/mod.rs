//! Collaborators consumed by the engine and services: paginated row storage
//! and pipeline definition persistence.

pub mod pipeline_store;
pub mod row_store;

pub use pipeline_store::{InMemoryPipelineStore, PipelineStore};
pub use row_store::{DirRowStore, InMemoryRowStore, RowPage, RowStore};
