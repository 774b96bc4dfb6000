//! Domain-specific error types for rowdag
//!
//! # Error Categories
//!
//! - **PipelineError**: pipeline validation and execution errors
//! - **RowStoreError**: failures of the row store collaborator
//! - **CustomCodeError**: failures of the custom code evaluator
//!
//! ```rust
//! use rowdag::errors::{PipelineError, PipelineResult};
//!
//! fn require_source(count: usize) -> PipelineResult<()> {
//!     if count == 0 {
//!         return Err(PipelineError::NoDataSource);
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_source(0).is_err());
//! ```

pub mod custom_code;
pub mod pipeline;
pub mod row_store;

pub use custom_code::CustomCodeError;
pub use pipeline::PipelineError;
pub use row_store::RowStoreError;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for row store operations
pub type RowStoreResult<T> = Result<T, RowStoreError>;

/// Result type alias for custom code evaluation
pub type CustomCodeResult<T> = Result<T, CustomCodeError>;
