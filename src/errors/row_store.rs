//! Row store error types

use thiserror::Error;

/// Failures reported by a `RowStore` implementation
#[derive(Error, Debug)]
pub enum RowStoreError {
    /// The referenced table does not exist
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// Underlying file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table contents are not valid JSON rows
    #[error("Invalid JSON table: {0}")]
    Json(#[from] serde_json::Error),

    /// Table contents are not valid CSV
    #[error("Invalid CSV table: {0}")]
    Csv(#[from] csv::Error),

    /// Any other backend failure
    #[error("Row store backend error: {0}")]
    Backend(String),
}

impl RowStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RowStoreError::TableNotFound(_))
    }
}
