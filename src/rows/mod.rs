//! Row transform library
//!
//! Pure functions over in-memory row sets: filtering, per-row transforms,
//! grouped aggregation and equi-joins. Rows are untyped JSON records.

pub mod aggregate;
pub mod columns;
pub mod expression;
pub mod filter;
pub mod join;
pub mod transform;
pub mod value;

pub use aggregate::{aggregate_rows, AggregateFunction, Aggregation};
pub use columns::{infer_columns, ColumnMetadata, ColumnType};
pub use filter::{filter_rows, FilterCondition, FilterOperator};
pub use join::{join_rows, JoinCondition, JoinType};
pub use transform::{transform_rows, CastType, TransformError, TransformOperation};

use serde_json::{Map, Value};

/// One record: field name to scalar.
pub type Row = Map<String, Value>;

/// Rows flowing along one pipeline edge.
pub type RowSet = Vec<Row>;

/// Builds a row set from a JSON array, skipping entries that are not objects.
pub fn rows_from_json(value: Value) -> RowSet {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
