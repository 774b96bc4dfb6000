//! Custom code nodes
//!
//! A custom node carries source text defining a `process` function. The
//! engine hands the evaluator one row set per input slot, in slot order, and
//! expects an array back.

mod process;

pub use process::{ProcessEvaluator, ProcessEvaluatorConfig};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{CustomCodeError, CustomCodeResult};
use crate::rows::{rows_from_json, RowSet};

/// Runs user supplied `process` functions.
#[async_trait]
pub trait CustomCodeEvaluator: Send + Sync {
    /// Calls `process(inputs[0], inputs[1], ...)` and returns its raw result.
    async fn evaluate(&self, code: &str, inputs: Vec<RowSet>) -> CustomCodeResult<Value>;
}

/// Converts the value returned by `process` into rows. Anything other than
/// an array is rejected; array items that are not objects are skipped.
pub fn rows_from_output(value: Value) -> CustomCodeResult<RowSet> {
    match value {
        Value::Array(_) => Ok(rows_from_json(value)),
        other => Err(CustomCodeError::NonArrayResult(describe(&other).to_string())),
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
