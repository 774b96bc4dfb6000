use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transform::parse_date;
use super::Row;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    Null,
    Mixed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: ColumnType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

fn classify(value: &Value) -> ColumnType {
    match value {
        Value::Null => ColumnType::Null,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(_) => ColumnType::Number,
        Value::String(s) if s.len() >= 10 && parse_date(value).is_some() => ColumnType::Date,
        _ => ColumnType::String,
    }
}

/// Infers the columns present in a row set, in first-seen order. Nulls do not
/// influence a column's type unless the column is null everywhere.
pub fn infer_columns(rows: &[Row]) -> Vec<ColumnMetadata> {
    let mut columns: IndexMap<String, ColumnType> = IndexMap::new();

    for row in rows {
        for (name, value) in row {
            let observed = classify(value);
            columns
                .entry(name.clone())
                .and_modify(|current| {
                    *current = match (*current, observed) {
                        (current, ColumnType::Null) => current,
                        (ColumnType::Null, observed) => observed,
                        (current, observed) if current == observed => current,
                        _ => ColumnType::Mixed,
                    }
                })
                .or_insert(observed);
        }
    }

    columns
        .into_iter()
        .map(|(name, data_type)| ColumnMetadata { name, data_type })
        .collect()
}
