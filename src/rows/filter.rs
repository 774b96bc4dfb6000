use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::{compare, loosely_equal, render};
use super::{Row, RowSet};

/// Comparison applied by a single filter condition.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    #[serde(alias = "eq", alias = "=", alias = "==")]
    Equals,
    #[serde(alias = "ne", alias = "!=")]
    NotEquals,
    #[serde(alias = "gt", alias = ">")]
    GreaterThan,
    #[serde(alias = "gte", alias = ">=")]
    GreaterThanOrEqual,
    #[serde(alias = "lt", alias = "<")]
    LessThan,
    #[serde(alias = "lte", alias = "<=")]
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let field_value = row.get(&self.field).unwrap_or(&Value::Null);
        match self.operator {
            FilterOperator::Equals => loosely_equal(field_value, &self.value),
            FilterOperator::NotEquals => !loosely_equal(field_value, &self.value),
            FilterOperator::GreaterThan => compare(field_value, &self.value).is_some_and(|o| o.is_gt()),
            FilterOperator::GreaterThanOrEqual => {
                compare(field_value, &self.value).is_some_and(|o| o.is_ge())
            }
            FilterOperator::LessThan => compare(field_value, &self.value).is_some_and(|o| o.is_lt()),
            FilterOperator::LessThanOrEqual => {
                compare(field_value, &self.value).is_some_and(|o| o.is_le())
            }
            FilterOperator::Contains => {
                !field_value.is_null() && render(field_value).contains(&render(&self.value))
            }
            FilterOperator::StartsWith => {
                !field_value.is_null() && render(field_value).starts_with(&render(&self.value))
            }
            FilterOperator::EndsWith => {
                !field_value.is_null() && render(field_value).ends_with(&render(&self.value))
            }
        }
    }
}

/// Keeps the rows satisfying every condition. No conditions keeps everything.
pub fn filter_rows(rows: &[Row], conditions: &[FilterCondition]) -> RowSet {
    rows.iter()
        .filter(|row| conditions.iter().all(|condition| condition.matches(row)))
        .cloned()
        .collect()
}
