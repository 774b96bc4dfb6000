use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::expression::Expr;
use super::value::{as_number, number_value, render};
use super::{Row, RowSet};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CastType {
    String,
    Number,
    Boolean,
    Date,
}

/// One step of a transform node. Steps run in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransformOperation {
    Rename {
        from: String,
        to: String,
    },
    Calculate {
        field: String,
        expression: String,
    },
    Cast {
        field: String,
        to: CastType,
    },
    #[serde(rename_all = "camelCase")]
    Extract {
        field: String,
        pattern: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        group: Option<usize>,
    },
    Drop {
        fields: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Invalid extract pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Operations with their patterns compiled and expressions parsed up front.
enum PreparedOperation<'a> {
    Rename(&'a str, &'a str),
    Calculate(&'a str, Option<Expr>),
    Cast(&'a str, CastType),
    Extract {
        field: &'a str,
        regex: Regex,
        target: &'a str,
        group: Option<usize>,
    },
    Drop(&'a [String]),
}

impl TransformOperation {
    fn prepare(&self) -> Result<PreparedOperation<'_>, TransformError> {
        Ok(match self {
            TransformOperation::Rename { from, to } => PreparedOperation::Rename(from, to),
            TransformOperation::Calculate { field, expression } => {
                let parsed = match Expr::parse(expression) {
                    Ok(expr) => Some(expr),
                    Err(err) => {
                        debug!(
                            "Expression '{}' for field {} failed to parse: {}",
                            expression, field, err
                        );
                        None
                    }
                };
                PreparedOperation::Calculate(field, parsed)
            }
            TransformOperation::Cast { field, to } => PreparedOperation::Cast(field, *to),
            TransformOperation::Extract {
                field,
                pattern,
                target,
                group,
            } => PreparedOperation::Extract {
                field,
                regex: Regex::new(pattern).map_err(|source| TransformError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?,
                target: target.as_deref().unwrap_or(field.as_str()),
                group: *group,
            },
            TransformOperation::Drop { fields } => PreparedOperation::Drop(fields),
        })
    }
}

impl PreparedOperation<'_> {
    fn apply(&self, row: &mut Row) {
        match self {
            PreparedOperation::Rename(from, to) => {
                if from == to {
                    return;
                }
                if let Some(value) = row.remove(*from) {
                    row.insert(to.to_string(), value);
                }
            }
            PreparedOperation::Calculate(field, expr) => {
                let value = match expr {
                    Some(expr) => expr.evaluate(row).unwrap_or_else(|err| {
                        debug!("Calculation of field {} recovered with null: {}", field, err);
                        Value::Null
                    }),
                    None => Value::Null,
                };
                row.insert(field.to_string(), value);
            }
            PreparedOperation::Cast(field, to) => {
                let current = row.get(*field).cloned().unwrap_or(Value::Null);
                row.insert(field.to_string(), cast_value(&current, *to));
            }
            PreparedOperation::Extract {
                field,
                regex,
                target,
                group,
            } => {
                let extracted = row
                    .get(*field)
                    .filter(|value| !value.is_null())
                    .and_then(|value| extract(regex, &render(value), *group))
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                row.insert(target.to_string(), extracted);
            }
            PreparedOperation::Drop(fields) => {
                for field in fields.iter() {
                    row.remove(field);
                }
            }
        }
    }
}

fn extract(regex: &Regex, text: &str, group: Option<usize>) -> Option<String> {
    let captures = regex.captures(text)?;
    let index = group.unwrap_or(if captures.len() > 1 { 1 } else { 0 });
    captures.get(index).map(|m| m.as_str().to_string())
}

pub fn cast_value(value: &Value, to: CastType) -> Value {
    match to {
        CastType::String => match value {
            Value::Null => Value::Null,
            other => Value::String(render(other)),
        },
        CastType::Number => match value {
            Value::Bool(b) => Value::from(if *b { 1 } else { 0 }),
            other => as_number(other).map(number_value).unwrap_or(Value::Null),
        },
        CastType::Boolean => match value {
            Value::Null => Value::Bool(false),
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            Value::String(s) => Value::Bool(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes"
            )),
            Value::Array(_) | Value::Object(_) => Value::Bool(true),
        },
        CastType::Date => parse_date(value)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .unwrap_or(Value::Null),
    }
}

/// Parses the date shapes accepted by `cast` into UTC.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|millis| DateTime::from_timestamp_millis(millis as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Applies the operations in order to shallow copies of the input rows.
pub fn transform_rows(
    rows: &[Row],
    operations: &[TransformOperation],
) -> Result<RowSet, TransformError> {
    let prepared = operations
        .iter()
        .map(TransformOperation::prepare)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            for operation in &prepared {
                operation.apply(&mut row);
            }
            row
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::rows_from_json;
    use serde_json::json;

    fn ops(value: Value) -> Vec<TransformOperation> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn operations_run_in_sequence() {
        let rows = rows_from_json(json!([{"price": "10", "qty": 3, "sku": "AB-123", "tmp": 1}]));
        let operations = ops(json!([
            {"type": "cast", "field": "price", "to": "number"},
            {"type": "calculate", "field": "total", "expression": "price * qty"},
            {"type": "rename", "from": "qty", "to": "quantity"},
            {"type": "extract", "field": "sku", "pattern": "-(\\d+)", "target": "skuNumber"},
            {"type": "drop", "fields": ["tmp"]},
        ]));

        let out = transform_rows(&rows, &operations).unwrap();
        assert_eq!(
            Value::Object(out[0].clone()),
            json!({"price": 10, "quantity": 3, "sku": "AB-123", "skuNumber": "123", "total": 30})
        );
        // input is untouched
        assert_eq!(rows[0]["qty"], json!(3));
    }

    #[test]
    fn calculate_failure_yields_null() {
        let rows = rows_from_json(json!([{"a": 1, "b": 0}, {"a": 4, "b": 2}]));
        let operations = ops(json!([{"type": "calculate", "field": "ratio", "expression": "a / b"}]));
        let out = transform_rows(&rows, &operations).unwrap();
        assert_eq!(out[0]["ratio"], Value::Null);
        assert_eq!(out[1]["ratio"], json!(2));

        let broken = ops(json!([{"type": "calculate", "field": "x", "expression": "a +"}]));
        let out = transform_rows(&rows, &broken).unwrap();
        assert!(out.iter().all(|row| row["x"].is_null()));
    }

    #[test]
    fn invalid_pattern_is_fatal() {
        let rows = rows_from_json(json!([{"a": "x"}]));
        let operations = ops(json!([{"type": "extract", "field": "a", "pattern": "("}]));
        assert!(matches!(
            transform_rows(&rows, &operations),
            Err(TransformError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn casts() {
        assert_eq!(cast_value(&json!(" 42 "), CastType::Number), json!(42));
        assert_eq!(cast_value(&json!("abc"), CastType::Number), Value::Null);
        assert_eq!(cast_value(&json!(true), CastType::Number), json!(1));
        assert_eq!(cast_value(&json!(3.5), CastType::String), json!("3.5"));
        assert_eq!(cast_value(&json!("Yes"), CastType::Boolean), json!(true));
        assert_eq!(cast_value(&json!(0), CastType::Boolean), json!(false));
        assert_eq!(
            cast_value(&json!("2024-03-01"), CastType::Date),
            json!("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(
            cast_value(&json!(0), CastType::Date),
            json!("1970-01-01T00:00:00.000Z")
        );
        assert_eq!(cast_value(&json!("not a date"), CastType::Date), Value::Null);
    }

    #[test]
    fn extract_without_groups_uses_whole_match() {
        let rows = rows_from_json(json!([{"text": "order 881 shipped"}, {"text": "none"}]));
        let operations = ops(json!([{"type": "extract", "field": "text", "pattern": "\\d+"}]));
        let out = transform_rows(&rows, &operations).unwrap();
        assert_eq!(out[0]["text"], json!("881"));
        assert_eq!(out[1]["text"], Value::Null);
    }
}
