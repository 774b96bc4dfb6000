use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::render;
use super::{Row, RowSet};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    #[serde(alias = "outer", alias = "fullOuter")]
    Full,
}

impl JoinType {
    fn keeps_unmatched_left(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    fn keeps_unmatched_right(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

/// Equality predicate between a field of the left and the right input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCondition {
    #[serde(default)]
    pub left_field: String,
    #[serde(default)]
    pub right_field: String,
}

impl JoinCondition {
    pub fn new(left_field: impl Into<String>, right_field: impl Into<String>) -> Self {
        Self {
            left_field: left_field.into(),
            right_field: right_field.into(),
        }
    }

    /// Both sides name a key field.
    pub fn is_complete(&self) -> bool {
        !self.left_field.trim().is_empty() && !self.right_field.trim().is_empty()
    }
}

fn key_of(row: &Row, field: &str) -> Option<String> {
    match row.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => Some(render(value)),
    }
}

fn merge(left: &Row, right: &Row, condition: &JoinCondition) -> Row {
    let mut merged = left.clone();
    for (name, value) in right {
        if merged.contains_key(name) {
            let shared_key =
                name == &condition.left_field && name == &condition.right_field;
            if !shared_key {
                merged.insert(format!("{}_right", name), value.clone());
            }
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Equi-join of two row sets. Left rows drive the output order; unmatched
/// right rows of right/full joins are appended at the end.
pub fn join_rows(
    left: &[Row],
    right: &[Row],
    join_type: JoinType,
    condition: &JoinCondition,
) -> RowSet {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, row) in right.iter().enumerate() {
        if let Some(key) = key_of(row, &condition.right_field) {
            index.entry(key).or_default().push(position);
        }
    }

    let mut right_matched = vec![false; right.len()];
    let mut output = Vec::new();

    for left_row in left {
        let matches = key_of(left_row, &condition.left_field)
            .and_then(|key| index.get(&key))
            .filter(|positions| !positions.is_empty());

        match matches {
            Some(positions) => {
                for &position in positions {
                    right_matched[position] = true;
                    output.push(merge(left_row, &right[position], condition));
                }
            }
            None if join_type.keeps_unmatched_left() => output.push(left_row.clone()),
            None => {}
        }
    }

    if join_type.keeps_unmatched_right() {
        output.extend(
            right
                .iter()
                .zip(&right_matched)
                .filter(|(_, matched)| !**matched)
                .map(|(row, _)| row.clone()),
        );
    }

    output
}
