use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::{as_number, number_value, render};
use super::{Row, RowSet};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateFunction {
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Min,
    Max,
    Count,
    #[serde(alias = "distinctCount", alias = "count_distinct", alias = "distinct")]
    CountDistinct,
}

impl AggregateFunction {
    fn name(self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Count => "count",
            AggregateFunction::CountDistinct => "countDistinct",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub field: Option<String>,
    pub function: AggregateFunction,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(field: impl Into<String>, function: AggregateFunction) -> Self {
        Self {
            field: Some(field.into()),
            function,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output column name: the alias, or `<function>_<field>`.
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.field {
            Some(field) => format!("{}_{}", self.function.name(), field),
            None => self.function.name().to_string(),
        }
    }

    fn compute(&self, rows: &[&Row]) -> Value {
        let values = || {
            rows.iter().map(|row| match &self.field {
                Some(field) => row.get(field).unwrap_or(&Value::Null),
                None => &Value::Null,
            })
        };
        let numbers = || values().filter_map(as_number);

        match self.function {
            AggregateFunction::Count => Value::from(rows.len()),
            AggregateFunction::CountDistinct => {
                let distinct: HashSet<String> = values()
                    .filter(|value| !value.is_null())
                    .map(render)
                    .collect();
                Value::from(distinct.len())
            }
            AggregateFunction::Sum => number_value(numbers().sum()),
            AggregateFunction::Avg => {
                let (total, count) = numbers().fold((0.0, 0usize), |(t, c), n| (t + n, c + 1));
                if count == 0 {
                    Value::from(0)
                } else {
                    number_value(total / count as f64)
                }
            }
            AggregateFunction::Min => numbers()
                .reduce(f64::min)
                .map(number_value)
                .unwrap_or(Value::Null),
            AggregateFunction::Max => numbers()
                .reduce(f64::max)
                .map(number_value)
                .unwrap_or(Value::Null),
        }
    }
}

/// Groups rows by the composite key of `group_by` values and computes the
/// aggregations per group. Without `group_by` the whole input is one group,
/// so even an empty input yields a single row.
pub fn aggregate_rows(rows: &[Row], group_by: &[String], aggregations: &[Aggregation]) -> RowSet {
    let mut groups: IndexMap<String, Vec<&Row>> = IndexMap::new();

    if group_by.is_empty() {
        groups.insert(String::new(), rows.iter().collect());
    } else {
        for row in rows {
            let key = group_by
                .iter()
                .map(|field| render(row.get(field).unwrap_or(&Value::Null)))
                .collect::<Vec<_>>()
                .join("|");
            groups.entry(key).or_default().push(row);
        }
    }

    groups
        .values()
        .map(|members| {
            let mut output = Row::new();
            if let Some(first) = members.first() {
                for field in group_by {
                    output.insert(
                        field.clone(),
                        first.get(field).cloned().unwrap_or(Value::Null),
                    );
                }
            }
            for aggregation in aggregations {
                output.insert(aggregation.output_name(), aggregation.compute(members));
            }
            output
        })
        .collect()
}
