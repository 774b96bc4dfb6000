use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::rows::{Aggregation, FilterCondition, JoinCondition, JoinType, TransformOperation};

use super::NodeType;

// Data Source Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(
        rename = "databaseId",
        alias = "tableRef",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub database_id: Option<String>,
}

// Filter Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterNodeConfig {
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

// Transform Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformNodeConfig {
    #[serde(default)]
    pub operations: Vec<TransformOperation>,
}

// Aggregate Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateNodeConfig {
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

// Join Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNodeConfig {
    #[serde(default)]
    pub join_type: JoinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<JoinCondition>,
}

// Visualization Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

// Custom Code Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomNodeConfig {
    #[serde(default)]
    pub code: String,
}

// Dashboard Node Configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardNodeConfig {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub dashboard_id: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Configuration of a node, one variant per node type.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeConfig {
    DataSource(DataSourceConfig),
    Filter(FilterNodeConfig),
    Transform(TransformNodeConfig),
    Aggregate(AggregateNodeConfig),
    Join(JoinNodeConfig),
    Visualization(VisualizationNodeConfig),
    Custom(CustomNodeConfig),
    Dashboard(DashboardNodeConfig),
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::DataSource(_) => NodeType::DataSource,
            NodeConfig::Filter(_) => NodeType::Filter,
            NodeConfig::Transform(_) => NodeType::Transform,
            NodeConfig::Aggregate(_) => NodeType::Aggregate,
            NodeConfig::Join(_) => NodeType::Join,
            NodeConfig::Visualization(_) => NodeType::Visualization,
            NodeConfig::Custom(_) => NodeType::Custom,
            NodeConfig::Dashboard(_) => NodeType::Dashboard,
        }
    }

    /// Parses the config of a node of the given type. `null` selects the
    /// type's default configuration.
    pub fn from_value(node_type: NodeType, value: Value) -> serde_json::Result<Self> {
        let value = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        Ok(match node_type {
            NodeType::DataSource => NodeConfig::DataSource(serde_json::from_value(value)?),
            NodeType::Filter => NodeConfig::Filter(serde_json::from_value(value)?),
            NodeType::Transform => NodeConfig::Transform(serde_json::from_value(value)?),
            NodeType::Aggregate => NodeConfig::Aggregate(serde_json::from_value(value)?),
            NodeType::Join => NodeConfig::Join(serde_json::from_value(value)?),
            NodeType::Visualization => NodeConfig::Visualization(serde_json::from_value(value)?),
            NodeType::Custom => NodeConfig::Custom(serde_json::from_value(value)?),
            NodeType::Dashboard => NodeConfig::Dashboard(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> Value {
        let serialized = match self {
            NodeConfig::DataSource(config) => serde_json::to_value(config),
            NodeConfig::Filter(config) => serde_json::to_value(config),
            NodeConfig::Transform(config) => serde_json::to_value(config),
            NodeConfig::Aggregate(config) => serde_json::to_value(config),
            NodeConfig::Join(config) => serde_json::to_value(config),
            NodeConfig::Visualization(config) => serde_json::to_value(config),
            NodeConfig::Custom(config) => serde_json::to_value(config),
            NodeConfig::Dashboard(config) => serde_json::to_value(config),
        };
        // Plain data structs with string keys always serialize.
        serialized.unwrap_or(Value::Null)
    }

    /// Table referenced by a data source node.
    pub fn database_id(&self) -> Option<&str> {
        match self {
            NodeConfig::DataSource(config) => config
                .database_id
                .as_deref()
                .filter(|id| !id.trim().is_empty()),
            _ => None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
