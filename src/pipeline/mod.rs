pub mod config;
pub mod hash;

pub use config::*;
pub use hash::structural_hash;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PipelineError, PipelineResult};

/// Handle assumed for edges that do not name one.
pub const DEFAULT_TARGET_HANDLE: &str = "input-0";

// Pipeline Node Types (matching frontend enum values)
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    DataSource,
    Filter,
    Transform,
    Aggregate,
    Join,
    Visualization,
    Custom,
    Dashboard,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::DataSource => "dataSource",
            NodeType::Filter => "filter",
            NodeType::Transform => "transform",
            NodeType::Aggregate => "aggregate",
            NodeType::Join => "join",
            NodeType::Visualization => "visualization",
            NodeType::Custom => "custom",
            NodeType::Dashboard => "dashboard",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// Pipeline Node Structure
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PipelineNodeWire", into = "PipelineNodeWire")]
pub struct PipelineNode {
    pub id: String,
    pub label: String,
    pub position: Position,
    pub config: NodeConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineNodeWire {
    id: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(default)]
    config: Value,
}

impl TryFrom<PipelineNodeWire> for PipelineNode {
    type Error = serde_json::Error;

    fn try_from(wire: PipelineNodeWire) -> Result<Self, Self::Error> {
        let config = NodeConfig::from_value(wire.node_type, wire.config)?;
        Ok(Self {
            label: wire.label.unwrap_or_else(|| wire.id.clone()),
            id: wire.id,
            position: wire.position.unwrap_or_default(),
            config,
        })
    }
}

impl From<PipelineNode> for PipelineNodeWire {
    fn from(node: PipelineNode) -> Self {
        Self {
            node_type: node.node_type(),
            config: node.config.to_value(),
            id: node.id,
            label: Some(node.label),
            position: Some(node.position),
        }
    }
}

impl PipelineNode {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            position: Position::default(),
            config,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

// Pipeline Edge Structure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl PipelineEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            target_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// Input slot on the target, `input-0` when unspecified.
    pub fn handle(&self) -> &str {
        self.target_handle
            .as_deref()
            .filter(|handle| !handle.is_empty())
            .unwrap_or(DEFAULT_TARGET_HANDLE)
    }
}

fn default_version() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub nodes: Vec<PipelineNode>,
    #[serde(default)]
    pub edges: Vec<PipelineEdge>,
}

impl Pipeline {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<PipelineNode>,
        edges: Vec<PipelineEdge>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: 1,
            nodes,
            edges,
        }
    }

    pub fn from_json(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn node(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes
            .iter()
            .filter(|node| node.node_type() == NodeType::DataSource)
    }

    /// True when a data source node of this pipeline reads the given table.
    pub fn references_database(&self, database_id: &str) -> bool {
        self.data_sources()
            .any(|node| node.config.database_id() == Some(database_id))
    }

    pub fn structural_hash(&self) -> String {
        structural_hash(self)
    }

    /// Checks that node ids are unique and that edges only reference known nodes.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(PipelineError::invalid_config(
                    &node.label,
                    format!("duplicate node id '{}'", node.id),
                ));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(PipelineError::invalid_config(
                        &self.id,
                        format!(
                            "edge {} -> {} references unknown node '{}'",
                            edge.source, edge.target, endpoint
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}
