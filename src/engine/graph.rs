use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::{NodeType, Pipeline, PipelineEdge, PipelineNode};
use crate::rows::RowSet;

/// Rows handed to a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeInput {
    /// No incoming edge (data sources).
    Empty,
    Single(RowSet),
    /// One row set per input slot, ordered by target handle.
    Slots(Vec<RowSet>),
}

impl NodeInput {
    /// Rows of a single-input node.
    pub fn into_rows(self) -> RowSet {
        match self {
            NodeInput::Empty => Vec::new(),
            NodeInput::Single(rows) => rows,
            NodeInput::Slots(mut slots) => {
                if slots.is_empty() {
                    Vec::new()
                } else {
                    slots.swap_remove(0)
                }
            }
        }
    }

    /// Positional arguments for multi-input nodes.
    pub fn into_slots(self) -> Vec<RowSet> {
        match self {
            NodeInput::Empty => Vec::new(),
            NodeInput::Single(rows) => vec![rows],
            NodeInput::Slots(slots) => slots,
        }
    }
}

/// Adjacency view of a pipeline used to schedule execution.
pub struct ExecutionGraph<'a> {
    pipeline: &'a Pipeline,
    position: HashMap<&'a str, usize>,
    outgoing: HashMap<&'a str, Vec<&'a str>>,
    incoming: HashMap<&'a str, Vec<&'a PipelineEdge>>,
}

impl<'a> ExecutionGraph<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        let position = pipeline
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id.as_str(), index))
            .collect();

        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut incoming: HashMap<&str, Vec<&PipelineEdge>> = HashMap::new();
        for edge in &pipeline.edges {
            outgoing
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
            incoming.entry(edge.target.as_str()).or_default().push(edge);
        }

        Self {
            pipeline,
            position,
            outgoing,
            incoming,
        }
    }

    fn successors(&self, node_id: &str) -> &[&'a str] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of all nodes reachable from some data source, data sources included.
    pub fn reachable(&self) -> HashSet<&'a str> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&'a str> = self
            .pipeline
            .data_sources()
            .map(|node| node.id.as_str())
            .collect();

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            for &next in self.successors(node_id) {
                if !visited.contains(next) {
                    stack.push(next);
                }
            }
        }

        visited
    }

    /// Kahn's algorithm over the reachable subgraph. Among ready nodes the one
    /// declared first runs first.
    pub fn topological_order(
        &self,
        reachable: &HashSet<&'a str>,
    ) -> PipelineResult<Vec<&'a PipelineNode>> {
        let mut in_degree: HashMap<&str, usize> =
            reachable.iter().map(|&node_id| (node_id, 0)).collect();
        for edge in &self.pipeline.edges {
            if reachable.contains(edge.source.as_str()) {
                if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .filter_map(|(node_id, _)| self.position.get(node_id).copied())
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(index) = ready.pop_first() {
            let node = &self.pipeline.nodes[index];
            order.push(node);

            for &next in self.successors(&node.id) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some(&position) = self.position.get(next) {
                            ready.insert(position);
                        }
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            let names: Vec<&str> = self
                .pipeline
                .nodes
                .iter()
                .filter(|node| {
                    reachable.contains(node.id.as_str())
                        && !order.iter().any(|done| done.id == node.id)
                })
                .map(|node| node.label.as_str())
                .collect();
            return Err(PipelineError::CycleDetected(names.join(", ")));
        }

        Ok(order)
    }

    /// Nodes of `order` without outgoing edges, in the same order.
    pub fn leaves(&self, order: &[&'a PipelineNode]) -> Vec<&'a PipelineNode> {
        order
            .iter()
            .copied()
            .filter(|node| self.successors(&node.id).is_empty())
            .collect()
    }

    /// Incoming edges in declaration order.
    pub fn incoming(&self, node_id: &str) -> &[&'a PipelineEdge] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Incoming edges ordered by target handle, stable for equal handles.
    pub fn incoming_by_handle(&self, node_id: &str) -> Vec<&'a PipelineEdge> {
        let mut edges = self.incoming(node_id).to_vec();
        edges.sort_by(|a, b| a.handle().cmp(b.handle()));
        edges
    }

    /// Collects the rows a node consumes from its already executed sources.
    pub fn resolve_input(
        &self,
        node: &PipelineNode,
        results: &IndexMap<String, RowSet>,
    ) -> NodeInput {
        let rows_of = |edge: &PipelineEdge| results.get(&edge.source).cloned().unwrap_or_default();
        let incoming = self.incoming(&node.id);

        match (node.node_type(), incoming.len()) {
            (_, 0) => NodeInput::Empty,
            (NodeType::Join, _) => NodeInput::Slots(
                self.incoming_by_handle(&node.id)
                    .into_iter()
                    .map(rows_of)
                    .collect(),
            ),
            (NodeType::Custom, count) if count > 1 => NodeInput::Slots(
                self.incoming_by_handle(&node.id)
                    .into_iter()
                    .map(rows_of)
                    .collect(),
            ),
            _ => NodeInput::Single(rows_of(incoming[0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        CustomNodeConfig, DataSourceConfig, FilterNodeConfig, NodeConfig, PipelineEdge,
    };
    use crate::rows::rows_from_json;
    use serde_json::json;

    fn source(id: &str) -> PipelineNode {
        PipelineNode::new(
            id,
            NodeConfig::DataSource(DataSourceConfig {
                database_id: Some(id.to_string()),
            }),
        )
    }

    fn filter(id: &str) -> PipelineNode {
        PipelineNode::new(id, NodeConfig::Filter(FilterNodeConfig::default()))
    }

    fn ids<'a>(nodes: &[&'a PipelineNode]) -> Vec<&'a str> {
        nodes.iter().map(|node| node.id.as_str()).collect()
    }

    #[test]
    fn unreachable_nodes_are_excluded() {
        let pipeline = Pipeline::new(
            "p",
            "p",
            vec![source("s"), filter("a"), filter("orphan"), filter("b")],
            vec![
                PipelineEdge::new("s", "a"),
                PipelineEdge::new("orphan", "b"),
            ],
        );
        let graph = ExecutionGraph::new(&pipeline);
        let reachable = graph.reachable();
        assert_eq!(reachable, HashSet::from(["s", "a"]));

        let order = graph.topological_order(&reachable).unwrap();
        assert_eq!(ids(&order), vec!["s", "a"]);
        assert_eq!(ids(&graph.leaves(&order)), vec!["a"]);
    }

    #[test]
    fn ties_follow_declaration_order() {
        let pipeline = Pipeline::new(
            "p",
            "p",
            vec![filter("c"), source("s2"), filter("b"), source("s1")],
            vec![
                PipelineEdge::new("s1", "b"),
                PipelineEdge::new("s2", "c"),
                PipelineEdge::new("b", "c"),
            ],
        );
        let graph = ExecutionGraph::new(&pipeline);
        let order = graph.topological_order(&graph.reachable()).unwrap();
        assert_eq!(ids(&order), vec!["s2", "s1", "b", "c"]);
        assert_eq!(ids(&graph.leaves(&order)), vec!["c"]);
    }

    #[test]
    fn cycles_are_reported() {
        let pipeline = Pipeline::new(
            "p",
            "p",
            vec![source("s"), filter("a"), filter("b")],
            vec![
                PipelineEdge::new("s", "a"),
                PipelineEdge::new("a", "b"),
                PipelineEdge::new("b", "a"),
            ],
        );
        let graph = ExecutionGraph::new(&pipeline);
        let err = graph.topological_order(&graph.reachable()).unwrap_err();
        assert!(matches!(err, PipelineError::CycleDetected(ref names) if names == "a, b"));
    }

    #[test]
    fn multi_input_custom_nodes_get_slots_by_handle() {
        let pipeline = Pipeline::new(
            "p",
            "p",
            vec![
                source("x"),
                source("y"),
                PipelineNode::new("code", NodeConfig::Custom(CustomNodeConfig::default())),
                filter("f"),
            ],
            vec![
                PipelineEdge::new("x", "code").with_handle("input-1"),
                PipelineEdge::new("y", "code").with_handle("input-0"),
                PipelineEdge::new("x", "f"),
                PipelineEdge::new("y", "f"),
            ],
        );
        let mut results = IndexMap::new();
        results.insert("x".to_string(), rows_from_json(json!([{"from": "x"}])));
        results.insert("y".to_string(), rows_from_json(json!([{"from": "y"}])));

        let graph = ExecutionGraph::new(&pipeline);
        let custom = graph.resolve_input(&pipeline.nodes[2], &results);
        assert_eq!(
            custom.into_slots(),
            vec![
                rows_from_json(json!([{"from": "y"}])),
                rows_from_json(json!([{"from": "x"}])),
            ]
        );

        // other node types only see the first declared edge
        let single = graph.resolve_input(&pipeline.nodes[3], &results);
        assert_eq!(single, NodeInput::Single(rows_from_json(json!([{"from": "x"}]))));

        assert_eq!(graph.resolve_input(&pipeline.nodes[0], &results), NodeInput::Empty);
    }
}
