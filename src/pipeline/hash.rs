//! Structural hashing of pipelines.
//!
//! The hash covers node ids, types and configs plus edge endpoints and target
//! handles. Labels and positions are cosmetic and deliberately left out, so
//! moving a node around in an editor keeps cached results valid.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::Pipeline;

pub fn structural_hash(pipeline: &Pipeline) -> String {
    // Execution depends on declaration order, so nodes and edges stay unsorted.
    let nodes: Vec<Value> = pipeline
        .nodes
        .iter()
        .map(|node| {
            json!({
                "id": node.id,
                "type": node.node_type().as_str(),
                "config": node.config.to_value(),
            })
        })
        .collect();

    let edges: Vec<Value> = pipeline
        .edges
        .iter()
        .map(|edge| {
            json!({
                "source": edge.source,
                "target": edge.target,
                "targetHandle": edge.handle(),
            })
        })
        .collect();

    let normalized = json!({ "nodes": nodes, "edges": edges });

    let mut canonical = String::new();
    write_canonical(&normalized, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serializes with object keys sorted at every level, independent of the
/// map implementation backing `serde_json::Map`.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
