//! Executable-graph payload types
//!
//! A workflow arrives from the registry as a graph: blocks keyed by id,
//! a sequence of edges, and loop constructs keyed by id. The runtime treats
//! block configuration as opaque payload and performs no validation beyond
//! what a traversal itself encounters.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A single unit of work in a workflow
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BlockDefinition {
    pub id: String,
    /// Block type tag, interpreted by the block runtimes
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Opaque block configuration, passed through untouched
    #[serde(default)]
    pub config: serde_json::Value,
}

fn enabled_default() -> bool {
    true
}

/// A connection between two blocks
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

/// A loop construct grouping a set of blocks
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoopDefinition {
    pub id: String,
    /// Blocks contained in the loop body
    pub nodes: Vec<String>,
    pub iterations: u32,
}

/// The executable graph of one workflow
#[derive(TS, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    #[serde(default)]
    pub blocks: HashMap<String, BlockDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub loops: HashMap<String, LoopDefinition>,
}

impl WorkflowGraph {
    /// Derive a linear scheduling order by following edges from the entry
    /// block.
    ///
    /// The entry is a block no edge targets (lowest id wins if there are
    /// several). Disabled blocks are skipped but still traversed. The walk
    /// stops at the first unknown id or revisited block, so a cycle yields a
    /// finite order rather than hanging.
    pub fn serial_order(&self) -> Vec<String> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        let mut entries: Vec<&String> = self
            .blocks
            .keys()
            .filter(|id| !targets.contains(id.as_str()))
            .collect();
        entries.sort();

        let Some(entry) = entries.first() else {
            return Vec::new();
        };

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut current = entry.as_str();

        loop {
            let Some(block) = self.blocks.get(current) else {
                break;
            };
            if !visited.insert(current.to_string()) {
                break;
            }
            if block.enabled {
                order.push(current.to_string());
            }
            match self.edges.iter().find(|e| e.source == current) {
                Some(edge) => current = edge.target.as_str(),
                None => break,
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn block(id: &str, enabled: bool) -> BlockDefinition {
        BlockDefinition {
            id: id.to_string(),
            kind: "agent".to_string(),
            name: id.to_string(),
            enabled,
            config: serde_json::Value::Null,
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
            target_handle: None,
        }
    }

    fn linear_graph() -> WorkflowGraph {
        WorkflowGraph {
            blocks: [
                ("b1".to_string(), block("b1", true)),
                ("b2".to_string(), block("b2", true)),
                ("b3".to_string(), block("b3", true)),
            ]
            .into_iter()
            .collect(),
            edges: vec![edge("b1", "b2"), edge("b2", "b3")],
            loops: HashMap::new(),
        }
    }

    #[test]
    fn test_serial_order_linear() {
        let graph = linear_graph();
        assert_eq!(
            graph.serial_order(),
            vec!["b1".to_string(), "b2".to_string(), "b3".to_string()]
        );
    }

    #[test]
    fn test_serial_order_empty_graph() {
        let graph = WorkflowGraph::default();
        assert!(graph.serial_order().is_empty());
    }

    #[test]
    fn test_serial_order_skips_disabled() {
        let mut graph = linear_graph();
        graph
            .blocks
            .get_mut("b2")
            .map(|b| b.enabled = false)
            .expect("b2 exists");

        assert_eq!(
            graph.serial_order(),
            vec!["b1".to_string(), "b3".to_string()]
        );
    }

    #[test]
    fn test_serial_order_stops_at_unknown_target() {
        let mut graph = linear_graph();
        graph.edges.push(edge("b3", "missing"));

        assert_eq!(
            graph.serial_order(),
            vec!["b1".to_string(), "b2".to_string(), "b3".to_string()]
        );
    }

    #[test]
    fn test_serial_order_terminates_on_cycle() {
        let mut graph = linear_graph();
        graph.edges.push(edge("b3", "b3"));

        assert_eq!(
            graph.serial_order(),
            vec!["b1".to_string(), "b2".to_string(), "b3".to_string()]
        );
    }

    #[test]
    fn test_graph_deserializes_with_defaults() {
        let graph: WorkflowGraph = serde_json::from_str(r#"{}"#).expect("empty graph");
        assert!(graph.blocks.is_empty());
        assert!(graph.edges.is_empty());
        assert!(graph.loops.is_empty());

        let graph: WorkflowGraph = serde_json::from_str(
            r#"{
                "blocks": {
                    "b1": { "id": "b1", "type": "starter", "name": "Start" }
                },
                "edges": [{ "source": "b1", "target": "b2" }]
            }"#,
        )
        .expect("partial graph");
        assert!(graph.blocks["b1"].enabled);
        assert_eq!(graph.edges[0].target, "b2");
    }
}
