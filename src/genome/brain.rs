//! Brain (controller) genome data model.
//!
//! The dynamic-dispatch-by-string-`type` pattern the original system used
//! is replaced here with a tagged `NodeType` enum: the evaluator in
//! [`crate::evaluator`] switches on it exhaustively instead of dispatching
//! through a type string.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Sensor,
    Oscillator,
    Hidden,
    Actuator,
}

/// Where an ACTUATOR node's output is delivered: the joint connecting
/// `joint_ref` to its parent, on the given (informative-only) channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorTarget {
    pub joint_ref: i64,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNode {
    pub id: String,
    pub node_type: NodeType,
    pub activation: Option<f64>,
    pub x: f64,
    pub y: f64,
    pub target: Option<ActuatorTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralConnection {
    pub id: String,
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// The full controller graph, plus a precomputed reverse-adjacency index
/// (built in a preprocessing pass keyed by target node id) so the per-tick
/// evaluator never has to scan all connections to find a node's incoming
/// edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brain {
    pub nodes: Vec<NeuralNode>,
    pub connections: Vec<NeuralConnection>,
}

impl Brain {
    pub fn find_node(&self, id: &str) -> Option<&NeuralNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Build the `target id -> indices into self.connections` index used by
    /// the evaluator. Recomputed whenever a genome's brain changes (it is
    /// cheap relative to a single simulation window), never mutated in
    /// place by the evaluator itself. Owned rather than borrowed so the
    /// scheduler can cache one of these per creature alongside its genome
    /// without a self-referential struct.
    pub fn connections_by_target(&self) -> std::collections::HashMap<String, Vec<usize>> {
        let mut map: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
        for (idx, conn) in self.connections.iter().enumerate() {
            map.entry(conn.target.clone()).or_default().push(idx);
        }
        map
    }

    /// The actuator node (if any) whose target joint is `block_id`.
    pub fn actuator_for_block(&self, block_id: i64) -> Option<&NeuralNode> {
        self.nodes.iter().find(|n| {
            n.node_type == NodeType::Actuator
                && n.target.as_ref().map(|t| t.joint_ref) == Some(block_id)
        })
    }
}
