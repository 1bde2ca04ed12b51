//! Genome model and validation.

pub mod brain;
pub mod morphology;
pub mod validate;

pub use brain::{ActuatorTarget, Brain, NeuralConnection, NeuralNode, NodeType};
pub use morphology::{BlockNode, FaceOffset, JointParams, JointType, Morphology};
pub use validate::{validate, ValidationReport};

use serde::{Deserialize, Serialize};

use crate::error::GenomeError;

/// Schema version this crate understands. `validate` rejects any other.
pub const GENOME_SCHEMA_VERSION: u32 = 1;

/// The entire heritable material of one individual. Immutable during
/// simulation; mutation always produces a new `Genome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub morphology: Morphology,
    pub brain: Brain,
    pub joint_params: Option<JointParams>,
    pub version: u32,
}

impl Genome {
    /// Non-mutating: returns a new genome with `node` appended, or
    /// `GenomeError::DuplicateId` if `node.id` collides with an existing
    /// brain node.
    pub fn add_node(&self, node: NeuralNode) -> Result<Genome, GenomeError> {
        if self.brain.find_node(&node.id).is_some() {
            return Err(GenomeError::DuplicateId(node.id));
        }
        let mut next = self.clone();
        next.brain.nodes.push(node);
        Ok(next)
    }

    /// Inverse of [`Genome::add_node`], needed to check the round-trip law
    /// `add_node(g, n); remove_node(n.id) == g`.
    pub fn remove_node(&self, id: &str) -> Genome {
        let mut next = self.clone();
        next.brain.nodes.retain(|n| n.id != id);
        next
    }

    /// Non-mutating: returns a new genome with `connection` appended, or
    /// `GenomeError::DuplicateId` if `connection.id` collides.
    pub fn add_connection(&self, connection: NeuralConnection) -> Result<Genome, GenomeError> {
        if self.brain.connections.iter().any(|c| c.id == connection.id) {
            return Err(GenomeError::DuplicateId(connection.id));
        }
        let mut next = self.clone();
        next.brain.connections.push(connection);
        Ok(next)
    }

    pub fn remove_connection(&self, id: &str) -> Genome {
        let mut next = self.clone();
        next.brain.connections.retain(|c| c.id != id);
        next
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Genome, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A population member: stable `id`, immutable `genome`, and the metrics /
/// fitness recorded by the most recent evaluation window (absent before
/// first evaluation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub id: String,
    pub genome: Genome,
    pub metrics: Option<crate::fitness::Metrics>,
    pub fitness: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vecmath::Vec3;

    fn minimal_genome() -> Genome {
        Genome {
            morphology: Morphology {
                nodes: vec![BlockNode {
                    id: 0,
                    parent_id: None,
                    size: Vec3::new(1.0, 1.0, 1.0),
                    attach_face: 0,
                    rotation: None,
                    parent_offset: None,
                    child_offset: None,
                    joint_type: JointType::Revolute,
                    joint_params: None,
                }],
            },
            brain: Brain { nodes: vec![], connections: vec![] },
            joint_params: None,
            version: GENOME_SCHEMA_VERSION,
        }
    }

    #[test]
    fn round_trip_through_json() {
        let g = minimal_genome();
        let s = g.to_json().unwrap();
        let g2 = Genome::from_json(&s).unwrap();
        assert_eq!(g, g2);
    }

    #[test]
    fn add_node_then_remove_is_identity() {
        let g = minimal_genome();
        let node = NeuralNode {
            id: "s1".into(),
            node_type: NodeType::Sensor,
            activation: None,
            x: 0.0,
            y: 0.0,
            target: None,
        };
        let with_node = g.add_node(node).unwrap();
        let back = with_node.remove_node("s1");
        assert_eq!(back, g);
    }

    #[test]
    fn add_node_duplicate_id_fails() {
        let g = minimal_genome();
        let node = NeuralNode {
            id: "s1".into(),
            node_type: NodeType::Sensor,
            activation: None,
            x: 0.0,
            y: 0.0,
            target: None,
        };
        let once = g.add_node(node.clone()).unwrap();
        let twice = once.add_node(node);
        assert_eq!(twice.unwrap_err(), GenomeError::DuplicateId("s1".into()));
    }
}
