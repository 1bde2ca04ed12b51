//! Genome validation: collects every violation of the genome invariants
//! into a human-readable report rather than failing on the first one.

use std::collections::HashSet;

use super::{Genome, NodeType, GENOME_SCHEMA_VERSION};
use crate::error::GenomeError;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<GenomeError>,
}

impl ValidationReport {
    fn ok() -> Self {
        ValidationReport { valid: true, errors: Vec::new() }
    }

    fn from_errors(errors: Vec<GenomeError>) -> Self {
        ValidationReport { valid: errors.is_empty(), errors }
    }
}

pub fn validate(genome: &Genome) -> ValidationReport {
    let mut errors = Vec::new();

    if genome.version != GENOME_SCHEMA_VERSION {
        errors.push(GenomeError::UnsupportedVersion(genome.version));
        // A version mismatch makes every other check unreliable; report it
        // alone rather than cascading confusing shape errors.
        return ValidationReport::from_errors(errors);
    }

    validate_morphology(genome, &mut errors);
    validate_brain(genome, &mut errors);

    if errors.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport::from_errors(errors)
    }
}

fn validate_morphology(genome: &Genome, errors: &mut Vec<GenomeError>) {
    let nodes = &genome.morphology.nodes;

    let mut seen_ids = HashSet::new();
    for node in nodes {
        if !seen_ids.insert(node.id) {
            errors.push(GenomeError::DuplicateId(node.id.to_string()));
        }
    }

    let roots: Vec<_> = nodes.iter().filter(|n| n.is_root()).collect();
    match roots.len() {
        0 => errors.push(GenomeError::NoRoot),
        1 => {}
        _ => errors.push(GenomeError::MultipleRoots),
    }

    let mut seen_so_far: HashSet<i64> = HashSet::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id {
            if !seen_so_far.contains(&parent_id) {
                errors.push(GenomeError::ForwardOrCyclicReference {
                    child: node.id,
                    parent: parent_id,
                });
            }
            if node.attach_face > 5 {
                errors.push(GenomeError::AttachFaceOutOfRange {
                    block: node.id,
                    face: node.attach_face,
                });
            }
        }

        if node.size.x <= 0.0 || node.size.y <= 0.0 || node.size.z <= 0.0 {
            errors.push(GenomeError::NonPositiveSize(node.id));
        }
        if !node.size.is_finite() {
            errors.push(GenomeError::NonFiniteField { node: node.id.to_string(), field: "size" });
        }
        if let Some(rotation) = node.rotation {
            if !rotation.is_finite() {
                errors.push(GenomeError::NonFiniteField {
                    node: node.id.to_string(),
                    field: "rotation",
                });
            }
        }

        seen_so_far.insert(node.id);
    }
}

fn validate_brain(genome: &Genome, errors: &mut Vec<GenomeError>) {
    let brain = &genome.brain;

    let mut seen_ids = HashSet::new();
    for node in &brain.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            errors.push(GenomeError::DuplicateId(node.id.clone()));
        }
        if let Some(activation) = node.activation {
            if !activation.is_finite() {
                errors.push(GenomeError::NonFiniteField {
                    node: node.id.clone(),
                    field: "activation",
                });
            }
        }
    }

    let mut seen_edges = HashSet::new();
    for conn in &brain.connections {
        let source_known = brain.find_node(&conn.source).is_some();
        let target_node = brain.find_node(&conn.target);

        if !source_known {
            errors.push(GenomeError::UnknownConnectionEndpoint {
                connection: conn.id.clone(),
                node: conn.source.clone(),
            });
        }
        match target_node {
            None => errors.push(GenomeError::UnknownConnectionEndpoint {
                connection: conn.id.clone(),
                node: conn.target.clone(),
            }),
            Some(target) if target.node_type == NodeType::Sensor => {
                errors.push(GenomeError::SensorAsTarget(conn.id.clone()));
            }
            Some(_) => {}
        }

        if !conn.weight.is_finite() {
            errors.push(GenomeError::NonFiniteField {
                node: conn.id.clone(),
                field: "weight",
            });
        }

        let edge_key = (conn.source.clone(), conn.target.clone());
        if !seen_edges.insert(edge_key) {
            errors.push(GenomeError::DuplicateEdge {
                source: conn.source.clone(),
                target: conn.target.clone(),
            });
        }
    }
}
