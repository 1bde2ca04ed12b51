//! Brain evaluator: one synchronous tick of the controller graph.

use std::collections::HashMap;

use crate::genome::{Brain, NodeType};

/// Inputs the evaluator reads from the physics world for one creature, kept
/// separate from rapier types so this module stays engine-agnostic and
/// trivially testable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorInputs {
    pub root_y: f64,
    pub first_joint_angular_velocity: Option<(f64, f64, f64)>,
    pub root_linvel_x: f64,
}

/// `newActivation[n]` for every node, keyed by node id. Built fresh each
/// tick from the previous tick's map; never mutated in place mid-pass so
/// that "synchronous update" (read-only-previous) holds by construction.
pub type Activations = HashMap<String, f64>;

/// Runs one tick of `brain`, producing the next activation map from
/// `previous` (an empty map is a valid "first tick").
pub fn tick(
    brain: &Brain,
    previous: &Activations,
    connections_by_target: &HashMap<String, Vec<usize>>,
    sensors: &SensorInputs,
    sim_time: f64,
) -> Activations {
    let mut next = Activations::with_capacity(brain.nodes.len());

    for node in &brain.nodes {
        let value = match node.node_type {
            NodeType::Sensor => sensor_value(&node.id, sensors),
            NodeType::Oscillator => (2.0 * sim_time + node.y * 10.0).sin(),
            NodeType::Hidden | NodeType::Actuator => {
                let sum: f64 = connections_by_target
                    .get(node.id.as_str())
                    .map(|indices| {
                        indices
                            .iter()
                            .map(|&idx| {
                                let conn = &brain.connections[idx];
                                previous.get(&conn.source).copied().unwrap_or(0.0) * conn.weight
                            })
                            .sum()
                    })
                    .unwrap_or(0.0);
                sum.tanh()
            }
        };
        next.insert(node.id.clone(), value);
    }

    next
}

fn sensor_value(id: &str, sensors: &SensorInputs) -> f64 {
    match id {
        "s1" => {
            if sensors.root_y < 0.55 {
                1.0
            } else {
                -1.0
            }
        }
        "s2" => match sensors.first_joint_angular_velocity {
            Some((wx, wy, wz)) => ((wx.abs() + wy.abs() + wz.abs()) / 6.0).tanh(),
            None => 0.0,
        },
        "s3" => (sensors.root_linvel_x / 5.0).tanh(),
        _ => 0.0,
    }
}

/// Joint motor target for the joint connecting `block_id` to its parent:
/// the matching actuator's activation scaled by its block's joint
/// amplitude, or a fallback sinusoid if no actuator targets this block.
pub fn actuator_target(
    brain: &Brain,
    block_id: i64,
    activations: &Activations,
    amp: f64,
    speed: f64,
    phase: f64,
    sim_time: f64,
) -> f64 {
    match brain.actuator_for_block(block_id) {
        Some(actuator) => activations.get(&actuator.id).copied().unwrap_or(0.0) * amp,
        None => (sim_time * speed + phase).sin() * amp,
    }
}
