//! Simulation scheduler: fixed-step physics world owning one
//! generation's population for the duration of an evaluation window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::evaluator::{self, Activations, SensorInputs};
use crate::fitness::Metrics;
use crate::genome::{Brain, Individual, JointParams};
use crate::instantiate::{self, InstantiatedBody};
use crate::vecmath::Vec3;

pub const FIXED_DT: f64 = 1.0 / 60.0;
const DISQUALIFY_SPEED: f64 = 50.0;
const FALL_THRESHOLD_Y: f64 = -20.0;
const RESPAWN_POSITION: Vec3 = Vec3 { x: 0.0, y: 5.0, z: 0.0 };
const DISQUALIFIED_POSITION: Vec3 = Vec3 { x: 0.0, y: -100.0, z: 0.0 };
const MOTOR_STIFFNESS: f64 = 200.0;
const MOTOR_DAMPING: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Earth,
    Moon,
    Jupiter,
    Water,
}

struct SceneParams {
    gravity: Vector<f64>,
    linear_damping: f64,
    angular_damping: f64,
}

impl Scene {
    fn params(&self) -> SceneParams {
        match self {
            // Values beyond Earth/Moon gravity (fixed by the acceptance
            // scenario) are this crate's own choice, recorded in
            // DESIGN.md.
            Scene::Earth => SceneParams { gravity: vector![0.0, -9.81, 0.0], linear_damping: 0.5, angular_damping: 1.0 },
            Scene::Moon => SceneParams { gravity: vector![0.0, -1.62, 0.0], linear_damping: 0.1, angular_damping: 0.2 },
            Scene::Jupiter => SceneParams { gravity: vector![0.0, -24.79, 0.0], linear_damping: 0.5, angular_damping: 1.0 },
            Scene::Water => SceneParams { gravity: vector![0.0, -9.81, 0.0], linear_damping: 2.0, angular_damping: 2.0 },
        }
    }
}

/// Messages accepted by the scheduler.
pub enum ControlMessage {
    Init,
    SetPopulation(Vec<Individual>),
    SetConfig { scene: Option<Scene> },
    Start,
    Stop,
    UpdateSpeed(f64),
}

/// Messages emitted by the scheduler.
pub enum TelemetryMessage {
    Ready,
    Update { transforms: Vec<f32>, fitness: HashMap<String, f64>, sim_time: f64, physics_fps: f64 },
}

struct CreatureState {
    individual_id: String,
    brain: Brain,
    connections_by_target: HashMap<String, Vec<usize>>,
    joint_params: HashMap<i64, JointParams>,
    activations: Activations,
    body: Option<InstantiatedBody>,
    disqualified: bool,
    initial_x: f64,
    current_x: f64,
    frozen_x: f64,
    sum_speed: f64,
    sum_upright: f64,
    peak_height: f64,
    tick_count: u32,
    foot_contact_ticks: u32,
    runtime_alive: f64,
}

impl CreatureState {
    fn disqualify(&mut self) {
        if !self.disqualified {
            self.frozen_x = self.current_x;
            self.disqualified = true;
        }
    }

    fn metrics(&self) -> Metrics {
        let ticks = self.tick_count.max(1) as f64;
        Metrics {
            displacement: self.current_x - self.initial_x,
            mean_speed: self.sum_speed / ticks,
            mean_upright: self.sum_upright / ticks,
            peak_height: self.peak_height,
            runtime_alive: self.runtime_alive,
            foot_contact_ratio: self.foot_contact_ticks as f64 / ticks,
            disqualified: self.disqualified,
        }
    }
}

/// Owns exactly one physics world for the duration of one evaluation
/// window. No other component may retain a body handle across resets;
/// the world is freed and rebuilt fresh before every setup.
pub struct Scheduler {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    scene: Scene,
    simulation_speed: f64,
    sim_time: f64,
    running: bool,
    creatures: Vec<CreatureState>,
}

impl Scheduler {
    pub fn new(scene: Scene) -> Self {
        Scheduler {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            integration_parameters: IntegrationParameters { dt: FIXED_DT, ..Default::default() },
            physics_pipeline: PhysicsPipeline::new(),
            scene,
            simulation_speed: 1.0,
            sim_time: 0.0,
            running: false,
            creatures: Vec::new(),
        }
    }

    pub fn handle(&mut self, message: ControlMessage) -> Option<TelemetryMessage> {
        match message {
            ControlMessage::Init => Some(TelemetryMessage::Ready),
            ControlMessage::SetPopulation(population) => {
                self.setup_world(&population);
                None
            }
            ControlMessage::SetConfig { scene } => {
                if let Some(scene) = scene {
                    self.apply_scene(scene);
                }
                None
            }
            ControlMessage::Start => {
                self.running = true;
                None
            }
            ControlMessage::Stop => {
                self.running = false;
                None
            }
            ControlMessage::UpdateSpeed(speed) => {
                self.simulation_speed = speed.max(0.0);
                None
            }
        }
    }

    /// Frees the previous world and instantiates every individual fresh.
    /// An individual whose morphology fails to instantiate is disqualified
    /// immediately; the rest of the population proceeds.
    fn setup_world(&mut self, population: &[Individual]) {
        self.bodies = RigidBodySet::new();
        self.colliders = ColliderSet::new();
        self.joints = ImpulseJointSet::new();
        self.multibody_joints = MultibodyJointSet::new();
        self.islands = IslandManager::new();
        self.sim_time = 0.0;
        self.creatures.clear();

        let spacing = 4.0;
        for (index, individual) in population.iter().enumerate() {
            let spawn = Vec3::new(index as f64 * spacing, 1.0, 0.0);
            let joint_params: HashMap<i64, JointParams> = individual
                .genome
                .morphology
                .nodes
                .iter()
                .filter_map(|n| n.joint_params.map(|p| (n.id, p)))
                .collect();

            match instantiate::instantiate(
                &individual.genome,
                spawn,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.joints,
            ) {
                Ok(body) => {
                    self.creatures.push(CreatureState {
                        individual_id: individual.id.clone(),
                        brain: individual.genome.brain.clone(),
                        connections_by_target: individual.genome.brain.connections_by_target(),
                        joint_params,
                        activations: Activations::new(),
                        body: Some(body),
                        disqualified: false,
                        initial_x: spawn.x,
                        current_x: spawn.x,
                        frozen_x: spawn.x,
                        sum_speed: 0.0,
                        sum_upright: 0.0,
                        peak_height: spawn.y,
                        tick_count: 0,
                        foot_contact_ticks: 0,
                        runtime_alive: 0.0,
                    });
                }
                Err(err) => {
                    warn!(individual = %individual.id, error = %err, "instantiation failed, disqualifying");
                    self.creatures.push(CreatureState {
                        individual_id: individual.id.clone(),
                        brain: individual.genome.brain.clone(),
                        connections_by_target: HashMap::new(),
                        joint_params,
                        activations: Activations::new(),
                        body: None,
                        disqualified: true,
                        initial_x: 0.0,
                        current_x: 0.0,
                        frozen_x: 0.0,
                        sum_speed: 0.0,
                        sum_upright: 0.0,
                        peak_height: 0.0,
                        tick_count: 0,
                        foot_contact_ticks: 0,
                        runtime_alive: 0.0,
                    });
                }
            }
        }
    }

    /// Scene change applies gravity and per-body damping live, without a
    /// world rebuild.
    fn apply_scene(&mut self, scene: Scene) {
        self.scene = scene;
        let params = scene.params();
        for creature in &self.creatures {
            let Some(body) = &creature.body else { continue };
            for block_id in &body.block_order {
                if let Some(handle) = body.body_by_block.get(block_id) {
                    if let Some(rb) = self.bodies.get_mut(*handle) {
                        rb.set_linear_damping(params.linear_damping);
                        rb.set_angular_damping(params.angular_damping);
                    }
                }
            }
        }
    }

    /// One outer tick: `steps = min(5, ceil(simulationSpeed))` substeps,
    /// each of which evaluates brains, sets joint motors, then advances the
    /// world by [`FIXED_DT`]. `abort` is checked at every substep boundary
    /// so a cancelled evaluation stops mid-tick rather than after it.
    pub fn tick(&mut self, abort: &AtomicBool) -> TelemetryMessage {
        if !self.running {
            return self.snapshot();
        }

        let steps = self.simulation_speed.ceil().max(0.0).min(5.0) as u32;
        for _ in 0..steps {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            self.substep();
        }
        self.snapshot()
    }

    fn substep(&mut self) {
        let gravity = self.scene.params().gravity;
        let sim_time = self.sim_time;

        for creature in &mut self.creatures {
            if creature.disqualified {
                continue;
            }
            let Some(body) = &creature.body else { continue };
            let root_handle = body.root_handle();
            let Some(root) = self.bodies.get(root_handle) else { continue };
            let root_y = root.translation().y;
            let root_linvel_x = root.linvel().x;
            let first_joint_angvel = body
                .block_order
                .get(1)
                .and_then(|id| body.body_by_block.get(id))
                .and_then(|h| self.bodies.get(*h))
                .map(|rb| {
                    let w = rb.angvel();
                    (w.x, w.y, w.z)
                });

            let sensors = SensorInputs { root_y, first_joint_angular_velocity: first_joint_angvel, root_linvel_x };
            let next_activations =
                evaluator::tick(&creature.brain, &creature.activations, &creature.connections_by_target, &sensors, sim_time);

            for block_id in &body.block_order {
                let Some(joint_handle) = body.joint_by_block.get(block_id) else { continue };
                let params = creature.joint_params.get(block_id).copied().unwrap_or(JointParams {
                    speed: 0.0,
                    phase: 0.0,
                    amp: 0.0,
                });
                let target = evaluator::actuator_target(
                    &creature.brain,
                    *block_id,
                    &next_activations,
                    params.amp,
                    params.speed,
                    params.phase,
                    sim_time,
                );
                if let Some(joint) = self.joints.get_mut(*joint_handle) {
                    if let Some(revolute) = joint.data.as_revolute_mut() {
                        revolute.set_motor_position(target, MOTOR_STIFFNESS, MOTOR_DAMPING);
                    }
                }
            }

            creature.activations = next_activations;
        }

        self.physics_pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );

        self.sim_time += FIXED_DT;
        self.post_step_bookkeeping();
    }

    /// Disqualification, respawn and metric accumulation, run once
    /// per substep against the world state just stepped.
    fn post_step_bookkeeping(&mut self) {
        for creature in &mut self.creatures {
            let Some(body) = &creature.body else { continue };
            if creature.disqualified {
                continue;
            }

            let mut just_disqualified = false;
            for block_id in &body.block_order {
                let Some(handle) = body.body_by_block.get(block_id) else { continue };
                let Some(rb) = self.bodies.get_mut(*handle) else { continue };
                let linvel_mag = rb.linvel().norm();
                if linvel_mag > DISQUALIFY_SPEED {
                    debug!(individual = %creature.individual_id, block = block_id, "disqualified: excess linear velocity");
                    let iso = Isometry::from_parts(
                        Translation::from(vector![DISQUALIFIED_POSITION.x, DISQUALIFIED_POSITION.y, DISQUALIFIED_POSITION.z]),
                        *rb.rotation(),
                    );
                    rb.set_position(iso, true);
                    rb.set_linvel(vector![0.0, 0.0, 0.0], true);
                    rb.set_angvel(vector![0.0, 0.0, 0.0], true);
                    rb.sleep();
                    just_disqualified = true;
                    break;
                }
            }
            if just_disqualified {
                creature.disqualify();
                continue;
            }

            for block_id in &body.block_order {
                let Some(handle) = body.body_by_block.get(block_id) else { continue };
                let Some(rb) = self.bodies.get_mut(*handle) else { continue };
                if rb.translation().y < FALL_THRESHOLD_Y {
                    let iso = Isometry::from_parts(
                        Translation::from(vector![RESPAWN_POSITION.x, RESPAWN_POSITION.y, RESPAWN_POSITION.z]),
                        *rb.rotation(),
                    );
                    rb.set_position(iso, true);
                    rb.set_linvel(vector![0.0, 0.0, 0.0], true);
                    rb.set_angvel(vector![0.0, 0.0, 0.0], true);
                }
            }

            let root_handle = body.root_handle();
            if let Some(root) = self.bodies.get(root_handle) {
                creature.current_x = root.translation().x;
                creature.runtime_alive += FIXED_DT;
                creature.tick_count += 1;
                creature.sum_speed += root.linvel().norm();
                let up_world = (*root.rotation()) * vector![0.0, 1.0, 0.0];
                creature.sum_upright += up_world.y;
                creature.peak_height = creature.peak_height.max(root.translation().y);
                if root.translation().y < 0.6 {
                    creature.foot_contact_ticks += 1;
                }
            }
        }
    }

    fn snapshot(&self) -> TelemetryMessage {
        let mut transforms = Vec::new();
        let mut fitness = HashMap::new();

        for creature in &self.creatures {
            if let Some(body) = &creature.body {
                for block_id in &body.block_order {
                    if let Some(handle) = body.body_by_block.get(block_id) {
                        if let Some(rb) = self.bodies.get(*handle) {
                            let t = rb.translation();
                            let r = rb.rotation().coords;
                            transforms.extend_from_slice(&[
                                t.x as f32, t.y as f32, t.z as f32,
                                r.x as f32, r.y as f32, r.z as f32, r.w as f32,
                            ]);
                        }
                    }
                }
            }
            let x = if creature.disqualified { creature.frozen_x } else { creature.current_x };
            fitness.insert(creature.individual_id.clone(), x);
        }

        let physics_fps = if self.integration_parameters.dt > 0.0 { 1.0 / self.integration_parameters.dt } else { 0.0 };
        TelemetryMessage::Update { transforms, fitness, sim_time: self.sim_time, physics_fps }
    }

    /// Final per-individual metrics for the fitness evaluator,
    /// called by the driver when an evaluation window closes.
    pub fn collect_metrics(&self) -> HashMap<String, Metrics> {
        self.creatures.iter().map(|c| (c.individual_id.clone(), c.metrics())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{BlockNode, Brain as GBrain, Genome, JointType, Morphology};

    fn hopper() -> Genome {
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
            brain: GBrain { nodes: vec![], connections: vec![] },
            joint_params: None,
            version: crate::genome::GENOME_SCHEMA_VERSION,
        }
    }

    fn individual(id: &str) -> Individual {
        Individual { id: id.to_string(), genome: hopper(), metrics: None, fitness: None }
    }

    #[test]
    fn init_replies_ready() {
        let mut scheduler = Scheduler::new(Scene::Earth);
        let reply = scheduler.handle(ControlMessage::Init);
        assert!(matches!(reply, Some(TelemetryMessage::Ready)));
    }

    #[test]
    fn stopped_scheduler_still_emits_an_update_without_stepping() {
        let mut scheduler = Scheduler::new(Scene::Earth);
        scheduler.handle(ControlMessage::SetPopulation(vec![individual("a")]));
        let before = scheduler.sim_time;
        let msg = scheduler.tick(&AtomicBool::new(false));
        assert!(matches!(msg, TelemetryMessage::Update { .. }));
        assert_eq!(scheduler.sim_time, before);
    }

    #[test]
    fn running_scheduler_advances_sim_time() {
        let mut scheduler = Scheduler::new(Scene::Earth);
        scheduler.handle(ControlMessage::SetPopulation(vec![individual("a")]));
        scheduler.handle(ControlMessage::Start);
        scheduler.tick(&AtomicBool::new(false));
        assert!(scheduler.sim_time > 0.0);
    }

    #[test]
    fn malformed_genome_is_disqualified_and_does_not_block_the_rest() {
        let mut bad = hopper();
        bad.morphology.nodes.push(BlockNode {
            id: 1,
            parent_id: Some(99),
            size: Vec3::new(1.0, 1.0, 1.0),
            attach_face: 0,
            rotation: None,
            parent_offset: None,
            child_offset: None,
            joint_type: JointType::Revolute,
            joint_params: None,
        });
        let mut scheduler = Scheduler::new(Scene::Earth);
        scheduler.handle(ControlMessage::SetPopulation(vec![
            Individual { id: "bad".into(), genome: bad, metrics: None, fitness: None },
            individual("good"),
        ]));
        let metrics = scheduler.collect_metrics();
        assert!(metrics["bad"].disqualified);
        assert!(!metrics["good"].disqualified);
    }

    #[test]
    fn scene_change_updates_gravity_without_rebuilding_the_world() {
        let mut scheduler = Scheduler::new(Scene::Earth);
        scheduler.handle(ControlMessage::SetPopulation(vec![individual("a")]));
        let handle_before = scheduler.creatures[0].body.as_ref().unwrap().root_handle();
        scheduler.handle(ControlMessage::SetConfig { scene: Some(Scene::Moon) });
        let handle_after = scheduler.creatures[0].body.as_ref().unwrap().root_handle();
        assert_eq!(handle_before, handle_after);
        assert_eq!(scheduler.scene, Scene::Moon);
    }
}
