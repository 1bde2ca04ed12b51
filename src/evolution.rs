//! Evolution driver: the generation loop tying the instantiator,
//! scheduler and fitness evaluator into an evaluate -> rank -> select ->
//! reproduce pipeline with resume/abort support.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AbortError, ConfigError};
use crate::fitness::{self, Metrics, SelectionWeights};
use crate::genome::{
    BlockNode, Brain, FaceOffset, Genome, Individual, JointParams, JointType, Morphology,
    NeuralConnection, NeuralNode, NodeType, GENOME_SCHEMA_VERSION,
};
use crate::persistence::{GenerationHistoryEntry, RunState, RunStatus};
use crate::prng::Prng;
use crate::scheduler::{ControlMessage, Scene, Scheduler};

/// Ticks simulated per individual per evaluation window. Not part of the
/// configuration surface; fixed so that seed
/// reproducibility does not depend on wall-clock timing.
pub const EVALUATION_TICKS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Int(i64),
    Str(String),
}

impl Seed {
    fn to_u32_seed(&self) -> u32 {
        match self {
            Seed::Int(n) => *n as u32,
            Seed::Str(s) => Prng::from_seed_str(s).state(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphMutationConfig {
    pub add_limb_chance: f64,
    pub resize_chance: f64,
    pub joint_jitter_chance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerMutationConfig {
    pub weight_jitter_chance: f64,
    pub oscillator_chance: f64,
    pub add_connection_chance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub seed: Seed,
    pub population_size: u32,
    pub generations: u32,
    pub selection_weights: SelectionWeights,
    pub morph_mutation: MorphMutationConfig,
    pub controller_mutation: ControllerMutationConfig,
    pub starting_model_id: Option<String>,
}

/// Collects `GenomeError`s into a single `ConfigError::InvalidGenome`, or
/// the plain numeric-range errors `RunConfig` itself can violate.
pub fn validate_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.population_size == 0 {
        return Err(ConfigError::PopulationSizeZero(config.population_size));
    }
    let weights = [
        ("distance", config.selection_weights.displacement),
        ("speed", config.selection_weights.speed),
        ("upright", config.selection_weights.upright),
    ];
    for (field, value) in weights {
        if value < 0.0 {
            return Err(ConfigError::NegativeSelectionWeight { field, value });
        }
    }
    let chances = [
        ("addLimbChance", config.morph_mutation.add_limb_chance),
        ("resizeChance", config.morph_mutation.resize_chance),
        ("jointJitterChance", config.morph_mutation.joint_jitter_chance),
        ("weightJitterChance", config.controller_mutation.weight_jitter_chance),
        ("oscillatorChance", config.controller_mutation.oscillator_chance),
        ("addConnectionChance", config.controller_mutation.add_connection_chance),
    ];
    for (field, value) in chances {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::MutationChanceOutOfRange { field, value });
        }
    }
    Ok(())
}

pub fn config_hash(config: &RunConfig) -> u64 {
    let json = serde_json::to_string(config).expect("RunConfig always serializes");
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}

/// Per-generation progress event (`onGeneration`).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationEvent {
    pub generation: u32,
    pub absolute_generation: u32,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_individual: Individual,
    pub best_metrics: Option<Metrics>,
    pub evaluated: bool,
}

/// Receives the driver's three emission points. A CLI observer logs each
/// via `tracing`; a host observer would forward them across its own
/// message boundary.
pub trait DriverObserver {
    fn on_generation(&mut self, event: &GenerationEvent);
    fn on_state_snapshot(&mut self, state: &RunState);
    fn on_complete(&mut self, state: &RunState);
}

/// An observer that only logs; used by tests and as the CLI's default.
pub struct TracingObserver;

impl DriverObserver for TracingObserver {
    fn on_generation(&mut self, event: &GenerationEvent) {
        info!(
            generation = event.absolute_generation,
            best_fitness = event.best_fitness,
            mean_fitness = event.mean_fitness,
            "generation complete"
        );
    }

    fn on_state_snapshot(&mut self, state: &RunState) {
        info!(generation = state.generation, status = ?state.status, "state snapshot");
    }

    fn on_complete(&mut self, state: &RunState) {
        info!(generation = state.generation, "run complete");
    }
}

fn default_hopper_genome() -> Genome {
    let root = BlockNode {
        id: 0,
        parent_id: None,
        size: crate::vecmath::Vec3::new(1.0, 0.5, 1.0),
        attach_face: 0,
        rotation: None,
        parent_offset: None,
        child_offset: None,
        joint_type: JointType::Revolute,
        joint_params: None,
    };
    let leg = BlockNode {
        id: 1,
        parent_id: Some(0),
        size: crate::vecmath::Vec3::new(0.3, 1.0, 0.3),
        attach_face: 3,
        rotation: None,
        parent_offset: Some(FaceOffset { u: 0.0, v: 0.0 }),
        child_offset: Some(FaceOffset { u: 0.0, v: 0.0 }),
        joint_type: JointType::Revolute,
        joint_params: Some(JointParams { speed: 3.0, phase: 0.0, amp: 0.6 }),
    };
    let oscillator = NeuralNode {
        id: "osc0".into(),
        node_type: NodeType::Oscillator,
        activation: None,
        x: 0.1,
        y: 0.2,
        target: None,
    };
    let actuator = NeuralNode {
        id: "a1".into(),
        node_type: NodeType::Actuator,
        activation: None,
        x: 0.9,
        y: 0.8,
        target: Some(crate::genome::ActuatorTarget { joint_ref: 1, channel: "torque".into() }),
    };
    let connection = NeuralConnection { id: "c0".into(), source: "osc0".into(), target: "a1".into(), weight: 1.0 };

    Genome {
        morphology: Morphology { nodes: vec![root, leg] },
        brain: Brain { nodes: vec![oscillator, actuator], connections: vec![connection] },
        joint_params: None,
        version: GENOME_SCHEMA_VERSION,
    }
}

fn mutate_genome(
    genome: &Genome,
    rng: &mut Prng,
    morph: &MorphMutationConfig,
    controller: &ControllerMutationConfig,
) -> Genome {
    let mut next = genome.clone();

    if rng.bool(morph.resize_chance) && !next.morphology.nodes.is_empty() {
        let idx = rng.int(next.morphology.nodes.len() as u32) as usize;
        let factor = rng.float(0.8, 1.2);
        let node = &mut next.morphology.nodes[idx];
        node.size = node.size.scale(factor);
    }

    if rng.bool(morph.joint_jitter_chance) {
        let candidates: Vec<usize> = next
            .morphology
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.joint_params.is_some())
            .map(|(i, _)| i)
            .collect();
        if !candidates.is_empty() {
            let idx = candidates[rng.int(candidates.len() as u32) as usize];
            if let Some(params) = &mut next.morphology.nodes[idx].joint_params {
                params.speed = (params.speed + rng.float(-0.5, 0.5)).max(0.01);
                params.phase += rng.float(-0.3, 0.3);
                params.amp = (params.amp + rng.float(-0.2, 0.2)).max(0.01);
            }
        }
    }

    if rng.bool(morph.add_limb_chance) {
        let parent_idx = rng.int(next.morphology.nodes.len() as u32) as usize;
        let parent_id = next.morphology.nodes[parent_idx].id;
        let new_id = next.morphology.nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        next.morphology.nodes.push(BlockNode {
            id: new_id,
            parent_id: Some(parent_id),
            size: crate::vecmath::Vec3::new(0.3, 0.6, 0.3),
            attach_face: rng.int(6) as u8,
            rotation: None,
            parent_offset: None,
            child_offset: None,
            joint_type: JointType::Revolute,
            joint_params: Some(JointParams { speed: rng.float(1.0, 4.0), phase: rng.float(0.0, 6.28), amp: rng.float(0.2, 0.8) }),
        });
    }

    if rng.bool(controller.weight_jitter_chance) && !next.brain.connections.is_empty() {
        let idx = rng.int(next.brain.connections.len() as u32) as usize;
        next.brain.connections[idx].weight += rng.float(-0.5, 0.5);
    }

    if rng.bool(controller.oscillator_chance) {
        let oscillators: Vec<usize> = next
            .brain
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.node_type == NodeType::Oscillator)
            .map(|(i, _)| i)
            .collect();
        if !oscillators.is_empty() {
            let idx = oscillators[rng.int(oscillators.len() as u32) as usize];
            next.brain.nodes[idx].y = (next.brain.nodes[idx].y + rng.float(-0.1, 0.1)).clamp(0.0, 1.0);
        }
    }

    if rng.bool(controller.add_connection_chance) && next.brain.nodes.len() >= 2 {
        let source_idx = rng.int(next.brain.nodes.len() as u32) as usize;
        let targets: Vec<usize> = next
            .brain
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.node_type != NodeType::Sensor)
            .map(|(i, _)| i)
            .collect();
        if !targets.is_empty() {
            let target_idx = targets[rng.int(targets.len() as u32) as usize];
            let source_id = next.brain.nodes[source_idx].id.clone();
            let target_id = next.brain.nodes[target_idx].id.clone();
            let already_exists = next
                .brain
                .connections
                .iter()
                .any(|c| c.source == source_id && c.target == target_id);
            if !already_exists && source_id != target_id {
                let new_id = format!("c{}", next.brain.connections.len());
                next.brain.connections.push(NeuralConnection {
                    id: new_id,
                    source: source_id,
                    target: target_id,
                    weight: rng.float(-1.0, 1.0),
                });
            }
        }
    }

    next
}

struct ScoredIndividual {
    individual: Individual,
    metrics: Metrics,
    fitness: f64,
}

fn evaluate_population(
    population: &[Individual],
    scene: Scene,
    weights: &SelectionWeights,
    abort: &AtomicBool,
) -> Vec<ScoredIndividual> {
    let mut scheduler = Scheduler::new(scene);
    scheduler.handle(ControlMessage::Init);
    scheduler.handle(ControlMessage::SetPopulation(population.to_vec()));
    scheduler.handle(ControlMessage::Start);
    for _ in 0..EVALUATION_TICKS {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        scheduler.tick(abort);
    }
    let metrics = scheduler.collect_metrics();

    population
        .iter()
        .map(|individual| {
            let m = metrics.get(&individual.id).copied().unwrap_or(Metrics {
                displacement: 0.0,
                mean_speed: 0.0,
                mean_upright: 0.0,
                peak_height: 0.0,
                runtime_alive: 0.0,
                foot_contact_ratio: 0.0,
                disqualified: true,
            });
            let f = fitness::fitness(&m, weights);
            ScoredIndividual {
                individual: Individual {
                    id: individual.id.clone(),
                    genome: individual.genome.clone(),
                    metrics: Some(m),
                    fitness: Some(f),
                },
                metrics: m,
                fitness: f,
            }
        })
        .collect()
}

fn tournament_select<'a>(ranked: &'a [ScoredIndividual], rng: &mut Prng) -> &'a ScoredIndividual {
    let size = 2 + rng.int(2) as usize;
    let mut best_idx = rng.int(ranked.len() as u32) as usize;
    for _ in 1..size {
        let candidate = rng.int(ranked.len() as u32) as usize;
        if ranked[candidate].fitness > ranked[best_idx].fitness {
            best_idx = candidate;
        }
    }
    &ranked[best_idx]
}

pub struct EvolutionDriver {
    config: RunConfig,
    rng: Prng,
}

impl EvolutionDriver {
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let seed = config.seed.to_u32_seed();
        Ok(EvolutionDriver { config, rng: Prng::new(seed) })
    }

    fn seed_population(&mut self) -> Vec<Individual> {
        let mut rng_pop = self.rng.split("pop");
        if self.config.starting_model_id.is_some() {
            warn!("startingModelId registry lookup is not implemented; falling back to the default hopper genome");
        }
        let base = default_hopper_genome();
        (0..self.config.population_size)
            .map(|i| Individual {
                id: format!("gen0-ind{i}"),
                genome: mutate_genome(&base, &mut rng_pop, &self.config.morph_mutation, &self.config.controller_mutation),
                metrics: None,
                fitness: None,
            })
            .collect()
    }

    fn build_snapshot(
        &self,
        status: RunStatus,
        generation: u32,
        history: &[GenerationHistoryEntry],
        population: &[Individual],
        best: Option<Individual>,
        now: &str,
    ) -> RunState {
        RunState {
            status,
            config: self.config.clone(),
            generation,
            total_generations: self.config.generations,
            history: history.to_vec(),
            population: population.to_vec(),
            rng_state: self.rng.state(),
            best,
            updated_at: now.to_string(),
        }
    }

    /// Runs the full generation loop. `now` is supplied by the caller (no
    /// wall-clock access here) and stamps every snapshot's `updated_at`.
    pub fn run(
        &mut self,
        observer: &mut dyn DriverObserver,
        abort: &AtomicBool,
        resume: Option<RunState>,
        scene: Scene,
        now: &str,
    ) -> Result<RunState, AbortError> {
        let (mut generation, mut history, mut population) = match resume {
            Some(state) if config_hash(&self.config) == config_hash(&state.config) => {
                self.rng = Prng::from_state(state.rng_state);
                (state.generation, state.history, state.population)
            }
            Some(_) => {
                warn!("resume config hash mismatch; starting a fresh run");
                (0, Vec::new(), self.seed_population())
            }
            None => (0, Vec::new(), self.seed_population()),
        };

        if self.config.generations == 0 {
            let result = self.build_snapshot(RunStatus::Completed, generation, &history, &population, None, now);
            observer.on_complete(&result);
            return Ok(result);
        }

        while generation < self.config.generations {
            if abort.load(Ordering::SeqCst) {
                let aborted =
                    self.build_snapshot(RunStatus::Aborted, generation, &history, &population, history.last().map(|h| h.best_individual.clone()), now);
                observer.on_state_snapshot(&aborted);
                return Err(AbortError { generation });
            }

            let _rng_eval = self.rng.split("eval");
            let mut ranked = evaluate_population(&population, scene, &self.config.selection_weights, abort);
            ranked.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(std::cmp::Ordering::Equal));

            let non_disqualified: Vec<&ScoredIndividual> =
                ranked.iter().filter(|s| !s.metrics.disqualified).collect();
            let mean_fitness = if non_disqualified.is_empty() {
                ranked.first().map(|s| s.fitness).unwrap_or(0.0)
            } else {
                non_disqualified.iter().map(|s| s.fitness).sum::<f64>() / non_disqualified.len() as f64
            };
            let best = &ranked[0];

            let event = GenerationEvent {
                generation,
                absolute_generation: generation,
                best_fitness: best.fitness,
                mean_fitness,
                best_individual: best.individual.clone(),
                best_metrics: Some(best.metrics),
                evaluated: true,
            };
            observer.on_generation(&event);

            history.push(GenerationHistoryEntry {
                best_fitness: best.fitness,
                mean_fitness,
                best_individual: best.individual.clone(),
                best_metrics: Some(best.metrics),
                evaluated: true,
            });

            // Selection and reproduction run before the abort check below so
            // that an abort caught here still snapshots generation+1's
            // offspring, not generation's own (already-evaluated) parents --
            // the same population a resume would otherwise have to
            // re-evaluate from scratch.
            let mut rng_select = self.rng.split("select");
            let mut rng_mutate = self.rng.split("mutate");
            let mut next_population = Vec::with_capacity(population.len());
            next_population.push(best.individual.clone());
            let mut counter = 0u32;
            while next_population.len() < population.len() {
                let winner = tournament_select(&ranked, &mut rng_select);
                let mutated = mutate_genome(
                    &winner.individual.genome,
                    &mut rng_mutate,
                    &self.config.morph_mutation,
                    &self.config.controller_mutation,
                );
                next_population.push(Individual {
                    id: format!("gen{}-ind{counter}", generation + 1),
                    genome: mutated,
                    metrics: None,
                    fitness: None,
                });
                counter += 1;
            }

            if abort.load(Ordering::SeqCst) {
                let aborted = self.build_snapshot(
                    RunStatus::Aborted,
                    generation + 1,
                    &history,
                    &next_population,
                    Some(best.individual.clone()),
                    now,
                );
                observer.on_state_snapshot(&aborted);
                return Err(AbortError { generation: generation + 1 });
            }

            population = next_population;
            generation += 1;

            let snapshot =
                self.build_snapshot(RunStatus::Running, generation, &history, &population, Some(best.individual.clone()), now);
            observer.on_state_snapshot(&snapshot);
        }

        let best = history.last().map(|h| h.best_individual.clone());
        let result = self.build_snapshot(RunStatus::Completed, generation, &history, &population, best, now);
        observer.on_complete(&result);
        Ok(result)
    }
}
