//! End-to-end scenarios for the evolution driver, run against the real
//! scheduler and physics world rather than mocks.

use std::sync::atomic::{AtomicBool, Ordering};

use morphos::evolution::{
    ControllerMutationConfig, DriverObserver, EvolutionDriver, GenerationEvent, MorphMutationConfig, RunConfig, Seed,
};
use morphos::fitness::SelectionWeights;
use morphos::persistence::{RunState, RunStatus};
use morphos::scheduler::Scene;

struct RecordingObserver {
    generations: Vec<GenerationEvent>,
    snapshots: Vec<RunState>,
    completed: Option<RunState>,
}

impl RecordingObserver {
    fn new() -> Self {
        RecordingObserver { generations: Vec::new(), snapshots: Vec::new(), completed: None }
    }
}

impl DriverObserver for RecordingObserver {
    fn on_generation(&mut self, event: &GenerationEvent) {
        self.generations.push(event.clone());
    }
    fn on_state_snapshot(&mut self, state: &RunState) {
        self.snapshots.push(state.clone());
    }
    fn on_complete(&mut self, state: &RunState) {
        self.completed = Some(state.clone());
    }
}

fn config(seed: i64, population_size: u32, generations: u32, selection_weights: SelectionWeights) -> RunConfig {
    RunConfig {
        seed: Seed::Int(seed),
        population_size,
        generations,
        selection_weights,
        morph_mutation: MorphMutationConfig { add_limb_chance: 0.1, resize_chance: 0.3, joint_jitter_chance: 0.3 },
        controller_mutation: ControllerMutationConfig {
            weight_jitter_chance: 0.3,
            oscillator_chance: 0.2,
            add_connection_chance: 0.1,
        },
        starting_model_id: None,
    }
}

#[test]
fn test_seed_42_population_4_generations_2_on_earth() {
    let mut driver = EvolutionDriver::new(config(42, 4, 2, SelectionWeights::default())).unwrap();
    let mut observer = RecordingObserver::new();
    let abort = AtomicBool::new(false);

    let result = driver.run(&mut observer, &abort, None, Scene::Earth, "t0").unwrap();

    assert_eq!(observer.generations.iter().map(|e| e.absolute_generation).collect::<Vec<_>>(), vec![0, 1]);
    let gen0_best = observer.generations[0].best_fitness;
    let gen1_best = observer.generations[1].best_fitness;
    assert!(gen1_best >= gen0_best - 1e-9, "elitism must never regress the best fitness");
    assert_eq!(observer.completed.as_ref().map(|s| s.generation), Some(result.generation));
    assert_eq!(result.status, RunStatus::Completed);
}

/// Wraps a [`RecordingObserver`] and flips an abort flag once a chosen
/// generation's `onGeneration` has fired, so the host's cooperative-abort
/// contract can be exercised deterministically in a test.
struct AbortAfter<'a> {
    inner: &'a mut RecordingObserver,
    flag: &'a AtomicBool,
    abort_after_generation: u32,
}

impl<'a> DriverObserver for AbortAfter<'a> {
    fn on_generation(&mut self, event: &GenerationEvent) {
        self.inner.on_generation(event);
        if event.absolute_generation == self.abort_after_generation {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
    fn on_state_snapshot(&mut self, state: &RunState) {
        self.inner.on_state_snapshot(state);
    }
    fn on_complete(&mut self, state: &RunState) {
        self.inner.on_complete(state);
    }
}

#[test]
fn test_abort_after_generation_2_then_resume_continues_with_the_same_population() {
    let cfg = config(7, 3, 5, SelectionWeights::default());

    let mut driver = EvolutionDriver::new(cfg.clone()).unwrap();
    let mut observer = RecordingObserver::new();
    let abort_flag = AtomicBool::new(false);
    let mut wrapped = AbortAfter { inner: &mut observer, flag: &abort_flag, abort_after_generation: 2 };

    let abort_err = driver.run(&mut wrapped, &abort_flag, None, Scene::Earth, "t0").unwrap_err();
    assert_eq!(observer.generations.len(), 3);
    assert_eq!(abort_err.generation, 3);

    let aborted_snapshot = observer.snapshots.last().unwrap().clone();
    assert_eq!(aborted_snapshot.status, RunStatus::Aborted);
    assert_eq!(aborted_snapshot.generation, 3);
    assert_eq!(aborted_snapshot.history.len(), 3);

    let mut resumed_driver = EvolutionDriver::new(cfg).unwrap();
    let mut resumed_observer = RecordingObserver::new();
    let fresh_abort = AtomicBool::new(false);
    resumed_driver.run(&mut resumed_observer, &fresh_abort, Some(aborted_snapshot), Scene::Earth, "t1").unwrap();
    let resumed_gens: Vec<u32> = resumed_observer.generations.iter().map(|e| e.absolute_generation).collect();
    assert_eq!(resumed_gens, vec![3, 4]);
}

#[test]
fn test_malformed_genome_in_a_population_of_three_is_sentineled_and_the_run_still_completes() {
    // The driver itself always seeds a well-formed population; this
    // exercises the same code path the scheduler takes for a bad genome by
    // driving the scheduler directly through a single evaluation window,
    // mirroring what `EvolutionDriver::run` does each generation.
    use morphos::genome::{BlockNode, Brain, Genome, Individual, JointType, Morphology, GENOME_SCHEMA_VERSION};
    use morphos::scheduler::{ControlMessage, Scheduler};
    use morphos::vecmath::Vec3;

    fn good_genome() -> Genome {
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

    fn bad_genome() -> Genome {
        let mut g = good_genome();
        g.morphology.nodes.push(BlockNode {
            id: 1,
            parent_id: Some(42),
            size: Vec3::new(1.0, 1.0, 1.0),
            attach_face: 0,
            rotation: None,
            parent_offset: None,
            child_offset: None,
            joint_type: JointType::Revolute,
            joint_params: None,
        });
        g
    }

    let population = vec![
        Individual { id: "a".into(), genome: good_genome(), metrics: None, fitness: None },
        Individual { id: "bad".into(), genome: bad_genome(), metrics: None, fitness: None },
        Individual { id: "c".into(), genome: good_genome(), metrics: None, fitness: None },
    ];

    let mut scheduler = Scheduler::new(Scene::Earth);
    scheduler.handle(ControlMessage::SetPopulation(population));
    scheduler.handle(ControlMessage::Start);
    let abort = AtomicBool::new(false);
    for _ in 0..10 {
        scheduler.tick(&abort);
    }
    let metrics = scheduler.collect_metrics();
    let weights = SelectionWeights::default();
    let bad_fitness = morphos::fitness::fitness(&metrics["bad"], &weights);
    assert_eq!(bad_fitness, morphos::fitness::DISQUALIFIED_FITNESS);
    assert!(!metrics["a"].disqualified);
    assert!(!metrics["c"].disqualified);
}

#[test]
fn test_upright_only_weights_yield_best_fitness_equal_to_the_maximum_upright_metric() {
    let weights = SelectionWeights { displacement: 0.0, speed: 0.0, upright: 1.0 };
    let mut driver = EvolutionDriver::new(config(1, 2, 1, weights)).unwrap();
    let mut observer = RecordingObserver::new();
    let abort = AtomicBool::new(false);
    driver.run(&mut observer, &abort, None, Scene::Earth, "t0").unwrap();

    let event = &observer.generations[0];
    let best_metrics = event.best_metrics.expect("a non-disqualified best individual always has metrics");
    assert!((event.best_fitness - best_metrics.mean_upright).abs() < 1e-9);
}
