//! Crate-wide error taxonomy.
//!
//! One `thiserror` enum per failure domain, composed behind a single
//! crate-level umbrella (`MorphError`): library code returns these narrow,
//! typed errors; the CLI boundary (`morphos-runner`) composes them behind
//! `anyhow::Result`.

use thiserror::Error;

/// Validation failures collected by [`crate::genome::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenomeError {
    #[error("duplicate node id: {0}")]
    DuplicateId(String),
    #[error("connection {connection} references unknown node {node}")]
    UnknownConnectionEndpoint { connection: String, node: String },
    #[error("connection {0} targets a SENSOR node, which is never a valid target")]
    SensorAsTarget(String),
    #[error("duplicate connection edge between {source} and {target}")]
    DuplicateEdge { source: String, target: String },
    #[error("field {field} on node {node} is not finite")]
    NonFiniteField { node: String, field: &'static str },
    #[error("unsupported genome schema version: {0}")]
    UnsupportedVersion(u32),
    #[error("morphology has no root block")]
    NoRoot,
    #[error("morphology has more than one root block")]
    MultipleRoots,
    #[error("block {child} references parent {parent}, which does not precede it in declaration order")]
    ForwardOrCyclicReference { child: i64, parent: i64 },
    #[error("block {0} has a non-positive size component")]
    NonPositiveSize(i64),
    #[error("block {block} has attach face {face} outside of 0..=5")]
    AttachFaceOutOfRange { block: i64, face: u8 },
}

/// Malformed body graph discovered during instantiation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstantiationError {
    #[error("block {0} has a parent id that does not resolve to any earlier block")]
    OrphanParent(i64),
    #[error("morphology graph contains a cycle")]
    Cycle,
    #[error("duplicate block id: {0}")]
    DuplicateId(i64),
    #[error("block {0} has a non-finite size or rotation")]
    NonFinite(i64),
}

/// Invalid configuration surface; a run refuses to start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("populationSize must be >= 1, got {0}")]
    PopulationSizeZero(u32),
    #[error("selection weight {field} must be non-negative, got {value}")]
    NegativeSelectionWeight { field: &'static str, value: f64 },
    #[error("mutation chance {field} must be within [0, 1], got {value}")]
    MutationChanceOutOfRange { field: &'static str, value: f64 },
    #[error("resume config hash {resume_hash} does not match current config hash {current_hash}; starting fresh")]
    ResumeConfigMismatch { resume_hash: u64, current_hash: u64 },
    #[error("genome is invalid: {0:?}")]
    InvalidGenome(Vec<GenomeError>),
}

/// Cooperative cancellation of an in-progress evaluation or run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("evolution run was aborted at generation {generation}")]
pub struct AbortError {
    pub generation: u32,
}

/// Persistence layer failure; the run continues in-memory.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed replay buffer; playback is refused.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("replay buffer is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("replay metadata is missing required field: {0}")]
    MissingField(&'static str),
}

/// Step failure inside the physics engine; the substep is skipped.
#[derive(Error, Debug)]
#[error("physics step failed: {0}")]
pub struct PhysicsPanic(pub String);

/// Umbrella error composing the narrower domain errors above, for call
/// sites that need a single return type (e.g. the evolution driver's
/// top-level `run`).
#[derive(Error, Debug)]
pub enum MorphError {
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Abort(#[from] AbortError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error(transparent)]
    Physics(#[from] PhysicsPanic),
}
