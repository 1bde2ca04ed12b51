//! Persistence façade: contracts only. The reference
//! `JsonFilePersistence` implementation lives in `morphos-runner`, the
//! same way a real embedding host injects its own key/value store.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::genome::Individual;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationHistoryEntry {
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_individual: Individual,
    pub best_metrics: Option<crate::fitness::Metrics>,
    pub evaluated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub status: RunStatus,
    pub config: crate::evolution::RunConfig,
    pub generation: u32,
    pub total_generations: u32,
    pub history: Vec<GenerationHistoryEntry>,
    pub population: Vec<Individual>,
    pub rng_state: u32,
    pub best: Option<Individual>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMetadata {
    pub run_id: String,
    pub generation: u32,
    pub individual_id: String,
    pub duration_sec: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub metadata: ReplayMetadata,
    pub transforms: Vec<Vec<f32>>,
}

/// Contract for a run-state backend. Implementations must be atomic per
/// call and must return the exact object previously saved
/// (`save; load == Some(saved)`).
pub trait RunPersistence {
    fn save_run_state(&self, state: &RunState) -> Result<(), StorageError>;
    fn load_run_state(&self) -> Result<Option<RunState>, StorageError>;
    fn clear_run_state(&self) -> Result<(), StorageError>;
}

/// Contract for a replay backend, mirroring [`RunPersistence`].
pub trait ReplayPersistence {
    fn save_replay(&self, record: &ReplayRecord) -> Result<(), StorageError>;
    fn load_replay(&self, run_id: &str, generation: u32, individual_id: &str) -> Result<Option<ReplayRecord>, StorageError>;
    fn clear_replay(&self, run_id: &str, generation: u32, individual_id: &str) -> Result<(), StorageError>;
}
