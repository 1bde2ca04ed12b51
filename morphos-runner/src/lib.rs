//! Headless host for the `morphos` evolution driver: a JSON-file-backed
//! implementation of its persistence contracts, so a run survives a
//! restart without any embedding application around it.

use std::fs;
use std::path::{Path, PathBuf};

use morphos::error::StorageError;
use morphos::persistence::{ReplayPersistence, ReplayRecord, RunPersistence, RunState};

/// Stores run state and replays as individual JSON files under a directory,
/// written atomically (temp file + rename) so a crash mid-write never
/// leaves a half-written file behind for the next load to trip over.
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JsonFilePersistence { dir })
    }

    fn run_state_path(&self) -> PathBuf {
        self.dir.join("run_state.json")
    }

    fn replay_path(&self, run_id: &str, generation: u32, individual_id: &str) -> PathBuf {
        self.dir.join(format!("replay_{run_id}_{generation}_{individual_id}.json"))
    }

    fn write_atomic(&self, path: &Path, json: &str) -> Result<(), StorageError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_if_present(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl RunPersistence for JsonFilePersistence {
    fn save_run_state(&self, state: &RunState) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(state)?;
        self.write_atomic(&self.run_state_path(), &json)
    }

    fn load_run_state(&self) -> Result<Option<RunState>, StorageError> {
        match self.read_optional(&self.run_state_path())? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }

    fn clear_run_state(&self) -> Result<(), StorageError> {
        self.remove_if_present(&self.run_state_path())
    }
}

impl ReplayPersistence for JsonFilePersistence {
    fn save_replay(&self, record: &ReplayRecord) -> Result<(), StorageError> {
        let path = self.replay_path(&record.metadata.run_id, record.metadata.generation, &record.metadata.individual_id);
        let json = serde_json::to_string(record)?;
        self.write_atomic(&path, &json)
    }

    fn load_replay(&self, run_id: &str, generation: u32, individual_id: &str) -> Result<Option<ReplayRecord>, StorageError> {
        match self.read_optional(&self.replay_path(run_id, generation, individual_id))? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }

    fn clear_replay(&self, run_id: &str, generation: u32, individual_id: &str) -> Result<(), StorageError> {
        self.remove_if_present(&self.replay_path(run_id, generation, individual_id))
    }
}
