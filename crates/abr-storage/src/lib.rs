use abr_core::{AggregateState, DailyTally};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const TOTAL_COUNT_FILE: &str = "total_count.txt";
pub const PROJECT_COUNTS_FILE: &str = "project_counts.json";
pub const DAILY_COUNTS_FILE: &str = "daily_counts.json";
pub const DAILY_SECONDARY_COUNTS_FILE: &str = "daily_right_counts.json";
pub const PROCESSED_IDS_FILE: &str = "processed_ids.json";
pub const BACKFILL_SNAPSHOT_FILE: &str = "backfill_counts.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Day-level counts written by a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSnapshot {
    #[serde(default, rename = "absolutely_right")]
    pub primary: BTreeMap<String, u64>,
    #[serde(default, rename = "right")]
    pub secondary: BTreeMap<String, u64>,
}

impl From<&DailyTally> for BackfillSnapshot {
    fn from(tally: &DailyTally) -> Self {
        Self {
            primary: tally.primary.clone(),
            secondary: tally.secondary.clone(),
        }
    }
}

/// Counter files under a single data directory.
///
/// Each logical piece of state lives in its own file. Loads never fail: a
/// missing or unreadable file is the empty default. Saves overwrite the whole
/// file through a temp file and rename. There is no locking.
#[derive(Debug, Clone)]
pub struct AggregateStore {
    dir: PathBuf,
}

impl AggregateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Watcher state as found on disk, with absent pieces defaulted.
    pub fn load_state(&self) -> AggregateState {
        AggregateState {
            total: self.load_total(),
            daily: self.load_daily_counts(),
            daily_secondary: self.load_daily_secondary_counts(),
            projects: self.load_project_counts(),
            processed_ids: self.load_processed_ids(),
        }
    }

    pub fn save_state(&self, state: &AggregateState) -> Result<(), StorageError> {
        self.save_total(state.total)?;
        self.save_project_counts(&state.projects)?;
        self.save_processed_ids(&state.processed_ids)?;
        self.save_daily_counts(&state.daily)?;
        self.save_daily_secondary_counts(&state.daily_secondary)?;
        Ok(())
    }

    pub fn load_total(&self) -> u64 {
        let path = self.path(TOTAL_COUNT_FILE);
        let Some(raw) = read_optional(&path) else {
            return 0;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return 0;
        }
        trimmed.parse().unwrap_or_else(|err| {
            debug!(path = %path.display(), error = %err, "ignoring corrupt total counter");
            0
        })
    }

    pub fn save_total(&self, total: u64) -> Result<(), StorageError> {
        write_atomic(&self.path(TOTAL_COUNT_FILE), &total.to_string())
    }

    pub fn load_project_counts(&self) -> BTreeMap<String, u64> {
        self.read_json(PROJECT_COUNTS_FILE)
    }

    pub fn save_project_counts(&self, counts: &BTreeMap<String, u64>) -> Result<(), StorageError> {
        self.write_json(PROJECT_COUNTS_FILE, counts)
    }

    pub fn load_daily_counts(&self) -> BTreeMap<String, u64> {
        self.read_json(DAILY_COUNTS_FILE)
    }

    pub fn save_daily_counts(&self, counts: &BTreeMap<String, u64>) -> Result<(), StorageError> {
        self.write_json(DAILY_COUNTS_FILE, counts)
    }

    pub fn load_daily_secondary_counts(&self) -> BTreeMap<String, u64> {
        self.read_json(DAILY_SECONDARY_COUNTS_FILE)
    }

    pub fn save_daily_secondary_counts(
        &self,
        counts: &BTreeMap<String, u64>,
    ) -> Result<(), StorageError> {
        self.write_json(DAILY_SECONDARY_COUNTS_FILE, counts)
    }

    pub fn load_processed_ids(&self) -> HashSet<String> {
        self.read_json::<Vec<String>>(PROCESSED_IDS_FILE)
            .into_iter()
            .collect()
    }

    pub fn save_processed_ids(&self, ids: &HashSet<String>) -> Result<(), StorageError> {
        let mut sorted = ids.iter().collect::<Vec<_>>();
        sorted.sort();
        self.write_json(PROCESSED_IDS_FILE, &sorted)
    }

    pub fn save_backfill_snapshot(&self, snapshot: &BackfillSnapshot) -> Result<(), StorageError> {
        self.write_json(BACKFILL_SNAPSHOT_FILE, snapshot)
    }

    fn read_json<T: DeserializeOwned + Default>(&self, file_name: &str) -> T {
        let path = self.path(file_name);
        let Some(raw) = read_optional(&path) else {
            return T::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            debug!(path = %path.display(), error = %err, "ignoring corrupt state file");
            T::default()
        })
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string_pretty(value)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        write_atomic(&self.path(file_name), &payload)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unreadable state file");
            None
        }
    }
}

fn write_atomic(path: &Path, payload: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    fs::write(&temp_path, payload)?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}
