use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, io::Write, path::Path};
use tracing::{debug, error, info, warn};

/// Worker state persisted to disk, one file per deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    /// Last day end this worker finalized
    pub last_finalized_ts: Option<i64>,
    /// Day end the earning cache was last synced to
    #[serde(default)]
    pub last_synced_ts: Option<i64>,
    /// Last time the worker checked the ledger
    pub last_check_time: DateTime<Utc>,
    /// Last time a day was successfully finalized
    pub last_success_time: Option<DateTime<Utc>>,
    /// Number of consecutive failures
    pub consecutive_failures: u32,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            last_finalized_ts: None,
            last_synced_ts: None,
            last_check_time: Utc::now(),
            last_success_time: None,
            consecutive_failures: 0,
        }
    }
}

impl WorkerState {
    /// Load state from file, or create new if doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading worker state from {:?}", path);
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {path:?}"))?;

            match serde_json::from_str::<WorkerState>(&contents) {
                Ok(state) => {
                    info!(
                        "Loaded worker state: last_finalized_ts={:?}, last_check={:?}",
                        state.last_finalized_ts, state.last_check_time
                    );
                    Ok(state)
                }
                Err(e) => {
                    // Keep the unreadable file around for inspection
                    let backup_path = path.with_extension("state.backup");
                    warn!(
                        "State file corrupted: {}. Creating backup at {:?} and starting fresh",
                        e, backup_path
                    );

                    if let Err(backup_err) = fs::copy(path, &backup_path) {
                        warn!("Failed to backup corrupted state file: {}", backup_err);
                    }

                    Ok(Self::default())
                }
            }
        } else {
            debug!("No existing worker state found at {:?}, creating new", path);
            Ok(Self::default())
        }
    }

    /// Save state to file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize worker state")?;

        let temp_path = path.with_extension("state.tmp");
        {
            let mut temp_file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {temp_path:?}"))?;

            temp_file
                .write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to temp file: {temp_path:?}"))?;

            temp_file
                .sync_all()
                .with_context(|| format!("Failed to sync temp file: {temp_path:?}"))?;
        }

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {temp_path:?} to {path:?}"))?;

        debug!("Saved worker state atomically to {:?}", path);
        Ok(())
    }

    /// Update state after a day was finalized
    pub fn mark_success(&mut self, finalized_ts: i64) {
        self.last_finalized_ts = Some(finalized_ts);
        self.last_success_time = Some(Utc::now());
        self.consecutive_failures = 0;
        info!("Marked day ending {} as finalized", finalized_ts);
    }

    /// Update state after the earning cache caught up
    pub fn mark_synced(&mut self, synced_ts: i64) {
        self.last_synced_ts = Some(synced_ts);
        self.consecutive_failures = 0;
    }

    /// Update state after check (regardless of outcome)
    pub fn mark_check(&mut self) {
        self.last_check_time = Utc::now();
    }

    /// Update state after failure
    pub fn mark_failure(&mut self) {
        self.consecutive_failures += 1;
        error!(
            "Marked failure, consecutive failures: {}",
            self.consecutive_failures
        );
    }

    /// Check if we're in a failure state that should halt processing
    pub fn is_in_failure_state(&self, max_failures: u32) -> bool {
        self.consecutive_failures >= max_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let state = WorkerState::load_or_default(&dir.path().join("bsc.btc.json")).unwrap();
        assert_eq!(state.last_finalized_ts, None);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bsc.btc.json");

        let mut state = WorkerState::default();
        state.mark_success(1_643_846_400);
        state.mark_synced(1_643_846_400);
        state.save(&path).unwrap();

        assert!(!path.with_extension("state.tmp").exists());
        let loaded = WorkerState::load_or_default(&path).unwrap();
        assert_eq!(loaded.last_finalized_ts, Some(1_643_846_400));
        assert_eq!(loaded.last_synced_ts, Some(1_643_846_400));
        assert!(loaded.last_success_time.is_some());
    }

    #[test]
    fn test_corrupted_file_is_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bsc.btc.json");
        fs::write(&path, "{not json").unwrap();

        let state = WorkerState::load_or_default(&path).unwrap();
        assert_eq!(state.last_finalized_ts, None);
        assert_eq!(
            fs::read_to_string(path.with_extension("state.backup")).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn test_failure_state() {
        let mut state = WorkerState::default();
        state.mark_failure();
        state.mark_failure();
        assert!(!state.is_in_failure_state(3));
        state.mark_failure();
        assert!(state.is_in_failure_state(3));

        state.mark_success(86_400);
        assert_eq!(state.consecutive_failures, 0);
    }
}
