use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::matrix_helpers::current_unix_timestamp_ms;

pub(super) const MATRIX_SYNC_STATE_SCHEMA_VERSION: u32 = 1;
pub(super) const MATRIX_SYNC_STATE_FILE: &str = "sync-state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MatrixSyncState {
    schema_version: u32,
    #[serde(default)]
    next_batch: Option<String>,
}

impl Default for MatrixSyncState {
    fn default() -> Self {
        Self {
            schema_version: MATRIX_SYNC_STATE_SCHEMA_VERSION,
            next_batch: None,
        }
    }
}

/// Persists the sync position so restarts resume where the bot left off.
pub(super) struct MatrixSyncStateStore {
    path: PathBuf,
    state: MatrixSyncState,
}

impl MatrixSyncStateStore {
    pub(super) fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str::<MatrixSyncState>(&raw).with_context(|| {
                format!("failed to parse matrix sync state file {}", path.display())
            })?
        } else {
            MatrixSyncState::default()
        };

        if state.schema_version != MATRIX_SYNC_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported matrix sync state schema: expected {}, found {}",
                MATRIX_SYNC_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }
        Ok(Self { path, state })
    }

    pub(super) fn next_batch(&self) -> Option<&str> {
        self.state.next_batch.as_deref()
    }

    /// Returns `false` when the token is unchanged.
    pub(super) fn update_next_batch(&mut self, next_batch: &str) -> bool {
        if self.state.next_batch.as_deref() == Some(next_batch) {
            return false;
        }
        self.state.next_batch = Some(next_batch.to_string());
        true
    }

    pub(super) fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.state).context("failed to serialize state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write state file {}", self.path.display()))
    }
}

/// Writes through a sibling temp file and renames it over `path`.
pub(super) fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(MATRIX_SYNC_STATE_FILE),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn functional_state_store_round_trips_next_batch() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join(MATRIX_SYNC_STATE_FILE);

        let mut store = MatrixSyncStateStore::load(path.clone()).expect("load empty");
        assert_eq!(store.next_batch(), None);
        assert!(store.update_next_batch("s72594_4483_1934"));
        assert!(!store.update_next_batch("s72594_4483_1934"));
        store.save().expect("save");

        let reloaded = MatrixSyncStateStore::load(path.clone()).expect("reload");
        assert_eq!(reloaded.next_batch(), Some("s72594_4483_1934"));
        let raw = std::fs::read_to_string(&path).expect("read state");
        assert!(raw.contains("\"schema_version\": 1"));
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn regression_state_store_rejects_unknown_schema_version() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(MATRIX_SYNC_STATE_FILE);
        std::fs::write(&path, r#"{"schema_version": 9, "next_batch": "x"}"#).expect("seed");

        let error = match MatrixSyncStateStore::load(path) {
            Ok(_) => panic!("schema 9 should be rejected"),
            Err(error) => error,
        };
        assert!(error.to_string().contains("unsupported matrix sync state schema"));
    }

    #[test]
    fn regression_write_text_atomic_leaves_no_temp_files() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        write_text_atomic(&path, "one\n").expect("first write");
        write_text_atomic(&path, "two\n").expect("second write");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "two\n");
        let leftovers = std::fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_destination() {
        let temp = tempdir().expect("tempdir");
        let error = write_text_atomic(temp.path(), "x").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }
}
