use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{OutageError, OutageResult};
use crate::state::{StateStore, TrackedState};

/// State kept in a small JSON file, replaced via temp file + rename.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> TrackedState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return TrackedState::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read state file, starting fresh");
                return TrackedState::default();
            }
        };

        if content.trim().is_empty() {
            return TrackedState::default();
        }

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file is corrupt, starting fresh");
                TrackedState::default()
            }
        }
    }

    fn save(&mut self, state: &TrackedState) -> OutageResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let content =
            serde_json::to_string(state).map_err(|e| OutageError::Serialization(e.to_string()))?;

        // Flushed to disk before the rename so a power cut can't leave an empty file.
        let temp = self.temp_path();
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::schedule::QueueId;
    use chrono::NaiveDate;

    fn queue() -> QueueId {
        QueueId::new("1").unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStateStore::new(dir.path().join("nested/state.json"));

        let mut state = TrackedState::default();
        state.insert(date(18), fingerprint(&queue(), &["09:00-13:00".parse().unwrap()]));
        state.insert(date(19), fingerprint(&queue(), &[]));
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(dir.path().join("state.json.tmp"), "leftover from a crashed run, much longer than the state").unwrap();
        let mut store = FileStateStore::new(&path);

        let mut state = TrackedState::default();
        state.insert(date(18), fingerprint(&queue(), &[]));
        store.save(&state).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("leftover"));
        assert_eq!(store.load(), state);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"by_day_fingerprint\": {\"2026-10-").unwrap();

        let store = FileStateStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.txt");
        std::fs::write(&path, r#"{"by_day_fingerprint": {"2026-10-18": "abc"}}"#).unwrap();

        let store = FileStateStore::new(&path);
        let state = store.load();
        assert_eq!(state.get(date(18)).map(|f| f.as_str()), Some("abc"));
    }

    #[test]
    fn test_prune_rewrites_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = FileStateStore::new(&path);

        let mut state = TrackedState::default();
        state.insert(date(17), fingerprint(&queue(), &[]));
        state.insert(date(18), fingerprint(&queue(), &[]));
        store.save(&state).unwrap();

        store.prune(&[date(18), date(19)]).unwrap();
        let pruned = store.load();
        assert_eq!(pruned.len(), 1);
        assert!(pruned.get(date(18)).is_some());
    }
}
