//! Persisted runtime state.
//!
//! Everything the engine learns while running (resolved artifact ids, the
//! commit each file was last imported at, dispatch outcomes per secondary
//! site, timestamps) lives in one JSON document next to the config.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Token,
    Import,
    Cache,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Token => "token",
            ActionKind::Import => "import",
            ActionKind::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// Last dispatch attempt against one secondary site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub action: ActionKind,
    pub result: Outcome,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// slug → id in the local artifact backend.
    #[serde(default)]
    pub artifact_ids: BTreeMap<String, u64>,
    /// filename → commit it was last imported at.
    #[serde(default)]
    pub file_state: BTreeMap<String, String>,
    /// slug → unix time of the last successful import.
    #[serde(default)]
    pub last_imports: BTreeMap<String, i64>,
    #[serde(default)]
    pub secondary_status: BTreeMap<String, SiteStatus>,
    #[serde(default)]
    pub last_export: Option<i64>,
    #[serde(default)]
    pub last_import: Option<i64>,
}

/// File-backed [`State`]. Every mutation is a read-modify-write of the
/// whole document, written atomically.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file is an empty state.
    pub fn load(&self) -> Result<State> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(State::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, state: &State) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(state)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self.load()?;
        let out = f(&mut state);
        self.save(&state)?;
        Ok(out)
    }

    pub fn artifact_id(&self, slug: &str) -> Result<Option<u64>> {
        Ok(self.load()?.artifact_ids.get(slug).copied())
    }

    pub fn set_artifact_id(&self, slug: &str, id: u64) -> Result<()> {
        self.update(|s| {
            s.artifact_ids.insert(slug.to_string(), id);
        })
    }

    pub fn imported_commit(&self, file: &str) -> Result<Option<String>> {
        Ok(self.load()?.file_state.get(file).cloned())
    }

    pub fn mark_file_imported(&self, file: &str, commit: &str) -> Result<()> {
        self.update(|s| {
            s.file_state.insert(file.to_string(), commit.to_string());
        })
    }

    pub fn mark_imported_now(&self, slug: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        self.update(|s| {
            s.last_imports.insert(slug.to_string(), now);
            s.last_import = Some(now);
        })
    }

    pub fn mark_exported_now(&self) -> Result<()> {
        let now = Utc::now().timestamp();
        self.update(|s| s.last_export = Some(now))
    }

    /// Overwrite the status record for `label`. Blank labels are ignored.
    pub fn record_status(
        &self,
        label: &str,
        action: ActionKind,
        result: Outcome,
        message: &str,
    ) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Ok(());
        }
        let status = SiteStatus {
            action,
            result,
            timestamp: Utc::now().timestamp(),
            message: message.to_string(),
        };
        self.update(|s| {
            s.secondary_status.insert(label.to_string(), status);
        })
    }

    /// Drop status records whose label is not in `labels`. Leaves the file
    /// untouched when nothing changes.
    pub fn prune_statuses<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let keep: Vec<&str> = labels.into_iter().map(str::trim).collect();
        let mut state = self.load()?;
        let before = state.secondary_status.len();
        state
            .secondary_status
            .retain(|label, _| keep.contains(&label.as_str()));
        if state.secondary_status.len() != before {
            self.save(&state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_state() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("state.json"));
        assert_eq!(store.load().unwrap(), State::default());
    }

    #[test]
    fn ids_and_file_state_persist() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("nested/state.json"));
        store.set_artifact_id("hero", 7).unwrap();
        store.mark_file_imported("hero.ss3", "c1").unwrap();

        let reopened = StateStore::new(store.path());
        assert_eq!(reopened.artifact_id("hero").unwrap(), Some(7));
        assert_eq!(
            reopened.imported_commit("hero.ss3").unwrap().as_deref(),
            Some("c1")
        );
        assert_eq!(reopened.imported_commit("other.ss3").unwrap(), None);
    }

    #[test]
    fn status_is_overwritten_per_label() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("state.json"));
        store
            .record_status("eu", ActionKind::Token, Outcome::Error, "timeout")
            .unwrap();
        store
            .record_status("eu", ActionKind::Import, Outcome::Success, "Import completed.")
            .unwrap();
        store
            .record_status("  ", ActionKind::Import, Outcome::Success, "ignored")
            .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.secondary_status.len(), 1);
        let eu = &state.secondary_status["eu"];
        assert_eq!(eu.action, ActionKind::Import);
        assert_eq!(eu.result, Outcome::Success);
    }

    #[test]
    fn prune_keeps_only_configured_labels() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("state.json"));
        for label in ["eu", "us", "old"] {
            store
                .record_status(label, ActionKind::Cache, Outcome::Success, "ok")
                .unwrap();
        }
        store.prune_statuses(["eu", "us"]).unwrap();
        let labels: Vec<_> = store
            .load()
            .unwrap()
            .secondary_status
            .into_keys()
            .collect();
        assert_eq!(labels, vec!["eu", "us"]);
    }

    #[test]
    fn import_timestamp_updates_global_too() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("state.json"));
        store.mark_imported_now("hero").unwrap();
        let state = store.load().unwrap();
        assert!(state.last_imports.contains_key("hero"));
        assert_eq!(state.last_import, state.last_imports.get("hero").copied());
    }
}
