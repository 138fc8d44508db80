//! Persisted schedule store.
//!
//! Durable map from experience id to the alert armed for it. Every mutation
//! is written through to disk before returning, so a crash right after arming
//! an alert never loses the record of it. The file is
//! `{"version": 1, "entries": {"<experienceId>": ScheduleEntry}}`, written via
//! a temp file and rename.

use crate::error::{Result, TracksideError};
use crate::experience::ExperienceId;
use crate::notify::capability::NotificationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STORE_VERSION: u8 = 1;

/// The durable link between an experience and its armed alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub experience_id: ExperienceId,
    pub notification_id: NotificationId,
    pub fire_at: DateTime<Utc>,
    /// Display text captured when the alert was armed.
    pub title: String,
    pub body: String,
}

/// How the store came up at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreLoadStatus {
    /// No file existed yet (first run) or the store is not file-backed.
    Fresh,
    /// Entries were loaded from disk.
    Loaded { entries: usize },
    /// The file was unreadable or corrupt; the store started empty.
    Degraded { reason: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "default_store_version")]
    version: u8,
    #[serde(default)]
    entries: BTreeMap<ExperienceId, ScheduleEntry>,
}

fn default_store_version() -> u8 {
    STORE_VERSION
}

/// Durable experience-id → [`ScheduleEntry`] map.
#[derive(Debug)]
pub struct ScheduleStore {
    path: Option<PathBuf>,
    entries: BTreeMap<ExperienceId, ScheduleEntry>,
    load_status: StoreLoadStatus,
}

impl ScheduleStore {
    /// Open the store at `path`.
    ///
    /// Never fails: an unreadable or corrupt file degrades to an empty store
    /// and is reported through [`ScheduleStore::load_status`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (entries, load_status) = match read_store_file(&path) {
            Ok(Some(entries)) => {
                debug!(
                    "loaded {} schedule entries from {}",
                    entries.len(),
                    path.display()
                );
                let count = entries.len();
                (entries, StoreLoadStatus::Loaded { entries: count })
            }
            Ok(None) => (BTreeMap::new(), StoreLoadStatus::Fresh),
            Err(e) => {
                warn!(
                    "schedule store at {} is unusable, starting empty: {e}",
                    path.display()
                );
                (
                    BTreeMap::new(),
                    StoreLoadStatus::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        };

        Self {
            path: Some(path),
            entries,
            load_status,
        }
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            load_status: StoreLoadStatus::Fresh,
        }
    }

    /// Full current state.
    pub fn get(&self) -> &BTreeMap<ExperienceId, ScheduleEntry> {
        &self.entries
    }

    /// Entry for one experience.
    pub fn entry(&self, experience_id: &ExperienceId) -> Option<&ScheduleEntry> {
        self.entries.get(experience_id)
    }

    /// Upsert by experience id and persist.
    ///
    /// The in-memory map keeps the entry even if the write fails, since the
    /// alert it describes is already armed.
    pub fn put(&mut self, entry: ScheduleEntry) -> Result<()> {
        self.entries.insert(entry.experience_id.clone(), entry);
        self.persist()
    }

    /// Delete an entry and persist. Returns the removed entry, if any.
    pub fn remove(&mut self, experience_id: &ExperienceId) -> Result<Option<ScheduleEntry>> {
        let removed = self.entries.remove(experience_id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn load_status(&self) -> &StoreLoadStatus {
        &self.load_status
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_store_file(path, &self.entries)
    }
}

fn read_store_file(path: &Path) -> Result<Option<BTreeMap<ExperienceId, ScheduleEntry>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TracksideError::Storage(format!(
                "cannot read schedule store: {e}"
            )));
        }
    };

    let file: StoreFile = serde_json::from_slice(&bytes)
        .map_err(|e| TracksideError::Storage(format!("cannot parse schedule store: {e}")))?;

    if file.version != STORE_VERSION {
        return Err(TracksideError::Storage(format!(
            "unsupported schedule store version {}",
            file.version
        )));
    }

    // Keys are authoritative; an entry whose embedded id disagrees is corrupt.
    if let Some((key, _)) = file
        .entries
        .iter()
        .find(|(key, entry)| **key != entry.experience_id)
    {
        return Err(TracksideError::Storage(format!(
            "schedule store key {key} does not match its entry"
        )));
    }

    Ok(Some(file.entries))
}

fn write_store_file(path: &Path, entries: &BTreeMap<ExperienceId, ScheduleEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TracksideError::Storage(format!("cannot create schedule store directory: {e}"))
        })?;
    }

    let file = StoreFile {
        version: STORE_VERSION,
        entries: entries.clone(),
    };
    let json = serde_json::to_vec_pretty(&file)
        .map_err(|e| TracksideError::Storage(format!("cannot serialize schedule store: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json).map_err(|e| {
        TracksideError::Storage(format!("cannot write schedule store temp file: {e}"))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        TracksideError::Storage(format!("cannot finalize schedule store file: {e}"))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    fn entry(id: u64) -> ScheduleEntry {
        ScheduleEntry {
            experience_id: ExperienceId::from(id),
            notification_id: NotificationId::new(format!("n-{id}")),
            fire_at: Utc.with_ymd_and_hms(2026, 5, 24, 13, 59, 0).unwrap(),
            title: format!("Experience {id}"),
            body: "Meet at Gate 4.".to_owned(),
        }
    }

    #[test]
    fn missing_file_is_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScheduleStore::open(dir.path().join("schedule.json"));
        assert_eq!(store.load_status(), &StoreLoadStatus::Fresh);
        assert!(store.get().is_empty());
    }

    #[test]
    fn put_persists_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("schedule.json");

        let mut store = ScheduleStore::open(&path);
        store.put(entry(1)).unwrap();
        store.put(entry(2)).unwrap();
        drop(store);

        let reopened = ScheduleStore::open(&path);
        assert_eq!(
            reopened.load_status(),
            &StoreLoadStatus::Loaded { entries: 2 }
        );
        assert_eq!(reopened.entry(&ExperienceId::from(1)), Some(&entry(1)));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn put_is_an_upsert() {
        let mut store = ScheduleStore::in_memory();
        store.put(entry(1)).unwrap();
        let mut replacement = entry(1);
        replacement.notification_id = NotificationId::new("n-replaced");
        store.put(replacement.clone()).unwrap();

        assert_eq!(store.get().len(), 1);
        assert_eq!(store.entry(&ExperienceId::from(1)), Some(&replacement));
    }

    #[test]
    fn remove_persists_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");

        let mut store = ScheduleStore::open(&path);
        store.put(entry(1)).unwrap();
        let removed = store.remove(&ExperienceId::from(1)).unwrap();
        assert_eq!(removed, Some(entry(1)));
        assert_eq!(store.remove(&ExperienceId::from(1)).unwrap(), None);

        let reopened = ScheduleStore::open(&path);
        assert!(reopened.get().is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = ScheduleStore::open(&path);
        assert!(store.get().is_empty());
        assert!(matches!(
            store.load_status(),
            StoreLoadStatus::Degraded { .. }
        ));
    }

    #[test]
    fn mismatched_key_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        let mut entries = BTreeMap::new();
        entries.insert(ExperienceId::from(9), entry(1));
        write_store_file(&path, &entries).unwrap();

        let store = ScheduleStore::open(&path);
        assert!(matches!(
            store.load_status(),
            StoreLoadStatus::Degraded { reason } if reason.contains("does not match")
        ));
    }

    #[test]
    fn file_layout_uses_camel_case_and_iso_timestamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        let mut store = ScheduleStore::open(&path);
        store.put(entry(42)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        let stored = &raw["entries"]["42"];
        assert_eq!(stored["experienceId"], "42");
        assert_eq!(stored["notificationId"], "n-42");
        assert_eq!(stored["fireAt"], "2026-05-24T13:59:00Z");
    }
}
