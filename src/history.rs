//! Local, append-only log of finished games.
//!
//! Records are never merged or edited: a finished session appends exactly one, and
//! the only other mutations are deleting a record and clearing the log. The log is
//! not shared with the peer, so both sides may word the same result differently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::GameSettings;
use crate::core::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: String,
    /// Serialized as an RFC 3339 (ISO-8601) UTC timestamp.
    pub date: DateTime<Utc>,
    pub result_text: String,
    pub move_count: usize,
    pub pgn: String,
    pub settings: GameSettings,
}

impl GameRecord {
    pub fn new(
        result_text: impl Into<String>,
        move_count: usize,
        pgn: impl Into<String>,
        settings: GameSettings,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: Utc::now(),
            result_text: result_text.into(),
            move_count,
            pgn: pgn.into(),
            settings,
        }
    }
}

pub trait RecordStore {
    fn append(&mut self, record: GameRecord) -> Result<(), StoreError>;

    /// Newest first.
    fn list(&self) -> Vec<GameRecord>;

    /// Returns whether a record with `id` existed.
    fn delete(&mut self, id: &str) -> Result<bool, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

fn newest_first(records: &[GameRecord]) -> Vec<GameRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
}

/// Keeps records for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Vec<GameRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&mut self, record: GameRecord) -> Result<(), StoreError> {
        self.records.push(record);
        Ok(())
    }

    fn list(&self) -> Vec<GameRecord> {
        newest_first(&self.records)
    }

    fn delete(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        Ok(self.records.len() != before)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        Ok(())
    }
}

/// A JSON array on disk, loaded on open and rewritten in full after every change.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    records: Vec<GameRecord>,
}

impl JsonRecordStore {
    /// Opens the log at `path`. A missing file is an empty log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), count = records.len(), "opened game history");
        Ok(Self { path, records })
    }

    /// `<data dir>/lanchess/games.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("lanchess").join("games.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `records` to disk and only then makes them the in-memory state, so a
    /// failed write leaves the store as it was.
    fn commit(&mut self, records: Vec<GameRecord>) -> Result<(), StoreError> {
        write_atomically(&self.path, &records)?;
        self.records = records;
        Ok(())
    }
}

fn write_atomically(path: &Path, records: &[GameRecord]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

impl RecordStore for JsonRecordStore {
    fn append(&mut self, record: GameRecord) -> Result<(), StoreError> {
        info!(id = %record.id, result = %record.result_text, "saving game record");
        let mut records = self.records.clone();
        records.push(record);
        self.commit(records)
    }

    fn list(&self) -> Vec<GameRecord> {
        newest_first(&self.records)
    }

    fn delete(&mut self, id: &str) -> Result<bool, StoreError> {
        if !self.records.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        let records = self.records.iter().filter(|r| r.id != id).cloned().collect();
        self.commit(records)?;
        Ok(true)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.commit(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::TimeControl;
    use crate::core::game::Side;
    use chrono::Duration;

    fn record(result: &str, age_minutes: i64) -> GameRecord {
        let settings = GameSettings::online(TimeControl::new(1, 0), Side::White, "me", Some("them"));
        let mut r = GameRecord::new(result, 4, "1. f3 e5 2. g4 Qh4# 0-1", settings);
        r.date = Utc::now() - Duration::minutes(age_minutes);
        r
    }

    #[test]
    fn memory_store_lists_newest_first() {
        let mut store = MemoryRecordStore::new();
        store.append(record("old", 30)).unwrap();
        store.append(record("new", 1)).unwrap();
        store.append(record("middle", 10)).unwrap();

        let results: Vec<_> = store.list().into_iter().map(|r| r.result_text).collect();
        assert_eq!(results, ["new", "middle", "old"]);
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("games.json");

        let mut store = JsonRecordStore::open(&path).unwrap();
        assert!(store.list().is_empty());
        let first = record("Checkmate! Black wins!", 5);
        let first_id = first.id.clone();
        store.append(first).unwrap();
        store.append(record("Game drawn!", 1)).unwrap();

        let mut reopened = JsonRecordStore::open(&path).unwrap();
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.list()[0].result_text, "Game drawn!");

        assert!(reopened.delete(&first_id).unwrap());
        assert!(!reopened.delete(&first_id).unwrap());
        assert_eq!(JsonRecordStore::open(&path).unwrap().list().len(), 1);

        reopened.clear().unwrap();
        assert!(JsonRecordStore::open(&path).unwrap().list().is_empty());
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let json = serde_json::to_value(record("Game drawn!", 0)).unwrap();
        assert!(json.get("resultText").is_some());
        assert_eq!(json["moveCount"], 4);
        assert!(json["date"].as_str().unwrap().contains('T'));
        assert_eq!(json["settings"]["mode"], "online");
        assert_eq!(json["settings"]["timeControl"]["whiteSeconds"], 60);
        assert_eq!(json["settings"]["blackName"], "them");
    }

    #[test]
    fn failed_writes_leave_the_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("data");
        let path = parent.join("games.json");

        let mut store = JsonRecordStore::open(&path).unwrap();
        let kept = record("Game drawn!", 5);
        let kept_id = kept.id.clone();
        store.append(kept).unwrap();

        // A plain file where the data directory used to be makes every write fail.
        fs::remove_dir_all(&parent).unwrap();
        fs::write(&parent, "in the way").unwrap();

        assert!(matches!(
            store.append(record("White wins on time!", 1)),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.list()[0].id, kept_id);

        assert!(store.delete(&kept_id).is_err());
        assert_eq!(store.list().len(), 1);

        assert!(store.clear().is_err());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonRecordStore::open(&path),
            Err(StoreError::Serde(_))
        ));
    }
}
