use crate::common::error::PersistError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One entry in the replicated log. Indexes are dense and assigned by the
/// leader at append time (spec.md §3, LR `LogEntry`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: i64,
    pub index: i64,
    pub command: Vec<u8>,
}

/// A key-addressable byte-blob store, one blob per peer, per spec.md §2's
/// "Persistence adapter". LR only ever persists its log; BFT's blockchain
/// is kept in memory (spec.md §2).
pub trait LogStore: Send + Sync {
    fn load(&self) -> Result<Vec<LogEntry>, PersistError>;
    fn save(&self, entries: &[LogEntry]) -> Result<(), PersistError>;
}

/// Writes the whole log to `logs/storage_<id>.json` on every save, matching
/// the Go source's `save()`/`load()` pair byte-for-byte: a flat JSON array,
/// rewritten wholesale rather than appended to, with the directory created
/// if missing.
pub struct JsonFileLogStore {
    path: PathBuf,
}

impl JsonFileLogStore {
    pub fn new<P: AsRef<Path>>(dir: P, peer_id: i64) -> Self {
        JsonFileLogStore {
            path: dir.as_ref().join(format!("storage_{}.json", peer_id)),
        }
    }
}

impl LogStore for JsonFileLogStore {
    fn load(&self) -> Result<Vec<LogEntry>, PersistError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PersistError::Deserialize(self.path.display().to_string(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PersistError::Read(self.path.display().to_string(), e)),
        }
    }

    fn save(&self, entries: &[LogEntry]) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PersistError::CreateDir(parent.display().to_string(), e))?;
        }
        let body = serde_json::to_vec(entries).map_err(PersistError::Serialize)?;
        // Write-to-temp-then-rename so a save that's interrupted mid-write
        // never leaves `storage_<id>.json` holding a half-written blob.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &body)
            .map_err(|e| PersistError::Write(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| PersistError::Write(self.path.display().to_string(), e))
    }
}

/// In-memory log store for tests: no filesystem I/O, never fails.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn load(&self) -> Result<Vec<LogEntry>, PersistError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    fn save(&self, entries: &[LogEntry]) -> Result<(), PersistError> {
        *self.entries.lock().unwrap() = entries.to_vec();
        Ok(())
    }
}
