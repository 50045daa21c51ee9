//! Incremental sync ledger
//!
//! The ledger maps canonical identities to their last known [`PageState`]
//! and tracks which identities were encountered during the current run. It is
//! persisted as one JSON snapshot:
//!
//! ```json
//! { "entries": { "https://example.com/a": {
//!     "contentHash": "…", "fetchedAt": "2024-03-01T12:00:00Z", "filePath": "…" } } }
//! ```
//!
//! All methods take `&self`; the table is guarded internally so the ledger
//! can be shared across concurrent leaf tasks behind an `Arc`.

use crate::cancel::CancelToken;
use crate::state::{LedgerError, PageState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: BTreeMap<String, PageState>,
}

#[derive(Debug, Default)]
struct Table {
    entries: BTreeMap<String, PageState>,
    seen: HashSet<String>,
}

/// Persistent map of identity to last known page state
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    table: Mutex<Table>,
    save_lock: tokio::sync::Mutex<()>,
}

impl Ledger {
    /// Creates an empty ledger backed by `path` without reading it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(Table::default()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a ledger and loads its snapshot
    pub async fn open(path: impl Into<PathBuf>, cancel: &CancelToken) -> Result<Self, LedgerError> {
        let ledger = Self::new(path);
        ledger.load(cancel).await?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory entries with the snapshot on disk
    ///
    /// A missing file loads as an empty ledger. A file that exists but cannot
    /// be parsed is an error; it is never silently discarded.
    pub async fn load(&self, cancel: &CancelToken) -> Result<(), LedgerError> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No ledger at {}, starting empty", self.path.display());
                self.lock().entries.clear();
                return Ok(());
            }
            Err(source) => {
                return Err(LedgerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: LedgerFile =
            serde_json::from_str(&contents).map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let count = file.entries.len();
        self.lock().entries = file.entries;
        info!("Loaded {} ledger entries from {}", count, self.path.display());
        Ok(())
    }

    /// Writes the snapshot atomically (temp file in the same directory,
    /// fsync, rename over the target)
    ///
    /// Concurrent saves are serialized. Cancellation is honored before the
    /// write starts; a started write always completes.
    pub async fn save(&self, cancel: &CancelToken) -> Result<(), LedgerError> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
            guard = self.save_lock.lock() => guard,
        };
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let snapshot = LedgerFile {
            entries: self.lock().entries.clone(),
        };
        let count = snapshot.entries.len();
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| LedgerError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| LedgerError::Write {
                path: self.path.clone(),
                message: e.to_string(),
            })??;

        debug!("Saved {} ledger entries to {}", count, self.path.display());
        Ok(())
    }

    /// Records the state of a page after a successful fetch and process
    pub fn update(&self, id: &str, state: PageState) {
        self.lock().entries.insert(id.to_string(), state);
    }

    /// Marks an identity as encountered during this run
    ///
    /// Returns true the first time an identity is marked.
    pub fn mark_seen(&self, id: &str) -> bool {
        self.lock().seen.insert(id.to_string())
    }

    /// Returns true if there is no record for `id` or its stored hash differs
    pub fn should_process(&self, id: &str, new_hash: &str) -> bool {
        match self.lock().entries.get(id) {
            Some(state) => !state.matches(new_hash),
            None => true,
        }
    }

    /// Returns a copy of the record for `id`
    pub fn get(&self, id: &str) -> Option<PageState> {
        self.lock().entries.get(id).cloned()
    }

    /// Copies every record, ordered by identity
    pub fn snapshot(&self) -> Vec<(String, PageState)> {
        self.lock()
            .entries
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Number of identities marked seen during this run
    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Identities with a record that were not seen during this run
    pub fn unseen(&self) -> Vec<String> {
        let table = self.lock();
        table
            .entries
            .keys()
            .filter(|id| !table.seen.contains(*id))
            .cloned()
            .collect()
    }

    /// Removes and returns the records not seen during this run
    pub fn prune_unseen(&self) -> Vec<String> {
        let mut table = self.lock();
        let Table { entries, seen } = &mut *table;
        let mut removed = Vec::new();
        entries.retain(|id, _| {
            let keep = seen.contains(id);
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        removed
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let write_err = |message: String| LedgerError::Write {
        path: path.to_path_buf(),
        message,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .map_err(|e| write_err(format!("Failed to create directory: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| write_err(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| write_err(format!("Failed to write temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| write_err(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| write_err(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| write_err(format!("Failed to persist temp file: {e}")))?;

    // Make the rename itself durable
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
