//! Key/value storage for training records.
//!
//! Records are opaque byte blobs keyed by session, type and worker identifiers.
//! Three kinds exist:
//!
//! - **Storage metadata:** one blob per `(session, type)`, describing how the
//!   records of that type are encoded
//! - **Static info:** one blob per `(session, type, worker)`, e.g. the config
//! - **Updates:** a time series per `(session, type, worker)`, keyed additionally
//!   by a millisecond timestamp, e.g. parameter snapshots
//!
//! Writing to an existing key replaces the previous blob. Two backends are
//! provided: [`InMemoryStatsStorage`] for a single process and
//! [`FileStatsStorage`], which keeps the same tables in a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::{RbmError, RbmResult};

/// Identifies one stream of records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub session_id: String,
    pub type_id: String,
    pub worker_id: String,
}

impl StorageKey {
    pub fn new(session_id: &str, type_id: &str, worker_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            type_id: type_id.to_string(),
            worker_id: worker_id.to_string(),
        }
    }
}

/// One update as returned by the cross-worker queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub worker_id: String,
    pub timestamp: u64,
    pub bytes: Vec<u8>,
}

/// Storage backend for metadata, static info and timestamped updates.
pub trait StatsStorage: Send + Sync {
    fn put_storage_metadata(&self, session_id: &str, type_id: &str, bytes: Vec<u8>) -> RbmResult<()>;

    fn get_storage_metadata(&self, session_id: &str, type_id: &str) -> RbmResult<Option<Vec<u8>>>;

    fn put_static_info(&self, key: &StorageKey, bytes: Vec<u8>) -> RbmResult<()>;

    fn get_static_info(&self, key: &StorageKey) -> RbmResult<Option<Vec<u8>>>;

    /// Static info of every worker for `(session, type)` as `(worker_id, bytes)`,
    /// sorted by worker.
    fn all_static_infos(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<(String, Vec<u8>)>>;

    fn put_update(&self, key: &StorageKey, timestamp: u64, bytes: Vec<u8>) -> RbmResult<()>;

    /// Sessions with at least one static info or update record, sorted.
    fn list_session_ids(&self) -> RbmResult<Vec<String>>;

    fn session_exists(&self, session_id: &str) -> RbmResult<bool> {
        Ok(self
            .list_session_ids()?
            .iter()
            .any(|s| s == session_id))
    }

    fn list_type_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>>;

    fn list_worker_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>>;

    fn list_worker_ids_for_session_and_type(
        &self,
        session_id: &str,
        type_id: &str,
    ) -> RbmResult<Vec<String>>;

    fn num_update_records(&self, key: &StorageKey) -> RbmResult<usize>;

    /// Update records of a session across all types and workers.
    fn num_update_records_for_session(&self, session_id: &str) -> RbmResult<usize>;

    /// Most recent update as `(timestamp, bytes)`.
    fn latest_update(&self, key: &StorageKey) -> RbmResult<Option<(u64, Vec<u8>)>>;

    /// Most recent update of each worker for `(session, type)`, sorted by worker.
    fn latest_update_all_workers(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<UpdateRecord>>;

    fn update_at(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Option<Vec<u8>>>;

    /// Updates with a timestamp strictly greater than `timestamp`, oldest first.
    fn updates_after(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Vec<(u64, Vec<u8>)>>;

    /// Updates of every worker for `(session, type)` with a timestamp strictly
    /// greater than `timestamp`, ordered by timestamp then worker.
    fn updates_after_all_workers(
        &self,
        session_id: &str,
        type_id: &str,
        timestamp: u64,
    ) -> RbmResult<Vec<UpdateRecord>>;
}

// ============================================================================
// Tables shared by both backends
// ============================================================================

#[derive(Debug, Default, Clone)]
struct Tables {
    metadata: BTreeMap<(String, String), Vec<u8>>,
    static_info: BTreeMap<StorageKey, Vec<u8>>,
    updates: BTreeMap<(StorageKey, u64), Vec<u8>>,
}

impl Tables {
    fn keys_for_session<'a>(&'a self, session_id: &'a str) -> impl Iterator<Item = &'a StorageKey> + 'a {
        self.static_info
            .keys()
            .chain(self.updates.keys().map(|(key, _)| key))
            .filter(move |key| key.session_id == session_id)
    }

    /// Updates of one `(session, type)` in key order: worker, then timestamp.
    fn updates_for_type<'a>(
        &'a self,
        session_id: &'a str,
        type_id: &'a str,
    ) -> impl Iterator<Item = (&'a StorageKey, u64, &'a Vec<u8>)> + 'a {
        let start = (StorageKey::new(session_id, type_id, ""), 0);
        self.updates
            .range(start..)
            .take_while(move |((key, _), _)| key.session_id == session_id && key.type_id == type_id)
            .map(|((key, ts), bytes)| (key, *ts, bytes))
    }

    fn series<'a>(&'a self, key: &StorageKey) -> impl DoubleEndedIterator<Item = (u64, &'a Vec<u8>)> + 'a {
        self.updates
            .range((key.clone(), 0)..=(key.clone(), u64::MAX))
            .map(|((_, ts), bytes)| (*ts, bytes))
    }

    fn sessions(&self) -> Vec<String> {
        let sessions: BTreeSet<String> = self
            .static_info
            .keys()
            .chain(self.updates.keys().map(|(key, _)| key))
            .map(|key| key.session_id.clone())
            .collect();
        sessions.into_iter().collect()
    }

    fn to_file(&self) -> TablesFile {
        TablesFile {
            metadata: self
                .metadata
                .iter()
                .map(|((session_id, type_id), bytes)| MetadataRow {
                    session_id: session_id.clone(),
                    type_id: type_id.clone(),
                    bytes: bytes.clone(),
                })
                .collect(),
            static_info: self
                .static_info
                .iter()
                .map(|(key, bytes)| StaticRow {
                    key: key.clone(),
                    bytes: bytes.clone(),
                })
                .collect(),
            updates: self
                .updates
                .iter()
                .map(|((key, timestamp), bytes)| UpdateRow {
                    key: key.clone(),
                    timestamp: *timestamp,
                    bytes: bytes.clone(),
                })
                .collect(),
        }
    }

    fn from_file(file: TablesFile) -> Self {
        Self {
            metadata: file
                .metadata
                .into_iter()
                .map(|row| ((row.session_id, row.type_id), row.bytes))
                .collect(),
            static_info: file
                .static_info
                .into_iter()
                .map(|row| (row.key, row.bytes))
                .collect(),
            updates: file
                .updates
                .into_iter()
                .map(|row| ((row.key, row.timestamp), row.bytes))
                .collect(),
        }
    }
}

/// On-disk layout of [`FileStatsStorage`]: one row list per table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TablesFile {
    metadata: Vec<MetadataRow>,
    static_info: Vec<StaticRow>,
    updates: Vec<UpdateRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataRow {
    session_id: String,
    type_id: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StaticRow {
    key: StorageKey,
    bytes: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateRow {
    key: StorageKey,
    timestamp: u64,
    bytes: Vec<u8>,
}

fn poisoned<T>(_: T) -> RbmError {
    RbmError::Storage("storage lock poisoned".to_string())
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local [`StatsStorage`] backed by ordered maps.
#[derive(Debug, Default)]
pub struct InMemoryStatsStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStatsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RbmResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(poisoned)
    }

    fn write(&self) -> RbmResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(poisoned)
    }
}

impl StatsStorage for InMemoryStatsStorage {
    fn put_storage_metadata(&self, session_id: &str, type_id: &str, bytes: Vec<u8>) -> RbmResult<()> {
        self.write()?
            .metadata
            .insert((session_id.to_string(), type_id.to_string()), bytes);
        Ok(())
    }

    fn get_storage_metadata(&self, session_id: &str, type_id: &str) -> RbmResult<Option<Vec<u8>>> {
        Ok(self
            .read()?
            .metadata
            .get(&(session_id.to_string(), type_id.to_string()))
            .cloned())
    }

    fn put_static_info(&self, key: &StorageKey, bytes: Vec<u8>) -> RbmResult<()> {
        self.write()?.static_info.insert(key.clone(), bytes);
        Ok(())
    }

    fn get_static_info(&self, key: &StorageKey) -> RbmResult<Option<Vec<u8>>> {
        Ok(self.read()?.static_info.get(key).cloned())
    }

    fn all_static_infos(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .read()?
            .static_info
            .iter()
            .filter(|(key, _)| key.session_id == session_id && key.type_id == type_id)
            .map(|(key, bytes)| (key.worker_id.clone(), bytes.clone()))
            .collect())
    }

    fn put_update(&self, key: &StorageKey, timestamp: u64, bytes: Vec<u8>) -> RbmResult<()> {
        self.write()?.updates.insert((key.clone(), timestamp), bytes);
        Ok(())
    }

    fn list_session_ids(&self) -> RbmResult<Vec<String>> {
        Ok(self.read()?.sessions())
    }

    fn list_type_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>> {
        let tables = self.read()?;
        let types: BTreeSet<String> = tables
            .keys_for_session(session_id)
            .map(|key| key.type_id.clone())
            .collect();
        Ok(types.into_iter().collect())
    }

    fn list_worker_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>> {
        let tables = self.read()?;
        let workers: BTreeSet<String> = tables
            .keys_for_session(session_id)
            .map(|key| key.worker_id.clone())
            .collect();
        Ok(workers.into_iter().collect())
    }

    fn list_worker_ids_for_session_and_type(
        &self,
        session_id: &str,
        type_id: &str,
    ) -> RbmResult<Vec<String>> {
        let tables = self.read()?;
        let workers: BTreeSet<String> = tables
            .keys_for_session(session_id)
            .filter(|key| key.type_id == type_id)
            .map(|key| key.worker_id.clone())
            .collect();
        Ok(workers.into_iter().collect())
    }

    fn num_update_records(&self, key: &StorageKey) -> RbmResult<usize> {
        Ok(self.read()?.series(key).count())
    }

    fn num_update_records_for_session(&self, session_id: &str) -> RbmResult<usize> {
        Ok(self
            .read()?
            .updates
            .keys()
            .filter(|(key, _)| key.session_id == session_id)
            .count())
    }

    fn latest_update(&self, key: &StorageKey) -> RbmResult<Option<(u64, Vec<u8>)>> {
        Ok(self
            .read()?
            .series(key)
            .next_back()
            .map(|(ts, bytes)| (ts, bytes.clone())))
    }

    fn latest_update_all_workers(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<UpdateRecord>> {
        let tables = self.read()?;
        // Key order is worker then timestamp, so the last entry per worker wins.
        let mut latest: BTreeMap<&str, (u64, &Vec<u8>)> = BTreeMap::new();
        for (key, ts, bytes) in tables.updates_for_type(session_id, type_id) {
            latest.insert(key.worker_id.as_str(), (ts, bytes));
        }
        Ok(latest
            .into_iter()
            .map(|(worker_id, (timestamp, bytes))| UpdateRecord {
                worker_id: worker_id.to_string(),
                timestamp,
                bytes: bytes.clone(),
            })
            .collect())
    }

    fn update_at(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Option<Vec<u8>>> {
        Ok(self.read()?.updates.get(&(key.clone(), timestamp)).cloned())
    }

    fn updates_after(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Vec<(u64, Vec<u8>)>> {
        Ok(self
            .read()?
            .series(key)
            .filter(|(ts, _)| *ts > timestamp)
            .map(|(ts, bytes)| (ts, bytes.clone()))
            .collect())
    }

    fn updates_after_all_workers(
        &self,
        session_id: &str,
        type_id: &str,
        timestamp: u64,
    ) -> RbmResult<Vec<UpdateRecord>> {
        let tables = self.read()?;
        let mut records: Vec<UpdateRecord> = tables
            .updates_for_type(session_id, type_id)
            .filter(|(_, ts, _)| *ts > timestamp)
            .map(|(key, ts, bytes)| UpdateRecord {
                worker_id: key.worker_id.clone(),
                timestamp: ts,
                bytes: bytes.clone(),
            })
            .collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.worker_id.cmp(&b.worker_id))
        });
        Ok(records)
    }
}

// ============================================================================
// File-backed backend
// ============================================================================

/// [`StatsStorage`] persisted as a single JSON file.
///
/// Reads are served from memory. Every write rewrites the file through a
/// temporary sibling and a rename; if that fails the write is rejected and the
/// in-memory tables are left as they were.
#[derive(Debug)]
pub struct FileStatsStorage {
    path: PathBuf,
    inner: InMemoryStatsStorage,
}

impl FileStatsStorage {
    /// Open `path`, loading existing records, or start empty if it does not exist.
    ///
    /// # Errors
    /// - `Io` if the file exists but cannot be read
    /// - `Serialization` if its contents are not a storage file
    pub fn open<P: AsRef<Path>>(path: P) -> RbmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let file: TablesFile = serde_json::from_slice(&fs::read(&path)?)?;
            Tables::from_file(file)
        } else {
            Tables::default()
        };
        tracing::debug!(path = %path.display(), "opened stats storage file");
        Ok(Self {
            path,
            inner: InMemoryStatsStorage {
                tables: RwLock::new(tables),
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tables: &Tables) -> RbmResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec(&tables.to_file())?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to a copy of the tables, persist it, then publish it.
    fn mutate<F: FnOnce(&mut Tables)>(&self, change: F) -> RbmResult<()> {
        let mut tables = self.inner.write()?;
        let mut next = tables.clone();
        change(&mut next);
        self.persist(&next)?;
        *tables = next;
        Ok(())
    }
}

impl StatsStorage for FileStatsStorage {
    fn put_storage_metadata(&self, session_id: &str, type_id: &str, bytes: Vec<u8>) -> RbmResult<()> {
        let key = (session_id.to_string(), type_id.to_string());
        self.mutate(|tables| {
            tables.metadata.insert(key, bytes);
        })
    }

    fn get_storage_metadata(&self, session_id: &str, type_id: &str) -> RbmResult<Option<Vec<u8>>> {
        self.inner.get_storage_metadata(session_id, type_id)
    }

    fn put_static_info(&self, key: &StorageKey, bytes: Vec<u8>) -> RbmResult<()> {
        self.mutate(|tables| {
            tables.static_info.insert(key.clone(), bytes);
        })
    }

    fn get_static_info(&self, key: &StorageKey) -> RbmResult<Option<Vec<u8>>> {
        self.inner.get_static_info(key)
    }

    fn all_static_infos(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<(String, Vec<u8>)>> {
        self.inner.all_static_infos(session_id, type_id)
    }

    fn put_update(&self, key: &StorageKey, timestamp: u64, bytes: Vec<u8>) -> RbmResult<()> {
        self.mutate(|tables| {
            tables.updates.insert((key.clone(), timestamp), bytes);
        })
    }

    fn list_session_ids(&self) -> RbmResult<Vec<String>> {
        self.inner.list_session_ids()
    }

    fn list_type_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>> {
        self.inner.list_type_ids_for_session(session_id)
    }

    fn list_worker_ids_for_session(&self, session_id: &str) -> RbmResult<Vec<String>> {
        self.inner.list_worker_ids_for_session(session_id)
    }

    fn list_worker_ids_for_session_and_type(
        &self,
        session_id: &str,
        type_id: &str,
    ) -> RbmResult<Vec<String>> {
        self.inner
            .list_worker_ids_for_session_and_type(session_id, type_id)
    }

    fn num_update_records(&self, key: &StorageKey) -> RbmResult<usize> {
        self.inner.num_update_records(key)
    }

    fn num_update_records_for_session(&self, session_id: &str) -> RbmResult<usize> {
        self.inner.num_update_records_for_session(session_id)
    }

    fn latest_update(&self, key: &StorageKey) -> RbmResult<Option<(u64, Vec<u8>)>> {
        self.inner.latest_update(key)
    }

    fn latest_update_all_workers(&self, session_id: &str, type_id: &str) -> RbmResult<Vec<UpdateRecord>> {
        self.inner.latest_update_all_workers(session_id, type_id)
    }

    fn update_at(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Option<Vec<u8>>> {
        self.inner.update_at(key, timestamp)
    }

    fn updates_after(&self, key: &StorageKey, timestamp: u64) -> RbmResult<Vec<(u64, Vec<u8>)>> {
        self.inner.updates_after(key, timestamp)
    }

    fn updates_after_all_workers(
        &self,
        session_id: &str,
        type_id: &str,
        timestamp: u64,
    ) -> RbmResult<Vec<UpdateRecord>> {
        self.inner
            .updates_after_all_workers(session_id, type_id, timestamp)
    }
}
