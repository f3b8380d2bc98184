//! Tag Registry
//!
//! The persistent uid → binding table. Reads go to the in-memory map;
//! every mutation is written through to a [`SnapshotStore`] before the call
//! returns, and rolled back in memory if the write fails.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tapdeck_common::{
    ActionKind, Binding, BindingRecord, RegistryError, Result, TagUid,
};
use tracing::{debug, info, instrument, warn};

/// Durable storage for the binding table
pub trait SnapshotStore: Send + Sync {
    /// Read the stored records, `None` when nothing has been stored yet
    fn load(&self) -> std::result::Result<Option<Vec<BindingRecord>>, RegistryError>;

    /// Replace the stored records atomically
    fn save(&self, records: &[BindingRecord]) -> std::result::Result<(), RegistryError>;

    /// Where the snapshot lives, for messages
    fn location(&self) -> String;
}

/// Decode a snapshot file
///
/// The current layout is a list of records. Earlier versions wrote an object
/// keyed by uid whose entries may omit their own uid.
fn parse_snapshot(contents: &str) -> std::result::Result<Vec<BindingRecord>, String> {
    let value: Value =
        serde_json::from_str(contents).map_err(|e| format!("not valid JSON: {e}"))?;

    match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| format!("not a binding list: {e}"))
        }
        Value::Object(_) => {
            let keyed: BTreeMap<String, BindingRecord> = serde_json::from_value(value)
                .map_err(|e| format!("not a keyed binding table: {e}"))?;
            Ok(keyed
                .into_iter()
                .map(|(key, mut record)| {
                    if record.uid.trim().is_empty() {
                        record.uid = key;
                    }
                    record
                })
                .collect())
        }
        _ => Err("expected a list of bindings or an object keyed by uid".to_string()),
    }
}

/// Pretty-printed JSON file, replaced via temp file + rename
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn load(&self) -> std::result::Result<Option<Vec<BindingRecord>>, RegistryError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RegistryError::fatal_load(self.location(), e)),
        };

        parse_snapshot(&contents)
            .map(Some)
            .map_err(|reason| RegistryError::fatal_load(self.location(), reason))
    }

    fn save(&self, records: &[BindingRecord]) -> std::result::Result<(), RegistryError> {
        let fail = |e: &dyn std::fmt::Display| RegistryError::persistence(self.location(), e);

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| fail(&e))?;

        let mut json = serde_json::to_vec_pretty(records).map_err(|e| fail(&e))?;
        json.push(b'\n');

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| fail(&e))?;
        temp.write_all(&json).map_err(|e| fail(&e))?;
        temp.as_file().sync_all().map_err(|e| fail(&e))?;
        temp.persist(&self.path).map_err(|e| fail(&e.error))?;

        debug!(path = %self.path.display(), entries = records.len(), "Wrote registry snapshot");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Snapshot kept in memory, for tests and ephemeral setups
#[derive(Clone, Default)]
pub struct MemorySnapshot {
    records: Arc<Mutex<Option<Vec<BindingRecord>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail with a persistence error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Records from the last successful save
    pub fn records(&self) -> Option<Vec<BindingRecord>> {
        self.records.lock().clone()
    }
}

impl SnapshotStore for MemorySnapshot {
    fn load(&self) -> std::result::Result<Option<Vec<BindingRecord>>, RegistryError> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, records: &[BindingRecord]) -> std::result::Result<(), RegistryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RegistryError::persistence("memory", "write rejected"));
        }
        *self.records.lock() = Some(records.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Keyed, write-through binding table
pub struct Registry {
    bindings: RwLock<HashMap<TagUid, Binding>>,
    store: Box<dyn SnapshotStore>,
}

impl Registry {
    /// Open a registry and load its snapshot
    ///
    /// A missing snapshot yields an empty registry. Any unreadable,
    /// unknown-kind or invalid entry fails the whole load.
    pub fn open(store: impl SnapshotStore + 'static) -> std::result::Result<Self, RegistryError> {
        let registry = Self {
            bindings: RwLock::new(HashMap::new()),
            store: Box::new(store),
        };
        registry.load()?;
        Ok(registry)
    }

    /// Replace the in-memory table with the stored snapshot
    #[instrument(skip(self), fields(location = %self.store.location()))]
    pub fn load(&self) -> std::result::Result<usize, RegistryError> {
        let Some(records) = self.store.load()? else {
            warn!("Registry snapshot does not exist yet, starting empty");
            self.bindings.write().clear();
            return Ok(0);
        };

        let mut table = HashMap::with_capacity(records.len());
        for record in records {
            let raw_uid = record.uid.clone();
            let binding = Binding::try_from(record).map_err(|e| {
                RegistryError::fatal_load(self.store.location(), format!("entry {raw_uid:?}: {e}"))
            })?;
            let uid = binding.uid.clone();
            if table.insert(uid.clone(), binding).is_some() {
                return Err(RegistryError::fatal_load(
                    self.store.location(),
                    format!("duplicate entry for tag {uid}"),
                ));
            }
        }

        let count = table.len();
        *self.bindings.write() = table;
        info!(entries = count, "Loaded registry");
        Ok(count)
    }

    /// Exact-match lookup
    pub fn get(&self, uid: &TagUid) -> Option<Binding> {
        self.bindings.read().get(uid).cloned()
    }

    /// Lookup by raw identifier; malformed identifiers match nothing
    pub fn lookup(&self, raw_uid: &str) -> Option<Binding> {
        TagUid::parse(raw_uid).ok().and_then(|uid| self.get(&uid))
    }

    /// Snapshot of all bindings, order not significant
    pub fn all(&self) -> Vec<Binding> {
        self.bindings.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Bind a tag to an action, replacing any existing binding
    #[instrument(skip(self, alias, parameter))]
    pub fn register(
        &self,
        kind: ActionKind,
        uid: &str,
        alias: Option<&str>,
        parameter: Option<&str>,
    ) -> Result<Binding> {
        let uid = TagUid::parse(uid)?;
        let action = kind.validate(parameter)?;
        let binding = Binding::new(uid.clone(), action).with_alias(alias);

        let mut table = self.bindings.write();
        let previous = table.insert(uid.clone(), binding.clone());

        if let Err(e) = self.persist(&table) {
            match previous {
                Some(previous) => table.insert(uid, previous),
                None => table.remove(&uid),
            };
            return Err(e.into());
        }

        info!(uid = %binding.uid, action = %binding.action, replaced = previous.is_some(), "Registered tag");
        Ok(binding)
    }

    /// Remove a tag's binding
    #[instrument(skip(self))]
    pub fn unregister(&self, uid: &str) -> Result<Binding> {
        let uid = TagUid::parse(uid)?;

        let mut table = self.bindings.write();
        let removed = table
            .remove(&uid)
            .ok_or_else(|| RegistryError::NotFound(uid.to_string()))?;

        if let Err(e) = self.persist(&table) {
            table.insert(uid, removed);
            return Err(e.into());
        }

        info!(uid = %removed.uid, "Unregistered tag");
        Ok(removed)
    }

    /// Record a scan time on a binding. Transient, never persisted.
    pub fn mark_scanned(&self, uid: &TagUid, at: DateTime<Utc>) -> Option<Binding> {
        let mut table = self.bindings.write();
        let binding = table.get_mut(uid)?;
        binding.last_scanned = Some(at);
        Some(binding.clone())
    }

    fn persist(&self, table: &HashMap<TagUid, Binding>) -> std::result::Result<(), RegistryError> {
        let mut records: Vec<BindingRecord> = table.values().map(BindingRecord::from).collect();
        records.sort_by(|a, b| a.uid.cmp(&b.uid));
        self.store.save(&records)
    }
}
