//! Persistence interface and the in-process backend.
//!
//! The stores never talk to a database directly.  They go through
//! [`Backend`], a minimal keyed-collection interface: each [`Collection`] owns
//! its own id sequence, ids start at 1 and are never reused.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::record::{Field, Record, Value};
use crate::tags::TagQuery;

// ─────────────────────────────────────────────────────────────────────────────
// Collection
// ─────────────────────────────────────────────────────────────────────────────

/// The logical record collections of the world model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Instances,
    Descriptions,
    Descriptors,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Instances => "world_object_instances",
            Collection::Descriptions => "world_object_descriptions",
            Collection::Descriptors => "descriptors",
        }
    }

    /// The primary-key field of records in this collection.
    pub fn id_field(&self) -> Field {
        match self {
            Collection::Instances => Field::InstanceId,
            Collection::Descriptions => Field::DescriptionId,
            Collection::Descriptors => Field::DescriptorId,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

/// A keyed record store shared by every world-model store.
///
/// Implementations decide their own isolation; nothing above this trait adds
/// locking around a single call.
pub trait Backend: Send + Sync {
    /// Allocate the next id of `collection`, write it into the record's id
    /// field and persist the record.
    fn insert(&self, collection: Collection, record: Record) -> Result<u64, StoreError>;

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Record>, StoreError>;

    /// Overwrite the record stored under `id`.  Returns `false` when there is
    /// no such record.
    fn replace(&self, collection: Collection, id: u64, record: Record) -> Result<bool, StoreError>;

    /// Returns whether a record was actually removed.
    fn remove(&self, collection: Collection, id: u64) -> Result<bool, StoreError>;

    /// Every record of `collection`, ascending by id.
    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Record)>, StoreError>;

    /// Records whose tags are a superset of `query`, ascending by id.
    fn find_by_tags(
        &self,
        collection: Collection,
        query: &TagQuery,
    ) -> Result<Vec<(u64, Record)>, StoreError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(query.filter(self.scan(collection)?))
    }

    /// Records whose integer `owner` field equals `owner_id`, ascending by id.
    fn find_by_owner(
        &self,
        collection: Collection,
        owner: Field,
        owner_id: u64,
    ) -> Result<Vec<(u64, Record)>, StoreError> {
        Ok(self
            .scan(collection)?
            .into_iter()
            .filter(|(_, r)| r.integer(owner) == owner_id)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryBackend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Table {
    last_id: u64,
    rows: BTreeMap<u64, Record>,
}

/// In-process backend backed by ordered maps.
///
/// The backend can be taken offline with [`MemoryBackend::set_online`]; while
/// offline every call fails with [`StoreError::Unavailable`], which is how an
/// unreachable database presents itself to the stores.
pub struct MemoryBackend {
    tables: Mutex<HashMap<Collection, Table>>,
    online: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn with_table<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Table) -> T,
    ) -> Result<T, StoreError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "memory backend is offline ({})",
                collection.as_str()
            )));
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".to_string()))?;
        Ok(f(tables.entry(collection).or_default()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn insert(&self, collection: Collection, mut record: Record) -> Result<u64, StoreError> {
        self.with_table(collection, |table| {
            table.last_id += 1;
            let id = table.last_id;
            record.insert(collection.id_field(), Value::Integer(id));
            table.rows.insert(id, record);
            id
        })
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Record>, StoreError> {
        self.with_table(collection, |table| table.rows.get(&id).cloned())
    }

    fn replace(&self, collection: Collection, id: u64, mut record: Record) -> Result<bool, StoreError> {
        self.with_table(collection, |table| match table.rows.get_mut(&id) {
            Some(slot) => {
                record.insert(collection.id_field(), Value::Integer(id));
                *slot = record;
                true
            }
            None => false,
        })
    }

    fn remove(&self, collection: Collection, id: u64) -> Result<bool, StoreError> {
        self.with_table(collection, |table| table.rows.remove(&id).is_some())
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Record)>, StoreError> {
        self.with_table(collection, |table| {
            table
                .rows
                .iter()
                .map(|(id, r)| (*id, r.clone()))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Record {
        let mut r = Record::new();
        r.insert(Field::Name, Value::Text(name.to_string()));
        r
    }

    #[test]
    fn ids_are_per_collection_and_start_at_one() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.insert(Collection::Instances, named("a")).unwrap(), 1);
        assert_eq!(backend.insert(Collection::Instances, named("b")).unwrap(), 2);
        assert_eq!(backend.insert(Collection::Descriptions, named("c")).unwrap(), 1);
    }

    #[test]
    fn insert_writes_id_field() {
        let backend = MemoryBackend::new();
        let id = backend.insert(Collection::Descriptors, named("d")).unwrap();
        let stored = backend.get(Collection::Descriptors, id).unwrap().unwrap();
        assert_eq!(stored.integer(Field::DescriptorId), id);
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let backend = MemoryBackend::new();
        let first = backend.insert(Collection::Instances, named("a")).unwrap();
        assert!(backend.remove(Collection::Instances, first).unwrap());
        let second = backend.insert(Collection::Instances, named("b")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn replace_missing_returns_false() {
        let backend = MemoryBackend::new();
        assert!(!backend.replace(Collection::Instances, 99, named("x")).unwrap());
        assert!(backend.get(Collection::Instances, 99).unwrap().is_none());
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let backend = MemoryBackend::new();
        let id = backend.insert(Collection::Instances, named("a")).unwrap();
        assert!(backend.remove(Collection::Instances, id).unwrap());
        assert!(!backend.remove(Collection::Instances, id).unwrap());
    }

    #[test]
    fn find_by_owner_filters_on_foreign_key() {
        let backend = MemoryBackend::new();
        for owner in [1u64, 2, 1] {
            let mut r = Record::new();
            r.insert(Field::DescriptionId, Value::Integer(owner));
            backend.insert(Collection::Descriptors, r).unwrap();
        }
        let found = backend
            .find_by_owner(Collection::Descriptors, Field::DescriptionId, 1)
            .unwrap();
        let ids: Vec<u64> = found.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn offline_backend_reports_unavailable() {
        let backend = MemoryBackend::new();
        backend.set_online(false);
        let err = backend.insert(Collection::Instances, named("a")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        backend.set_online(true);
        assert!(backend.insert(Collection::Instances, named("a")).is_ok());
    }
}
