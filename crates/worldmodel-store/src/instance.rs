//! Instance Store – CRUD and tag search over world object instances.
//!
//! The store owns the `creation` and `update` stamps: caller-supplied values
//! are overwritten on insert, and `creation` is never touched by an update.

use std::sync::Arc;

use tracing::debug;
use worldmodel_types::Time;

use crate::backend::{Backend, Collection};
use crate::codec::time_to_storage;
use crate::error::StoreError;
use crate::record::{Field, Record, Value};
use crate::tags::TagQuery;

pub struct InstanceStore {
    backend: Arc<dyn Backend>,
}

impl InstanceStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Persist a new instance and return its fresh id.
    pub fn insert(&self, mut record: Record) -> Result<u64, StoreError> {
        record.remove(Field::InstanceId);
        let now = time_to_storage(Time::now());
        record.insert(Field::Creation, Value::Real(now));
        record.insert(Field::Update, Value::Real(now));
        let id = self.backend.insert(Collection::Instances, record)?;
        debug!(instance_id = id, "instance inserted");
        Ok(id)
    }

    /// Apply the fields present in `record` to the stored instance.
    ///
    /// Fields absent from `record` keep their stored value.  The path id
    /// wins over any `instance_id` in the payload, and `update` never moves
    /// backwards even if the wall clock does.  Returns `false` when no such
    /// instance exists.
    pub fn update_by_id(&self, instance_id: u64, mut record: Record) -> Result<bool, StoreError> {
        let Some(mut stored) = self.backend.get(Collection::Instances, instance_id)? else {
            debug!(instance_id, "update skipped: no such instance");
            return Ok(false);
        };
        record.remove(Field::InstanceId);
        record.remove(Field::Creation);
        let previous = stored.real(Field::Update);
        let now = time_to_storage(Time::now()).max(previous);

        stored.merge(record);
        stored.insert(Field::InstanceId, Value::Integer(instance_id));
        stored.insert(Field::Update, Value::Real(now));
        self.backend.replace(Collection::Instances, instance_id, stored)
    }

    pub fn get_by_id(&self, instance_id: u64) -> Result<Option<Record>, StoreError> {
        self.backend.get(Collection::Instances, instance_id)
    }

    /// Returns whether a record was actually removed.
    pub fn delete(&self, instance_id: u64) -> Result<bool, StoreError> {
        let removed = self.backend.remove(Collection::Instances, instance_id)?;
        debug!(instance_id, removed, "instance delete");
        Ok(removed)
    }

    /// Every instance whose tags are a superset of `tags`.  An empty query
    /// returns nothing.
    pub fn search_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<Record>, StoreError> {
        let query = TagQuery::new(tags);
        let found = self.backend.find_by_tags(Collection::Instances, &query)?;
        Ok(found.into_iter().map(|(_, r)| r).collect())
    }
}
