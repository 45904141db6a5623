//! Descriptor Store – descriptors keyed by their owning description.
//!
//! Descriptors are written once and never updated individually.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, Collection};
use crate::error::StoreError;
use crate::record::{Field, Record, Value};

pub struct DescriptorStore {
    backend: Arc<dyn Backend>,
}

impl DescriptorStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Attach `record` to `description_id` and persist it.  The owning id is
    /// set here; any id carried by the record is discarded.
    pub fn insert(&self, description_id: u64, mut record: Record) -> Result<u64, StoreError> {
        record.remove(Field::DescriptorId);
        record.insert(Field::DescriptionId, Value::Integer(description_id));
        let id = self.backend.insert(Collection::Descriptors, record)?;
        debug!(descriptor_id = id, description_id, "descriptor inserted");
        Ok(id)
    }

    /// All descriptors of `description_id`, in insertion order.
    pub fn search_by_description_id(&self, description_id: u64) -> Result<Vec<Record>, StoreError> {
        let found = self
            .backend
            .find_by_owner(Collection::Descriptors, Field::DescriptionId, description_id)?;
        Ok(found.into_iter().map(|(_, r)| r).collect())
    }

    /// Remove every descriptor of `description_id`; returns how many were
    /// removed.
    pub fn delete_by_description_id(&self, description_id: u64) -> Result<usize, StoreError> {
        let owned = self
            .backend
            .find_by_owner(Collection::Descriptors, Field::DescriptionId, description_id)?;
        let mut removed = 0;
        for (id, _) in owned {
            if self.backend.remove(Collection::Descriptors, id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
