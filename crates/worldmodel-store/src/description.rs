//! Description Store – CRUD and tag search over world object descriptions.
//!
//! Descriptions are stored without their descriptors; see
//! [`DescriptorStore`](crate::descriptor::DescriptorStore).

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, Collection};
use crate::error::StoreError;
use crate::record::{Field, Record};
use crate::tags::TagQuery;

pub struct DescriptionStore {
    backend: Arc<dyn Backend>,
}

impl DescriptionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn insert(&self, mut record: Record) -> Result<u64, StoreError> {
        record.remove(Field::DescriptionId);
        let id = self.backend.insert(Collection::Descriptions, record)?;
        debug!(description_id = id, "description inserted");
        Ok(id)
    }

    /// `Ok(None)` when no description has that id.
    pub fn get_by_id(&self, description_id: u64) -> Result<Option<Record>, StoreError> {
        self.backend.get(Collection::Descriptions, description_id)
    }

    pub fn delete(&self, description_id: u64) -> Result<bool, StoreError> {
        self.backend.remove(Collection::Descriptions, description_id)
    }

    pub fn search_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<Record>, StoreError> {
        let query = TagQuery::new(tags);
        let found = self.backend.find_by_tags(Collection::Descriptions, &query)?;
        Ok(found.into_iter().map(|(_, r)| r).collect())
    }
}
