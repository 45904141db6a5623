//! The `WorldModel` boundary service.
//!
//! Every public operation takes and returns wire types, runs the Record Codec
//! in both directions, and converts store failures into [`WorldModelError`].
//! Not-found outcomes are reported as `bool`/`Option` results, never as
//! errors.
//!
//! # Non-atomic operations
//!
//! [`WorldModel::create_description`] inserts the description first and then
//! each of its descriptors.  A failure in between leaves a description with
//! fewer descriptors than intended; readers accept such descriptions.
//!
//! # Example
//!
//! ```rust
//! use worldmodel_store::service::WorldModel;
//! use worldmodel_types::WorldObjectInstance;
//!
//! let world = WorldModel::in_memory();
//! let robot = WorldObjectInstance {
//!     name: "Robot".to_string(),
//!     tags: vec!["robot".to_string(), "lab1".to_string()],
//!     ..Default::default()
//! };
//! let id = world.create_instance(&robot).unwrap();
//!
//! let found = world.search_instances_by_tags(&["robot"]).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].instance_id, id);
//! assert_eq!(found[0].creation, found[0].update);
//! ```

use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};
use worldmodel_types::{WorldModelError, WorldObjectDescription, WorldObjectInstance};

use crate::backend::{Backend, MemoryBackend};
use crate::codec::{
    description_from_record, description_to_record, descriptor_from_record, descriptor_to_record,
    instance_from_record, instance_to_record,
};
use crate::dedup::{DEFAULT_REF_FIELD, DedupEngine, DescriptorCandidate};
use crate::description::DescriptionStore;
use crate::descriptor::DescriptorStore;
use crate::error::StoreError;
use crate::instance::InstanceStore;
use crate::record::{Field, Record};

pub struct WorldModel {
    instances: InstanceStore,
    descriptions: DescriptionStore,
    descriptors: DescriptorStore,
    dedup: DedupEngine,
    /// Serializes [`WorldModel::find_or_create_description`] calls.
    create_lock: Mutex<()>,
}

impl WorldModel {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_ref_field(backend, DEFAULT_REF_FIELD)
    }

    /// Like [`WorldModel::new`], with the name of the `ref` field the
    /// Deduplication Engine reads the channel from.
    pub fn with_ref_field(backend: Arc<dyn Backend>, ref_field: impl Into<String>) -> Self {
        Self {
            instances: InstanceStore::new(backend.clone()),
            descriptions: DescriptionStore::new(backend.clone()),
            descriptors: DescriptorStore::new(backend.clone()),
            dedup: DedupEngine::new(backend, ref_field),
            create_lock: Mutex::new(()),
        }
    }

    /// A world model over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    // ── Instances ────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(name = %instance.name))]
    pub fn create_instance(&self, instance: &WorldObjectInstance) -> Result<u64, WorldModelError> {
        let record = instance_to_record(instance).map_err(StoreError::from)?;
        let id = self.instances.insert(record)?;
        info!(instance_id = id, "instance created");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub fn remove_instance(&self, instance_id: u64) -> Result<bool, WorldModelError> {
        Ok(self.instances.delete(instance_id)?)
    }

    /// Write the set fields of `instance` onto the stored instance.
    ///
    /// Unset (zero) fields in `instance` leave the stored value untouched.
    #[instrument(skip(self, instance))]
    pub fn update_instance(
        &self,
        instance_id: u64,
        instance: &WorldObjectInstance,
    ) -> Result<bool, WorldModelError> {
        let record = instance_to_record(instance).map_err(StoreError::from)?;
        Ok(self.instances.update_by_id(instance_id, record)?)
    }

    #[instrument(skip(self))]
    pub fn get_instance(&self, instance_id: u64) -> Result<Option<WorldObjectInstance>, WorldModelError> {
        Ok(self
            .instances
            .get_by_id(instance_id)?
            .map(|r| instance_from_record(&r)))
    }

    #[instrument(skip_all, fields(tags = ?tags.iter().map(|t| t.as_ref()).collect::<Vec<&str>>()))]
    pub fn search_instances_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
    ) -> Result<Vec<WorldObjectInstance>, WorldModelError> {
        Ok(self
            .instances
            .search_by_tags(tags)?
            .iter()
            .map(instance_from_record)
            .collect())
    }

    // ── Descriptions ─────────────────────────────────────────────────────────

    /// Insert `description`, then each of its descriptors under the new id.
    #[instrument(skip_all, fields(name = %description.name))]
    pub fn create_description(&self, description: &WorldObjectDescription) -> Result<u64, WorldModelError> {
        let id = self.descriptions.insert(description_to_record(description))?;
        for descriptor in &description.descriptors {
            self.descriptors.insert(id, descriptor_to_record(descriptor))?;
        }
        info!(
            description_id = id,
            descriptors = description.descriptors.len(),
            "description created"
        );
        Ok(id)
    }

    /// The description and whether it was found.  A missing id yields a
    /// zero-valued description and `false`.
    #[instrument(skip(self))]
    pub fn get_description(
        &self,
        description_id: u64,
    ) -> Result<(WorldObjectDescription, bool), WorldModelError> {
        match self.descriptions.get_by_id(description_id)? {
            Some(record) => Ok((self.assemble(&record)?, true)),
            None => Ok((WorldObjectDescription::default(), false)),
        }
    }

    /// Remove a description together with all of its descriptors.
    #[instrument(skip(self))]
    pub fn remove_description(&self, description_id: u64) -> Result<bool, WorldModelError> {
        if self.descriptions.get_by_id(description_id)?.is_none() {
            return Ok(false);
        }
        let descriptors = self.descriptors.delete_by_description_id(description_id)?;
        let removed = self.descriptions.delete(description_id)?;
        info!(description_id, descriptors, "description removed");
        Ok(removed)
    }

    #[instrument(skip_all, fields(tags = ?tags.iter().map(|t| t.as_ref()).collect::<Vec<&str>>()))]
    pub fn search_descriptions_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
    ) -> Result<Vec<WorldObjectDescription>, WorldModelError> {
        let mut out = Vec::new();
        for record in self.descriptions.search_by_tags(tags)? {
            out.push(self.assemble(&record)?);
        }
        Ok(out)
    }

    fn assemble(&self, record: &Record) -> Result<WorldObjectDescription, StoreError> {
        let descriptors = self
            .descriptors
            .search_by_description_id(record.integer(Field::DescriptionId))?
            .iter()
            .map(descriptor_from_record)
            .collect();
        Ok(description_from_record(record, descriptors))
    }

    // ── Deduplication ────────────────────────────────────────────────────────

    /// Look for a description tagged `class_tag` holding content equivalent
    /// to `candidate`.
    ///
    /// Following this with [`WorldModel::create_description`] is not atomic;
    /// see [`WorldModel::find_or_create_description`].
    #[instrument(skip(self, candidate), fields(channel = %candidate.channel))]
    pub fn find_equivalent_description(
        &self,
        class_tag: &str,
        candidate: &DescriptorCandidate,
    ) -> Result<Option<u64>, WorldModelError> {
        Ok(self.dedup.find_equivalent(class_tag, candidate)?)
    }

    /// Return the equivalent description for `candidate`, creating
    /// `description` when there is none.  The boolean is `true` when a new
    /// description was created.
    ///
    /// The created description always carries `class_tag` and a descriptor
    /// equivalent to `candidate`; either is added when `description` lacks
    /// it, so a repeated call finds what the first one created.
    ///
    /// The search and the create run under one lock held by this service, so
    /// concurrent callers on the same `WorldModel` cannot both create.  Writers
    /// that bypass this method, or other processes sharing the database, are
    /// not covered.
    #[instrument(skip(self, candidate, description), fields(channel = %candidate.channel))]
    pub fn find_or_create_description(
        &self,
        class_tag: &str,
        candidate: &DescriptorCandidate,
        description: &WorldObjectDescription,
    ) -> Result<(u64, bool), WorldModelError> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|_| WorldModelError::Persistence("create lock poisoned".to_string()))?;
        if let Some(id) = self.dedup.find_equivalent(class_tag, candidate)? {
            return Ok((id, false));
        }

        let mut description = description.clone();
        if !description.tags.iter().any(|t| t == class_tag) {
            description.tags.push(class_tag.to_string());
        }
        if !description
            .descriptors
            .iter()
            .any(|d| self.dedup.is_equivalent(d, candidate))
        {
            debug!(channel = %candidate.channel, "adding candidate descriptor to new description");
            description
                .descriptors
                .push(candidate.to_descriptor(self.dedup.ref_field(), description.tags.clone()));
        }
        Ok((self.create_description(&description)?, true))
    }
}
