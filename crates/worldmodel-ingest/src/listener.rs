//! Map listener – turns [`MapUpdate`]s into descriptions and instances.
//!
//! For every accepted update the listener:
//!
//! 1. Builds a [`DescriptorCandidate`] from `(msg_type, topic, data)` and
//!    asks the Deduplication Engine for an equivalent description among those
//!    tagged with the class tag.  If none exists it creates one named after
//!    the topic, carrying a single descriptor whose `ref` names the topic.
//! 2. Looks up the instance tagged `[class_tag, topic]`.  The first match is
//!    pointed at the description and re-stamped; otherwise a new instance is
//!    created.
//!
//! [`MapListener::ingest`] drops updates arriving faster than
//! `max_updates_per_sec` and reports them as [`IngestOutcome::Throttled`].
//! [`MapListener::run`] instead keeps the newest throttled update per topic
//! and writes it once the quota allows, or when the bus closes.  Writes run on
//! the blocking thread pool.
//!
//! With `atomic_dedup` off, step 1 is a check-then-act sequence and two
//! listeners sharing a database can both create a description for the same
//! content.  Step 2 is never atomic.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, error, info, instrument, warn};
use worldmodel_store::{DescriptorCandidate, WorldModel};
use worldmodel_types::{Header, PoseWithCovarianceStamped, Source, Time, WorldObjectDescription, WorldObjectInstance};

use crate::bus::{MapSubscriber, MapUpdate};
use crate::error::IngestError;

/// Creator recorded in the `source` of instances this listener creates.
pub const CREATOR: &str = "worldmodel-ingest";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Tag placed on every description and instance the listener creates.
    pub class_tag: String,
    pub max_updates_per_sec: NonZeroU32,
    /// Run dedup and description creation under the service's create lock.
    pub atomic_dedup: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            class_tag: "map".to_string(),
            max_updates_per_sec: NonZeroU32::MIN,
            atomic_dedup: false,
        }
    }
}

/// What happened to one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Dropped by the rate limiter; nothing was written.
    Throttled,
    Ingested {
        description_id: u64,
        instance_id: u64,
        new_description: bool,
        new_instance: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// MapListener
// ─────────────────────────────────────────────────────────────────────────────

pub struct MapListener {
    world: Arc<WorldModel>,
    config: ListenerConfig,
    limiter: DefaultDirectRateLimiter,
}

impl MapListener {
    pub fn new(world: Arc<WorldModel>, config: ListenerConfig) -> Self {
        let limiter = RateLimiter::direct(Quota::per_second(config.max_updates_per_sec));
        Self {
            world,
            config,
            limiter,
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Ingest a single update, dropping it when over quota.
    pub fn ingest(&self, update: &MapUpdate) -> Result<IngestOutcome, IngestError> {
        if self.limiter.check().is_err() {
            warn!(topic = %update.topic, "map update throttled");
            return Ok(IngestOutcome::Throttled);
        }
        self.apply(update)
    }

    #[instrument(skip_all, fields(topic = %update.topic, update_id = %update.id))]
    fn apply(&self, update: &MapUpdate) -> Result<IngestOutcome, IngestError> {
        let (description_id, new_description) = self.resolve_description(update)?;
        let (instance_id, new_instance) = self.upsert_instance(update, description_id)?;

        info!(
            description_id,
            instance_id, new_description, new_instance, "map update ingested"
        );
        Ok(IngestOutcome::Ingested {
            description_id,
            instance_id,
            new_description,
            new_instance,
        })
    }

    /// Consume `subscriber` until the bus closes.  Over-quota updates are
    /// deferred, newest per topic; failed updates are logged and skipped.
    pub async fn run(self, mut subscriber: MapSubscriber) {
        info!(class_tag = %self.config.class_tag, "map listener started");
        let listener = Arc::new(self);
        let mut pending: BTreeMap<String, MapUpdate> = BTreeMap::new();

        loop {
            let received = if pending.is_empty() {
                subscriber.recv().await
            } else {
                tokio::select! {
                    received = subscriber.recv() => received,
                    _ = listener.limiter.until_ready() => {
                        if let Some((_, update)) = pending.pop_first() {
                            Self::apply_blocking(&listener, update).await;
                        }
                        continue;
                    }
                }
            };
            let Some(update) = received else { break };

            // A newer map supersedes whatever was waiting for the same topic.
            pending.remove(&update.topic);
            if listener.limiter.check().is_err() {
                debug!(topic = %update.topic, "map update deferred");
                pending.insert(update.topic.clone(), update);
                continue;
            }
            Self::apply_blocking(&listener, update).await;
        }

        for (_, update) in std::mem::take(&mut pending) {
            Self::apply_blocking(&listener, update).await;
        }
        info!("map bus closed; listener stopping");
    }

    async fn apply_blocking(listener: &Arc<Self>, update: MapUpdate) {
        let worker = Arc::clone(listener);
        let topic = update.topic.clone();
        match tokio::task::spawn_blocking(move || worker.apply(&update)).await {
            Ok(Ok(outcome)) => debug!(?outcome, "map update handled"),
            Ok(Err(e)) => error!(%topic, error = %e, "map update failed"),
            Err(e) => error!(%topic, error = %e, "map ingest task failed"),
        }
    }

    fn resolve_description(&self, update: &MapUpdate) -> Result<(u64, bool), IngestError> {
        let class_tag = self.config.class_tag.as_str();
        let candidate = DescriptorCandidate::new(&update.msg_type, &update.topic, update.data.clone());
        let description = WorldObjectDescription {
            name: update.topic.clone(),
            tags: vec![class_tag.to_string()],
            descriptors: vec![
                candidate.to_descriptor(self.world.dedup().ref_field(), vec![class_tag.to_string()]),
            ],
            ..Default::default()
        };

        if self.config.atomic_dedup {
            return Ok(self
                .world
                .find_or_create_description(class_tag, &candidate, &description)?);
        }
        match self.world.find_equivalent_description(class_tag, &candidate)? {
            Some(id) => Ok((id, false)),
            None => Ok((self.world.create_description(&description)?, true)),
        }
    }

    fn upsert_instance(&self, update: &MapUpdate, description_id: u64) -> Result<(u64, bool), IngestError> {
        let tags = [self.config.class_tag.as_str(), update.topic.as_str()];
        let pose = PoseWithCovarianceStamped {
            header: Header {
                seq: 0,
                stamp: Time::from_datetime(update.received_at),
                frame_id: update.frame_id.clone(),
            },
            ..Default::default()
        };

        let existing = self.world.search_instances_by_tags(&tags)?;
        if let Some(current) = existing.first() {
            let patch = WorldObjectInstance {
                description_id,
                pose: pose.clone(),
                ..Default::default()
            };
            if self.world.update_instance(current.instance_id, &patch)? {
                return Ok((current.instance_id, false));
            }
            debug!(instance_id = current.instance_id, "instance vanished before update");
        }

        let instance = WorldObjectInstance {
            name: update.topic.clone(),
            source: Source {
                origin: update.topic.clone(),
                creator: CREATOR.to_string(),
            },
            pose,
            description_id,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        };
        Ok((self.world.create_instance(&instance)?, true))
    }
}
