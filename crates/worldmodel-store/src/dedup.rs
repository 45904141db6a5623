//! Deduplication Engine – find an existing description whose content matches
//! a candidate descriptor payload.
//!
//! A stored descriptor is equivalent to a [`DescriptorCandidate`] when all of
//! the following hold:
//!
//! | Key    | Rule                                                                |
//! |--------|---------------------------------------------------------------------|
//! | `type` | equal to the candidate's declared type string                       |
//! | `ref`  | parses as a JSON object whose `<ref_field>` equals the channel      |
//! | `data` | parses as JSON and is structurally equal to the candidate's payload |
//!
//! `data` is compared as parsed JSON, so `{"w":10,"h":2}` and
//! `{ "h": 2, "w": 10 }` are the same content.  Numbers compare by value:
//! `1` and `1.0` are equal.
//!
//! A stored descriptor whose `ref` or `data` cannot be parsed is treated as
//! "not equivalent" and scanning continues with the next one.
//!
//! # Consistency
//!
//! [`DedupEngine::find_equivalent`] followed by a create is a check-then-act
//! sequence: two callers ingesting the same content concurrently can both see
//! "no match" and both create a description.  Callers that need the stronger
//! guarantee use [`WorldModel::find_or_create_description`](crate::service::WorldModel::find_or_create_description).

use std::sync::Arc;

use serde_json::Value as Json;
use tracing::debug;
use worldmodel_types::Descriptor;

use crate::backend::Backend;
use crate::codec::descriptor_to_record;
use crate::description::DescriptionStore;
use crate::descriptor::DescriptorStore;
use crate::error::StoreError;
use crate::record::{Field, Record};

/// Default name of the `ref` object field that carries the channel.
pub const DEFAULT_REF_FIELD: &str = "topic";

// ─────────────────────────────────────────────────────────────────────────────
// DescriptorCandidate
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming descriptor content to be matched against stored descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorCandidate {
    pub descriptor_type: String,
    /// Channel or context the content arrived on, e.g. `/map`.
    pub channel: String,
    pub data: Json,
}

impl DescriptorCandidate {
    pub fn new(descriptor_type: impl Into<String>, channel: impl Into<String>, data: Json) -> Self {
        Self {
            descriptor_type: descriptor_type.into(),
            channel: channel.into(),
            data,
        }
    }

    /// Build a candidate from a serialized payload.
    pub fn parse(
        descriptor_type: impl Into<String>,
        channel: impl Into<String>,
        raw_data: &str,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(descriptor_type, channel, serde_json::from_str(raw_data)?))
    }

    /// The `ref` blob a descriptor created from this candidate carries.
    pub fn reference(&self, ref_field: &str) -> String {
        let mut obj = serde_json::Map::new();
        obj.insert(ref_field.to_string(), Json::String(self.channel.clone()));
        Json::Object(obj).to_string()
    }

    /// A descriptor carrying this candidate's content, ready for insertion.
    pub fn to_descriptor(&self, ref_field: &str, tags: Vec<String>) -> Descriptor {
        Descriptor {
            descriptor_type: self.descriptor_type.clone(),
            data: self.data.to_string(),
            reference: self.reference(ref_field),
            tags,
            ..Descriptor::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Matching
// ─────────────────────────────────────────────────────────────────────────────

enum Verdict {
    Equivalent,
    Different,
    Malformed(String),
}

fn compare(stored: &Record, candidate: &DescriptorCandidate, ref_field: &str) -> Verdict {
    if stored.text(Field::Type) != candidate.descriptor_type {
        return Verdict::Different;
    }

    let reference: Json = match serde_json::from_str(stored.text(Field::Ref)) {
        Ok(v) => v,
        Err(e) => return Verdict::Malformed(format!("ref: {e}")),
    };
    let channel_matches = reference
        .get(ref_field)
        .and_then(Json::as_str)
        .is_some_and(|c| c == candidate.channel);
    if !channel_matches {
        return Verdict::Different;
    }

    match serde_json::from_str::<Json>(stored.text(Field::Data)) {
        Ok(data) if json_eq(&data, &candidate.data) => Verdict::Equivalent,
        Ok(_) => Verdict::Different,
        Err(e) => Verdict::Malformed(format!("data: {e}")),
    }
}

/// Deep equality where numbers compare by value rather than by their
/// integer/float rendering.
fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Json::Array(xs), Json::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Json::Object(xs), Json::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DedupEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct DedupEngine {
    descriptions: DescriptionStore,
    descriptors: DescriptorStore,
    ref_field: String,
}

impl DedupEngine {
    pub fn new(backend: Arc<dyn Backend>, ref_field: impl Into<String>) -> Self {
        Self {
            descriptions: DescriptionStore::new(backend.clone()),
            descriptors: DescriptorStore::new(backend),
            ref_field: ref_field.into(),
        }
    }

    pub fn ref_field(&self) -> &str {
        &self.ref_field
    }

    /// Whether `descriptor` carries content equivalent to `candidate`.
    pub fn is_equivalent(&self, descriptor: &Descriptor, candidate: &DescriptorCandidate) -> bool {
        matches!(
            compare(&descriptor_to_record(descriptor), candidate, &self.ref_field),
            Verdict::Equivalent
        )
    }

    /// The id of the first description tagged `class_tag` that owns a
    /// descriptor equivalent to `candidate`, or `None`.
    ///
    /// Descriptions are visited in ascending id order and their descriptors
    /// in insertion order.  Only backend failures are returned as errors.
    pub fn find_equivalent(
        &self,
        class_tag: &str,
        candidate: &DescriptorCandidate,
    ) -> Result<Option<u64>, StoreError> {
        for description in self.descriptions.search_by_tags(&[class_tag])? {
            let description_id = description.integer(Field::DescriptionId);
            for descriptor in self.descriptors.search_by_description_id(description_id)? {
                match compare(&descriptor, candidate, &self.ref_field) {
                    Verdict::Equivalent => {
                        debug!(description_id, channel = %candidate.channel, "equivalent description found");
                        return Ok(Some(description_id));
                    }
                    Verdict::Different => {}
                    Verdict::Malformed(reason) => {
                        debug!(
                            description_id,
                            descriptor_id = descriptor.integer(Field::DescriptorId),
                            %reason,
                            "skipping malformed descriptor"
                        );
                    }
                }
            }
        }
        Ok(None)
    }
}
