//! Sparse storage records.
//!
//! A [`Record`] maps a closed set of [`Field`] identifiers to [`Value`]s.  A
//! field that is absent from the record is "unset"; reading it yields the
//! type's zero value rather than an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Field
// ─────────────────────────────────────────────────────────────────────────────

/// Every column a world-model record can carry.
///
/// Fields are compared by value; the storage name is only used when a record
/// is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    InstanceId,
    DescriptionId,
    DescriptorId,
    Name,
    Creation,
    Update,
    ExpectedTtl,
    PerceivedEnd,
    SourceOrigin,
    SourceCreator,
    PoseSeq,
    PoseStamp,
    PoseFrameId,
    PosePosition,
    PoseOrientation,
    PoseCovariance,
    Properties,
    Tags,
    Type,
    Data,
    Ref,
}

impl Field {
    pub const ALL: [Field; 21] = [
        Field::InstanceId,
        Field::DescriptionId,
        Field::DescriptorId,
        Field::Name,
        Field::Creation,
        Field::Update,
        Field::ExpectedTtl,
        Field::PerceivedEnd,
        Field::SourceOrigin,
        Field::SourceCreator,
        Field::PoseSeq,
        Field::PoseStamp,
        Field::PoseFrameId,
        Field::PosePosition,
        Field::PoseOrientation,
        Field::PoseCovariance,
        Field::Properties,
        Field::Tags,
        Field::Type,
        Field::Data,
        Field::Ref,
    ];

    /// Column name used in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::InstanceId => "instance_id",
            Field::DescriptionId => "description_id",
            Field::DescriptorId => "descriptor_id",
            Field::Name => "name",
            Field::Creation => "creation",
            Field::Update => "update",
            Field::ExpectedTtl => "expected_ttl",
            Field::PerceivedEnd => "perceived_end",
            Field::SourceOrigin => "source_origin",
            Field::SourceCreator => "source_creator",
            Field::PoseSeq => "pose_seq",
            Field::PoseStamp => "pose_stamp",
            Field::PoseFrameId => "pose_frame_id",
            Field::PosePosition => "pose_position",
            Field::PoseOrientation => "pose_orientation",
            Field::PoseCovariance => "pose_covariance",
            Field::Properties => "properties",
            Field::Tags => "tags",
            Field::Type => "type",
            Field::Data => "data",
            Field::Ref => "ref",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A single stored column value.
///
/// `Real` is reserved for fractional-second timestamps; coordinate triples and
/// matrices use `RealList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(u64),
    Real(f64),
    Text(String),
    TextList(Vec<String>),
    RealList(Vec<f64>),
    Map(BTreeMap<String, String>),
}

impl Value {
    /// Whether this value is the zero value of its type and must be elided.
    pub fn is_unset(&self) -> bool {
        match self {
            Value::Integer(v) => *v == 0,
            // NaN compares false and is elided along with zero/negative stamps.
            Value::Real(v) => !(*v > 0.0),
            Value::Text(s) => s.is_empty(),
            Value::TextList(v) => v.is_empty(),
            Value::RealList(v) => v.iter().all(|x| *x == 0.0),
            Value::Map(m) => m.is_empty(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// A sparse storage record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<Field, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `field` unconditionally.
    pub fn insert(&mut self, field: Field, value: Value) -> Option<Value> {
        self.fields.insert(field, value)
    }

    /// Store `value` only when it is not its type's zero value.
    pub fn insert_sparse(&mut self, field: Field, value: Value) {
        if !value.is_unset() {
            self.fields.insert(field, value);
        }
    }

    pub fn remove(&mut self, field: Field) -> Option<Value> {
        self.fields.remove(&field)
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.fields.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &Value)> {
        self.fields.iter().map(|(f, v)| (*f, v))
    }

    /// Overwrite every field present in `other`; fields absent from `other`
    /// keep their current value.
    pub fn merge(&mut self, other: Record) {
        self.fields.extend(other.fields);
    }

    // ── zero-defaulting readers ────────────────────────────────────────────

    pub fn integer(&self, field: Field) -> u64 {
        match self.get(field) {
            Some(Value::Integer(v)) => *v,
            _ => 0,
        }
    }

    /// Reads a fractional timestamp.  Integer values are accepted as well
    /// since whole-second stamps may come back from storage as integers.
    pub fn real(&self, field: Field) -> f64 {
        match self.get(field) {
            Some(Value::Real(v)) => *v,
            Some(Value::Integer(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn text(&self, field: Field) -> &str {
        match self.get(field) {
            Some(Value::Text(s)) => s,
            _ => "",
        }
    }

    pub fn text_list(&self, field: Field) -> &[String] {
        match self.get(field) {
            Some(Value::TextList(v)) => v,
            _ => &[],
        }
    }

    pub fn real_list(&self, field: Field) -> &[f64] {
        match self.get(field) {
            Some(Value::RealList(v)) => v,
            _ => &[],
        }
    }

    pub fn map(&self, field: Field) -> BTreeMap<String, String> {
        match self.get(field) {
            Some(Value::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn tags(&self) -> &[String] {
        self.text_list(Field::Tags)
    }

    // ── serialization ──────────────────────────────────────────────────────

    /// Serialize to a JSON object keyed by column name.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let named: BTreeMap<&str, &Value> =
            self.fields.iter().map(|(f, v)| (f.as_str(), v)).collect();
        serde_json::to_string(&named)
    }

    /// Parse a JSON object produced by [`Record::to_json_string`].
    ///
    /// Unknown column names are skipped.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let named: BTreeMap<String, Value> = serde_json::from_str(raw)?;
        let mut record = Record::new();
        for (name, value) in named {
            match Field::from_name(&name) {
                Some(field) => {
                    record.insert(field, value);
                }
                None => warn!(column = %name, "skipping unknown column in stored record"),
            }
        }
        Ok(record)
    }
}
