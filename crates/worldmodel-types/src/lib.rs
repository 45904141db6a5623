//! `worldmodel-types` – wire-level messages exchanged with the world model.
//!
//! Every message is a plain value type whose zero value means "unset": an
//! `instance_id` of `0`, an empty `name`, a [`Time`] of `(0, 0)`.  The store
//! relies on this convention when it converts messages into sparse records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of entries in a row-major 6×6 pose covariance matrix.
pub const COVARIANCE_LEN: usize = 36;

// ─────────────────────────────────────────────────────────────────────────────
// Time
// ─────────────────────────────────────────────────────────────────────────────

/// A `(seconds, nanoseconds)` wall-clock stamp since the Unix epoch.
///
/// `Time::ZERO` doubles as "not set".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

impl Time {
    pub const ZERO: Time = Time { secs: 0, nsecs: 0 };

    pub fn new(secs: u32, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }

    /// The current UTC wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert a chrono timestamp, saturating at the `u32` seconds range.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let secs = u32::try_from(dt.timestamp().max(0)).unwrap_or(u32::MAX);
        // Leap seconds are reported as nanos >= 1e9.
        let nsecs = dt.timestamp_subsec_nanos().min(999_999_999);
        Self { secs, nsecs }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.secs), self.nsecs)
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nsecs == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provenance and pose
// ─────────────────────────────────────────────────────────────────────────────

/// Where an instance came from.  Both halves are independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Source {
    /// e.g. the topic or sensor that observed the object.
    pub origin: String,
    /// e.g. the node that created the record.
    pub creator: String,
}

/// Standard message header carried by stamped payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Header {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation quaternion in `(x, y, z, w)` order.
///
/// The default is the all-zero quaternion, which the store treats as unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// A stamped pose with a 6×6 covariance.  Opaque to the world model beyond
/// the covariance having [`COVARIANCE_LEN`] entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PoseWithCovarianceStamped {
    pub header: Header,
    pub position: Point,
    pub orientation: Quaternion,
    /// Row-major 6×6 matrix.
    pub covariance: Vec<f64>,
}

impl Default for PoseWithCovarianceStamped {
    fn default() -> Self {
        Self {
            header: Header::default(),
            position: Point::default(),
            orientation: Quaternion::default(),
            covariance: vec![0.0; COVARIANCE_LEN],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World objects
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete, located, time-stamped occurrence of an object in the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorldObjectInstance {
    /// Assigned by the store; ignored on create and update.
    pub instance_id: u64,
    pub name: String,
    /// Set once by the store on insert.
    pub creation: Time,
    /// Refreshed by the store on every successful update.
    pub update: Time,
    pub expected_ttl: Time,
    pub perceived_end: Time,
    pub source: Source,
    pub pose: PoseWithCovarianceStamped,
    /// `0` means "no description".
    pub description_id: u64,
    pub properties: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// One typed payload attached to a description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Descriptor {
    /// Assigned by the store.
    pub descriptor_id: u64,
    /// Owning description; assigned by the store.
    pub description_id: u64,
    /// Payload schema name, e.g. `"nav_msgs/OccupancyGrid"`.
    #[serde(rename = "type")]
    pub descriptor_type: String,
    /// Serialized payload.
    pub data: String,
    /// Serialized reference/context, e.g. `{"topic":"/map"}`.
    #[serde(rename = "ref")]
    pub reference: String,
    pub tags: Vec<String>,
}

/// A named, tagged template composed of descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorldObjectDescription {
    pub description_id: u64,
    pub name: String,
    pub tags: Vec<String>,
    pub descriptors: Vec<Descriptor>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors surfaced by the world model boundary.
///
/// "Not found" is never an error: lookups report it through `bool`/`Option`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldModelError {
    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Malformed Object: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pose_has_zero_covariance_matrix() {
        let pose = PoseWithCovarianceStamped::default();
        assert_eq!(pose.covariance.len(), COVARIANCE_LEN);
        assert!(pose.covariance.iter().all(|c| *c == 0.0));
        assert_eq!(pose.orientation, Quaternion::default());
    }

    #[test]
    fn time_now_is_after_epoch() {
        let now = Time::now();
        assert!(!now.is_zero());
        assert!(now.nsecs < 1_000_000_000);
    }

    #[test]
    fn time_datetime_roundtrip() {
        let t = Time::new(1_700_000_000, 250_000_000);
        let dt = t.to_datetime().unwrap();
        assert_eq!(Time::from_datetime(dt), t);
    }

    #[test]
    fn time_orders_by_seconds_then_nanos() {
        assert!(Time::new(1, 999) < Time::new(2, 0));
        assert!(Time::new(2, 1) > Time::new(2, 0));
    }

    #[test]
    fn descriptor_uses_short_wire_names() {
        let d = Descriptor {
            descriptor_type: "grid".to_string(),
            reference: "{\"topic\":\"/map\"}".to_string(),
            ..Descriptor::default()
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "grid");
        assert_eq!(json["ref"], "{\"topic\":\"/map\"}");
    }

    #[test]
    fn sparse_instance_json_fills_zero_values() {
        let inst: WorldObjectInstance =
            serde_json::from_str(r#"{"name":"Robot","tags":["robot","lab1"]}"#).unwrap();
        assert_eq!(inst.name, "Robot");
        assert_eq!(inst.instance_id, 0);
        assert!(inst.creation.is_zero());
        assert_eq!(inst.pose, PoseWithCovarianceStamped::default());
    }

    #[test]
    fn world_model_error_display() {
        let err = WorldModelError::Persistence("database is locked".to_string());
        assert!(err.to_string().contains("Persistence Error"));
        assert!(err.to_string().contains("database is locked"));
    }
}
