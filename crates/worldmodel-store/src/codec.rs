//! Record Codec – wire objects ⇄ sparse storage records.
//!
//! A field is written into the record only when its wire value is not the
//! type's zero value:
//!
//! | wire field                 | record field(s)                                   | written when          |
//! |----------------------------|---------------------------------------------------|-----------------------|
//! | `*_id`                     | `instance_id`, `description_id`, `descriptor_id`  | `> 0`                 |
//! | `name`, `type`, `data`, `ref` | same name                                      | non-empty             |
//! | `creation`, `update`, `expected_ttl`, `perceived_end` | same name              | `secs + nsecs/1e9 > 0`|
//! | `source`                   | `source_origin`, `source_creator`                 | each non-empty        |
//! | `pose.header`              | `pose_seq`, `pose_stamp`, `pose_frame_id`         | each non-zero         |
//! | `pose.position`            | `pose_position` `[x, y, z]`                       | any component ≠ 0     |
//! | `pose.orientation`         | `pose_orientation` `[x, y, z, w]`                 | any component ≠ 0     |
//! | `pose.covariance`          | `pose_covariance` (36 entries)                    | any entry ≠ 0         |
//! | `properties`, `tags`       | same name                                         | non-empty             |
//!
//! A stamp of exactly zero is indistinguishable from "unset" and reads back
//! as `Time::ZERO`.  Stamps are stored as `f64` seconds and decoded rounded to
//! the nearest microsecond, which `f64` resolves exactly for any `u32` second
//! count.  Decoding never fails: absent fields become zero values.
//!
//! Pose components must be finite; NaN and infinities are rejected on encode.

use worldmodel_types::{
    COVARIANCE_LEN, Descriptor, Header, Point, PoseWithCovarianceStamped, Quaternion, Source, Time,
    WorldObjectDescription, WorldObjectInstance,
};

use crate::error::CodecError;
use crate::record::{Field, Record, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// `(secs, nsecs)` → fractional seconds since the epoch.
pub fn time_to_storage(t: Time) -> f64 {
    f64::from(t.secs) + f64::from(t.nsecs) / 1e9
}

/// Fractional seconds → `(secs, nsecs)`, rounded to the nearest microsecond.
/// Zero, negative and non-finite values map to [`Time::ZERO`].
pub fn time_from_storage(value: f64) -> Time {
    if !value.is_finite() || value <= 0.0 {
        return Time::ZERO;
    }
    let mut secs = value.trunc();
    let mut micros = ((value - secs) * 1e6).round();
    if micros >= 1e6 {
        secs += 1.0;
        micros = 0.0;
    }
    Time::new(secs.min(f64::from(u32::MAX)) as u32, micros as u32 * 1_000)
}

fn check_finite(field: &'static str, values: &[f64]) -> Result<(), CodecError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CodecError::NonFinite { field })
    }
}

fn put_time(record: &mut Record, field: Field, t: Time) {
    record.insert_sparse(field, Value::Real(time_to_storage(t)));
}

fn read_time(record: &Record, field: Field) -> Time {
    time_from_storage(record.real(field))
}

fn put_text(record: &mut Record, field: Field, s: &str) {
    record.insert_sparse(field, Value::Text(s.to_string()));
}

fn put_tags(record: &mut Record, tags: &[String]) {
    record.insert_sparse(Field::Tags, Value::TextList(tags.to_vec()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Instances
// ─────────────────────────────────────────────────────────────────────────────

/// Encode an instance.  An empty covariance is treated as unset; any other
/// length than [`COVARIANCE_LEN`] is a structural error, as is a non-finite
/// pose component.
pub fn instance_to_record(inst: &WorldObjectInstance) -> Result<Record, CodecError> {
    let cov = &inst.pose.covariance;
    if !cov.is_empty() && cov.len() != COVARIANCE_LEN {
        return Err(CodecError::CovarianceLength { found: cov.len() });
    }
    let p = inst.pose.position;
    let q = inst.pose.orientation;
    check_finite("pose.position", &[p.x, p.y, p.z])?;
    check_finite("pose.orientation", &[q.x, q.y, q.z, q.w])?;
    check_finite("pose.covariance", cov)?;

    let mut r = Record::new();
    r.insert_sparse(Field::InstanceId, Value::Integer(inst.instance_id));
    put_text(&mut r, Field::Name, &inst.name);
    put_time(&mut r, Field::Creation, inst.creation);
    put_time(&mut r, Field::Update, inst.update);
    put_time(&mut r, Field::ExpectedTtl, inst.expected_ttl);
    put_time(&mut r, Field::PerceivedEnd, inst.perceived_end);
    put_text(&mut r, Field::SourceOrigin, &inst.source.origin);
    put_text(&mut r, Field::SourceCreator, &inst.source.creator);

    let pose = &inst.pose;
    r.insert_sparse(Field::PoseSeq, Value::Integer(u64::from(pose.header.seq)));
    put_time(&mut r, Field::PoseStamp, pose.header.stamp);
    put_text(&mut r, Field::PoseFrameId, &pose.header.frame_id);
    r.insert_sparse(Field::PosePosition, Value::RealList(vec![p.x, p.y, p.z]));
    r.insert_sparse(Field::PoseOrientation, Value::RealList(vec![q.x, q.y, q.z, q.w]));
    r.insert_sparse(Field::PoseCovariance, Value::RealList(cov.clone()));

    r.insert_sparse(Field::DescriptionId, Value::Integer(inst.description_id));
    r.insert_sparse(Field::Properties, Value::Map(inst.properties.clone()));
    put_tags(&mut r, &inst.tags);
    Ok(r)
}

pub fn instance_from_record(r: &Record) -> WorldObjectInstance {
    let position = r.real_list(Field::PosePosition);
    let orientation = r.real_list(Field::PoseOrientation);
    let component = |list: &[f64], i: usize| list.get(i).copied().unwrap_or(0.0);

    let mut covariance = r.real_list(Field::PoseCovariance).to_vec();
    covariance.resize(COVARIANCE_LEN, 0.0);

    WorldObjectInstance {
        instance_id: r.integer(Field::InstanceId),
        name: r.text(Field::Name).to_string(),
        creation: read_time(r, Field::Creation),
        update: read_time(r, Field::Update),
        expected_ttl: read_time(r, Field::ExpectedTtl),
        perceived_end: read_time(r, Field::PerceivedEnd),
        source: Source {
            origin: r.text(Field::SourceOrigin).to_string(),
            creator: r.text(Field::SourceCreator).to_string(),
        },
        pose: PoseWithCovarianceStamped {
            header: Header {
                seq: u32::try_from(r.integer(Field::PoseSeq)).unwrap_or(u32::MAX),
                stamp: read_time(r, Field::PoseStamp),
                frame_id: r.text(Field::PoseFrameId).to_string(),
            },
            position: Point {
                x: component(position, 0),
                y: component(position, 1),
                z: component(position, 2),
            },
            orientation: Quaternion {
                x: component(orientation, 0),
                y: component(orientation, 1),
                z: component(orientation, 2),
                w: component(orientation, 3),
            },
            covariance,
        },
        description_id: r.integer(Field::DescriptionId),
        properties: r.map(Field::Properties),
        tags: r.tags().to_vec(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptions and descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a description.  Its descriptors are stored separately.
pub fn description_to_record(desc: &WorldObjectDescription) -> Record {
    let mut r = Record::new();
    r.insert_sparse(Field::DescriptionId, Value::Integer(desc.description_id));
    put_text(&mut r, Field::Name, &desc.name);
    put_tags(&mut r, &desc.tags);
    r
}

pub fn description_from_record(r: &Record, descriptors: Vec<Descriptor>) -> WorldObjectDescription {
    WorldObjectDescription {
        description_id: r.integer(Field::DescriptionId),
        name: r.text(Field::Name).to_string(),
        tags: r.tags().to_vec(),
        descriptors,
    }
}

pub fn descriptor_to_record(d: &Descriptor) -> Record {
    let mut r = Record::new();
    r.insert_sparse(Field::DescriptorId, Value::Integer(d.descriptor_id));
    r.insert_sparse(Field::DescriptionId, Value::Integer(d.description_id));
    put_text(&mut r, Field::Type, &d.descriptor_type);
    put_text(&mut r, Field::Data, &d.data);
    put_text(&mut r, Field::Ref, &d.reference);
    put_tags(&mut r, &d.tags);
    r
}

pub fn descriptor_from_record(r: &Record) -> Descriptor {
    Descriptor {
        descriptor_id: r.integer(Field::DescriptorId),
        description_id: r.integer(Field::DescriptionId),
        descriptor_type: r.text(Field::Type).to_string(),
        data: r.text(Field::Data).to_string(),
        reference: r.text(Field::Ref).to_string(),
        tags: r.tags().to_vec(),
    }
}
