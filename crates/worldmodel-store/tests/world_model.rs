//! End-to-end behaviour of the boundary service, run against every backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use worldmodel_store::backend::{Backend, MemoryBackend};
use worldmodel_store::codec::{instance_from_record, instance_to_record};
use worldmodel_store::sqlite::SqliteBackend;
use worldmodel_store::{DescriptorCandidate, WorldModel};
use worldmodel_types::{
    Descriptor, Header, Point, PoseWithCovarianceStamped, Quaternion, Source, Time,
    WorldModelError, WorldObjectDescription, WorldObjectInstance,
};

fn backends() -> Vec<(&'static str, Arc<dyn Backend>)> {
    let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let sqlite: Arc<dyn Backend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn tagged(name: &str, tags: &[&str]) -> WorldObjectInstance {
    WorldObjectInstance {
        name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

fn grid_description(data: &str) -> WorldObjectDescription {
    WorldObjectDescription {
        name: "/map".to_string(),
        tags: vec!["map".to_string()],
        descriptors: vec![Descriptor {
            descriptor_type: "grid".to_string(),
            reference: r#"{"topic":"/map"}"#.to_string(),
            data: data.to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn instance_ids(world: &WorldModel, tags: &[&str]) -> Vec<u64> {
    world
        .search_instances_by_tags(tags)
        .unwrap()
        .into_iter()
        .map(|i| i.instance_id)
        .collect()
}

/// The ingestion path without the atomic primitive: dedup, then create.
fn ingest(world: &WorldModel, data: &str, consult_dedup: bool) -> u64 {
    let candidate = DescriptorCandidate::parse("grid", "/map", data).unwrap();
    if consult_dedup {
        if let Some(id) = world.find_equivalent_description("map", &candidate).unwrap() {
            return id;
        }
    }
    world.create_description(&grid_description(data)).unwrap()
}

#[test]
fn sparse_round_trip_maps_unset_fields_to_zero() {
    let mut covariance = vec![0.0; 36];
    covariance[7] = 0.25;
    let inst = WorldObjectInstance {
        name: "Mug".to_string(),
        expected_ttl: Time::new(30, 500_000_000),
        source: Source {
            origin: "/camera".to_string(),
            creator: String::new(),
        },
        pose: PoseWithCovarianceStamped {
            header: Header {
                seq: 4,
                stamp: Time::ZERO,
                frame_id: "odom".to_string(),
            },
            position: Point { x: 1.5, y: 0.0, z: -2.0 },
            orientation: Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 },
            covariance,
        },
        properties: BTreeMap::from([("colour".to_string(), "blue".to_string())]),
        tags: vec!["object".to_string()],
        ..Default::default()
    };

    let back = instance_from_record(&instance_to_record(&inst).unwrap());
    assert_eq!(back, inst);

    let empty = instance_from_record(&instance_to_record(&WorldObjectInstance::default()).unwrap());
    assert!(empty.creation.is_zero());
    assert_eq!(empty.pose.covariance.len(), 36);
}

#[test]
fn robot_scenario() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let id = world.create_instance(&tagged("Robot", &["robot", "lab1"])).unwrap();

        let found = world.search_instances_by_tags(&["robot"]).unwrap();
        assert_eq!(found.len(), 1, "{label}");
        assert_eq!(found[0].instance_id, id, "{label}");
        assert_eq!(found[0].creation, found[0].update, "{label}");
        assert_eq!(found[0].pose, PoseWithCovarianceStamped::default(), "{label}");
    }
}

#[test]
fn non_finite_pose_is_rejected_and_leaves_search_intact() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let ok = world.create_instance(&tagged("ok", &["lab"])).unwrap();

        let mut bad = tagged("bad", &["lab"]);
        bad.pose.covariance[0] = f64::NAN;
        let err = world.create_instance(&bad).unwrap_err();
        assert!(matches!(err, WorldModelError::Codec(_)), "{label}: {err:?}");

        let mut drifting = tagged("drifting", &["lab"]);
        drifting.pose.position.x = f64::INFINITY;
        assert!(world.update_instance(ok, &drifting).is_err(), "{label}");

        assert_eq!(instance_ids(&world, &["lab"]), vec![ok], "{label}");
        assert_eq!(world.get_instance(ok).unwrap().unwrap().name, "ok", "{label}");
    }
}

#[test]
fn search_superset_law() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let a = world.create_instance(&tagged("a", &["robot", "lab1"])).unwrap();
        let b = world.create_instance(&tagged("b", &["robot"])).unwrap();
        world.create_instance(&tagged("c", &["lab1", "chair"])).unwrap();
        world.create_instance(&tagged("d", &[])).unwrap();

        assert_eq!(instance_ids(&world, &["robot"]), vec![a, b], "{label}");
        assert_eq!(instance_ids(&world, &["lab1", "robot"]), vec![a], "{label}");
        assert_eq!(instance_ids(&world, &["robot", "robot"]), vec![a, b], "{label}");
        assert!(instance_ids(&world, &["robot", "kitchen"]).is_empty(), "{label}");
        assert!(instance_ids(&world, &[]).is_empty(), "{label}");
    }
}

#[test]
fn update_is_monotonic_and_path_id_wins() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let id = world.create_instance(&tagged("Robot", &["robot"])).unwrap();
        let other = world.create_instance(&tagged("Other", &[])).unwrap();
        let creation = world.get_instance(id).unwrap().unwrap().creation;

        let mut previous = creation;
        for step in 0..3 {
            let patch = WorldObjectInstance {
                instance_id: other,
                name: format!("Robot-{step}"),
                ..Default::default()
            };
            assert!(world.update_instance(id, &patch).unwrap(), "{label}");
            let got = world.get_instance(id).unwrap().unwrap();
            assert_eq!(got.instance_id, id, "{label}");
            assert_eq!(got.creation, creation, "{label}");
            assert!(got.update >= previous, "{label}");
            previous = got.update;
        }
        assert_eq!(world.get_instance(other).unwrap().unwrap().name, "Other", "{label}");
    }
}

#[test]
fn remove_instance_reports_outcome() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let id = world.create_instance(&tagged("x", &["t"])).unwrap();
        assert!(world.remove_instance(id).unwrap(), "{label}");
        assert!(!world.remove_instance(id).unwrap(), "{label}");
        assert!(world.search_instances_by_tags(&["t"]).unwrap().is_empty(), "{label}");
    }
}

#[test]
fn dedup_matches_structurally_equal_map() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let first = ingest(&world, r#"{"w":10}"#, true);
        let second = ingest(&world, r#"{ "w" : 10 }"#, true);
        assert_eq!(first, second, "{label}");
        assert_eq!(world.search_descriptions_by_tags(&["map"]).unwrap().len(), 1, "{label}");
    }
}

#[test]
fn bypassing_dedup_duplicates_descriptions() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let first = ingest(&world, r#"{"w":10}"#, false);
        let second = ingest(&world, r#"{"w":10}"#, false);
        assert_ne!(first, second, "{label}");
        assert_eq!(world.search_descriptions_by_tags(&["map"]).unwrap().len(), 2, "{label}");
    }
}

#[test]
fn dedup_survives_malformed_stored_descriptors() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        world.create_description(&grid_description("{broken")).unwrap();
        let good = world.create_description(&grid_description(r#"{"w":10}"#)).unwrap();

        let candidate = DescriptorCandidate::new("grid", "/map", json!({"w": 10}));
        let found = world.find_equivalent_description("map", &candidate).unwrap();
        assert_eq!(found, Some(good), "{label}");
    }
}

#[test]
fn unknown_description_is_not_found() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let (desc, found) = world.get_description(12345).unwrap();
        assert!(!found, "{label}");
        assert_eq!(desc, WorldObjectDescription::default(), "{label}");
    }
}

#[test]
fn description_descriptors_keep_insertion_order() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let mut desc = grid_description(r#"{"w":1}"#);
        for kind in ["cloud", "image"] {
            desc.descriptors.push(Descriptor {
                descriptor_type: kind.to_string(),
                ..Default::default()
            });
        }
        let id = world.create_description(&desc).unwrap();

        let (got, found) = world.get_description(id).unwrap();
        assert!(found, "{label}");
        let kinds: Vec<&str> = got.descriptors.iter().map(|d| d.descriptor_type.as_str()).collect();
        assert_eq!(kinds, vec!["grid", "cloud", "image"], "{label}");
        assert!(got.descriptors.iter().all(|d| d.description_id == id), "{label}");
    }
}

#[test]
fn remove_description_cascades() {
    for (label, backend) in backends() {
        let world = WorldModel::new(backend);
        let id = world.create_description(&grid_description(r#"{"w":10}"#)).unwrap();
        assert!(world.remove_description(id).unwrap(), "{label}");

        let candidate = DescriptorCandidate::new("grid", "/map", json!({"w": 10}));
        assert_eq!(world.find_equivalent_description("map", &candidate).unwrap(), None, "{label}");
        assert!(!world.remove_description(id).unwrap(), "{label}");
    }
}

#[test]
fn concurrent_find_or_create_yields_one_description() {
    let world = Arc::new(WorldModel::new(Arc::new(SqliteBackend::open_in_memory().unwrap())));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let world = Arc::clone(&world);
            std::thread::spawn(move || {
                let candidate = DescriptorCandidate::new("grid", "/map", json!({"w": 10}));
                world
                    .find_or_create_description("map", &candidate, &grid_description(r#"{"w":10}"#))
                    .unwrap()
                    .0
            })
        })
        .collect();

    let ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(world.search_descriptions_by_tags(&["map"]).unwrap().len(), 1);
}
