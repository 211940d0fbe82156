//! Integration tests for the full snapshot → content → tree flow
//!
//! A small access network is written to a snapshot file and run through
//! containment, trace and tick mark reconciliation, checking that the
//! components agree with each other.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use comms_model::config::{EquipFunction, NetworkConfig};
use comms_model::containment::{ContainmentType, NodeKind};
use comms_model::error::SnapshotError;
use comms_model::{
    build_containment_tree, reconcile_tick_mark, ContainmentInput, FeatureSource, LengthUnit,
    Side, SnapshotSource, StructureContent, TickField,
};

/// Cabinet 1 holds a 1:2 splitter. The feeder cable arrives from the
/// exchange and feeds the splitter; the drop cable leaves towards a home.
fn snapshot() -> serde_json::Value {
    json!({
        "features": [
            { "urn": "cabinet/1" },
            {
                "urn": "fiber_splitter/1",
                "properties": {
                    "housing": "cabinet/1",
                    "root_housing": "cabinet/1",
                    "n_fiber_in_ports": 1,
                    "n_fiber_out_ports": 2
                }
            },
            {
                "urn": "fiber_cable/1",
                "properties": { "name": "feeder", "fiber_count": 2, "directed": true }
            },
            {
                "urn": "fiber_cable/2",
                "properties": { "name": "drop", "fiber_count": 2, "directed": true }
            },
            {
                "urn": "mywcom_fiber_segment/1",
                "properties": {
                    "cable": "fiber_cable/1",
                    "directed": true,
                    "in_structure": "exchange/1",
                    "out_structure": "cabinet/1",
                    "out_tick": 1500
                },
                "geom_length": 420.0
            },
            {
                "urn": "mywcom_fiber_segment/2",
                "properties": {
                    "cable": "fiber_cable/2",
                    "directed": true,
                    "in_structure": "cabinet/1",
                    "out_structure": "home/1"
                },
                "geom_length": 35.0
            }
        ],
        "connections": [
            {
                "urn": "mywcom_fiber_connection/1",
                "in_object": "mywcom_fiber_segment/1",
                "in_side": "out",
                "in_low": 1,
                "in_high": 1,
                "out_object": "fiber_splitter/1",
                "out_side": "in",
                "out_low": 1,
                "out_high": 1,
                "housing": "fiber_splitter/1",
                "root_housing": "cabinet/1"
            },
            {
                "urn": "mywcom_fiber_connection/2",
                "in_object": "fiber_splitter/1",
                "in_side": "out",
                "in_low": 1,
                "in_high": 2,
                "out_object": "mywcom_fiber_segment/2",
                "out_side": "in",
                "out_low": 1,
                "out_high": 2,
                "housing": "fiber_splitter/1",
                "root_housing": "cabinet/1"
            }
        ]
    })
}

fn write_snapshot(value: &serde_json::Value) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    (dir, path)
}

fn config() -> NetworkConfig {
    NetworkConfig::default().with_function("fiber_splitter", EquipFunction::Splitter)
}

#[test]
fn test_containment_from_snapshot_file() {
    let (_dir, path) = write_snapshot(&snapshot());
    let source = SnapshotSource::from_path(&path).unwrap();
    let config = config();

    let input = ContainmentInput::gather(&source, &config, "cabinet/1").unwrap();
    let outcome = build_containment_tree(&config, input);
    assert!(outcome.is_valid());

    let root = outcome.value;
    assert_eq!(root.kind, NodeKind::Structure);
    assert_eq!(root.child_urns(), vec!["fiber_splitter/1"]);

    // Both cables are shown where their connections are housed
    let splitter = &root.children[0];
    assert_eq!(splitter.child_urns(), vec!["fiber_cable/1", "fiber_cable/2"]);

    let feeder_end = &splitter.children[0].children[0];
    assert_eq!(feeder_end.urn(), "mywcom_fiber_segment/1");
    assert_eq!(feeder_end.side, Some(Side::Out));
    assert_eq!(feeder_end.n_connected, Some(1));
}

#[test]
fn test_trace_through_splitter() {
    let (_dir, path) = write_snapshot(&snapshot());
    let source = SnapshotSource::from_path(&path).unwrap();
    let config = config();

    let input = ContainmentInput::gather(&source, &config, "cabinet/1").unwrap();
    let content = StructureContent::new(&config, input);
    let equip_tree = content.equipment_tree();
    assert!(equip_tree.is_valid());

    let outcome = equip_tree.value.trace_trees(&config);
    assert!(outcome.is_valid());
    let trees = outcome.value;

    // One tree per feeder fiber, only fiber 1 is connected
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[0].urn(), "mywcom_fiber_segment/1");
    assert_eq!(trees[0].out_pin, Some(1));
    assert!(trees[1].children.is_empty());

    let split = &trees[0].children;
    assert_eq!(split.len(), 2);
    for (i, branch) in split.iter().enumerate() {
        let pin = i as u32 + 1;
        assert_eq!(branch.urn(), "fiber_splitter/1");
        assert_eq!(branch.out_pin, Some(pin));
        assert_eq!(branch.equip_node.as_deref(), Some("fiber_splitter/1"));
        assert_eq!(branch.children[0].urn(), "mywcom_fiber_segment/2");
        assert_eq!(branch.children[0].in_pin, Some(pin));
    }

    // Both cables reach the splitter through its port connections
    let splitter = equip_tree.value.subtree_for("fiber_splitter/1").unwrap();
    assert_eq!(
        splitter.cables(ContainmentType::Implicit),
        vec!["fiber_cable/1", "fiber_cable/2"]
    );
    assert_eq!(splitter.pins(Side::Out).unwrap().n_connected, 2);
}

#[test]
fn test_tick_mark_calibrates_feeder_length() {
    let (_dir, path) = write_snapshot(&snapshot());
    let source = SnapshotSource::from_path(&path).unwrap();

    let update = reconcile_tick_mark(
        &source,
        "mywcom_fiber_segment/1",
        Some(1000),
        TickField::InTick,
        1.0,
        LengthUnit::Meter,
    )
    .unwrap();

    let seg = update.segment("mywcom_fiber_segment/1").unwrap();
    assert_eq!(seg.tick(Side::In), Some(1000));
    assert_eq!(seg.length(), Some(500.0));

    // The source itself is left untouched
    let stored = source.feature_by_urn("mywcom_fiber_segment/1").unwrap();
    assert_eq!(stored.length(), None);
}

#[test]
fn test_duplicate_urn_is_rejected() {
    let mut value = snapshot();
    let features = value["features"].as_array_mut().unwrap();
    features.push(json!({ "urn": "cabinet/1" }));
    let (_dir, path) = write_snapshot(&value);

    let result = SnapshotSource::from_path(&path);
    assert!(matches!(
        result,
        Err(SnapshotError::DuplicateUrn { urn }) if urn == "cabinet/1"
    ));
}

#[test]
fn test_malformed_snapshot_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"features\": [").unwrap();

    assert!(matches!(
        SnapshotSource::from_path(&path),
        Err(SnapshotError::Json(_))
    ));
    assert!(matches!(
        SnapshotSource::from_path(dir.path().join("missing.json")),
        Err(SnapshotError::Io(_))
    ));
}

#[test]
fn test_cli_containment_over_snapshot_file() {
    use clap::Parser;
    use comms_model::cli::{execute_command, Cli};
    use comms_model::Config;

    let (_dir, path) = write_snapshot(&snapshot());
    let args: Vec<std::ffi::OsString> = vec![
        "comms-model".into(),
        "--snapshot".into(),
        path.clone().into(),
        "--compact".into(),
        "containment".into(),
        "cabinet/1".into(),
        "--view".into(),
        "cable".into(),
    ];
    let cli = Cli::try_parse_from(args).unwrap();

    let source = SnapshotSource::from_path(&cli.snapshot).unwrap();
    let result = execute_command(cli.command, &source, &Config::default(), cli.compact);
    assert_eq!(result.exit_code, 0);

    let json: serde_json::Value = serde_json::from_str(&result.message).unwrap();
    let cables = json["value"]["children"].as_array().unwrap();
    assert_eq!(cables.len(), 2);
    assert_eq!(cables[0]["feature"], "fiber_cable/1");
    assert_eq!(cables[0]["children"][0]["feature"], "mywcom_fiber_segment/1");
}
