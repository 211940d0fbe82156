//! Unit tests for trace tree building.

use super::*;
use crate::config::EquipFunction;
use crate::model::{feature_map, ConnectionRecord};
use pretty_assertions::assert_eq;

fn config() -> NetworkConfig {
    NetworkConfig::default()
        .with_function("fiber_splitter", EquipFunction::Splitter)
        .with_function("fiber_connector", EquipFunction::Connector)
        .with_function("fiber_mux", EquipFunction::Mux)
}

fn features(extra: Vec<Feature>) -> FeatureMap {
    let mut all = vec![
        Feature::new("fiber_cable/1")
            .with_property("fiber_count", 2)
            .with_property("directed", true),
        Feature::new("fiber_cable/2")
            .with_property("fiber_count", 1)
            .with_property("directed", true),
        Feature::new("mywcom_fiber_segment/1").with_property("cable", "fiber_cable/1"),
        Feature::new("mywcom_fiber_segment/2").with_property("cable", "fiber_cable/2"),
        Feature::new("fiber_splitter/1")
            .with_property("n_fiber_in_ports", 1)
            .with_property("n_fiber_out_ports", 4)
            .with_property("housing", "fiber_shelf/1"),
        Feature::new("fiber_shelf/1").with_property("housing", "cabinet/1"),
        Feature::new("cabinet/1"),
        Feature::new("splice_closure/1"),
    ];
    all.extend(extra);
    feature_map(all.into_iter().map(Arc::new))
}

#[allow(clippy::too_many_arguments)]
fn record(
    urn: &str,
    from: &str,
    from_side: Side,
    from_pin: u32,
    to: &str,
    to_side: Side,
    to_pin: u32,
    housing: &str,
) -> Arc<ConnectionRecord> {
    Arc::new(ConnectionRecord {
        urn: urn.to_string(),
        in_object: from.to_string(),
        in_side: from_side,
        in_low: from_pin,
        in_high: from_pin,
        out_object: to.to_string(),
        out_side: to_side,
        out_low: to_pin,
        out_high: to_pin,
        housing: Some(housing.to_string()),
        root_housing: None,
        proposed: false,
        delta: None,
        delta_owner_title: None,
    })
}

fn conn(rec: Arc<ConnectionRecord>, features: &FeatureMap) -> Conn {
    Conn::new(rec, true, Some(features))
}

fn urns(tree: &PinTree) -> Vec<&str> {
    tree.walk().into_iter().map(PinTree::urn).collect()
}

fn seg_to_splitter(features: &FeatureMap) -> Conn {
    conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            1,
            "fiber_splitter/1",
            Side::In,
            1,
            "fiber_shelf/1",
        ),
        features,
    )
}

// ============================================================================
// Fan-out
// ============================================================================

#[test]
fn test_splitter_fans_out_to_every_out_port() {
    let features = features(vec![]);
    let conns = vec![seg_to_splitter(&features)];

    let outcome = build_trace_trees(&config(), &conns, &features);
    assert!(outcome.is_valid());

    // One tree per fiber of the root segment
    let trees = outcome.value;
    assert_eq!(trees.len(), 2);

    let fed = &trees[0];
    assert_eq!(fed.urn(), "mywcom_fiber_segment/1");
    assert_eq!(fed.out_pin, Some(1));
    assert_eq!(fed.in_pin, None);
    assert_eq!(fed.children.len(), 4);
    for (i, child) in fed.children.iter().enumerate() {
        assert_eq!(child.urn(), "fiber_splitter/1");
        assert_eq!(child.in_pin, Some(1));
        assert_eq!(child.out_pin, Some(i as u32 + 1));
        assert!(child.children.is_empty());
    }

    assert_eq!(trees[1].out_pin, Some(2));
    assert!(trees[1].children.is_empty());
}

#[test]
fn test_connector_passes_same_pin() {
    let features = features(vec![
        Feature::new("fiber_connector/1").with_property("n_fiber_ports", 4)
    ]);
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            2,
            "fiber_connector/1",
            Side::In,
            3,
            "cabinet/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    let child = &trees[1].children[0];
    assert_eq!(child.urn(), "fiber_connector/1");
    assert_eq!(child.in_pin, Some(3));
    assert_eq!(child.out_pin, Some(3));
}

#[test]
fn test_mux_combines_onto_first_out_pin() {
    let features = features(vec![Feature::new("fiber_mux/1")
        .with_property("n_fiber_in_ports", 8)
        .with_property("n_fiber_out_ports", 1)]);
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            1,
            "fiber_mux/1",
            Side::In,
            6,
            "cabinet/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    let child = &trees[0].children[0];
    assert_eq!((child.in_pin, child.out_pin), (Some(6), Some(1)));
}

#[test]
fn test_unknown_function_is_terminal_and_roots_its_own_trees() {
    let features = features(vec![
        Feature::new("fiber_ont/1").with_property("n_fiber_out_ports", 2)
    ]);
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            1,
            "fiber_ont/1",
            Side::In,
            1,
            "cabinet/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;

    let terminal = &trees[0].children[0];
    assert_eq!(terminal.urn(), "fiber_ont/1");
    assert_eq!(terminal.out_pin, None);
    assert!(terminal.children.is_empty());

    // Two segment trees, then one per out port of the terminal equipment
    assert_eq!(trees.len(), 4);
    assert_eq!(trees[2].urn(), "fiber_ont/1");
    assert_eq!(trees[3].out_pin, Some(2));
}

// ============================================================================
// Direction handling
// ============================================================================

#[test]
fn test_segment_passes_single_pin_to_segment() {
    let features = features(vec![]);
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            2,
            "mywcom_fiber_segment/2",
            Side::In,
            1,
            "splice_closure/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    assert_eq!(trees.len(), 2);

    let spliced = &trees[1];
    assert_eq!(urns(spliced), vec!["mywcom_fiber_segment/1", "mywcom_fiber_segment/2"]);
    let child = &spliced.children[0];
    assert_eq!((child.in_pin, child.out_pin), (Some(1), Some(1)));
    assert_eq!(
        child.cable.as_ref().map(|c| c.urn.as_str()),
        Some("fiber_cable/2")
    );
}

#[test]
fn test_undirected_cable_is_filed_on_logical_side() {
    let features = features(vec![Feature::new("fiber_cable/1")
        .with_property("fiber_count", 2)
        .with_property("directed", false)]);

    // Stored against the cable's 'in' side, but feeding the splitter input
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::In,
            1,
            "fiber_splitter/1",
            Side::In,
            1,
            "fiber_shelf/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    assert_eq!(trees[0].urn(), "mywcom_fiber_segment/1");
    assert_eq!(trees[0].children.len(), 4);
}

#[test]
fn test_connection_stored_backwards_is_reversed() {
    let features = features(vec![]);

    // Splitter output feeding segment 2, viewed from the segment end
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "fiber_splitter/1",
            Side::Out,
            3,
            "mywcom_fiber_segment/2",
            Side::In,
            1,
            "fiber_shelf/1",
        ),
        &features,
    )
    .reversed()];

    let trees = build_trace_trees(&config(), &conns, &features).value;

    // The splitter has no input and roots one tree per out port
    assert_eq!(trees.len(), 4);
    assert_eq!(trees[2].urn(), "fiber_splitter/1");
    assert_eq!(urns(&trees[2]), vec!["fiber_splitter/1", "mywcom_fiber_segment/2"]);
    assert!(trees[0].children.is_empty());
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_two_cycle_terminates_and_covers_every_feature() {
    let features = features(vec![
        Feature::new("fiber_connector/1").with_property("n_fiber_ports", 1),
        Feature::new("fiber_connector/2").with_property("n_fiber_ports", 1),
    ]);
    let conns = vec![
        conn(
            record(
                "mywcom_fiber_connection/1",
                "fiber_connector/1",
                Side::Out,
                1,
                "fiber_connector/2",
                Side::In,
                1,
                "cabinet/1",
            ),
            &features,
        ),
        conn(
            record(
                "mywcom_fiber_connection/2",
                "fiber_connector/2",
                Side::Out,
                1,
                "fiber_connector/1",
                Side::In,
                1,
                "cabinet/1",
            ),
            &features,
        ),
    ];

    let outcome = build_trace_trees(&config(), &conns, &features);
    assert!(outcome.is_valid());

    let trees = outcome.value;
    assert_eq!(trees.len(), 1);
    assert_eq!(
        urns(&trees[0]),
        vec!["fiber_connector/1", "fiber_connector/2", "fiber_connector/1"]
    );

    let cut = trees[0].walk()[2];
    assert!(cut.cycle);
    assert!(cut.children.is_empty());
    assert!(!trees[0].cycle);
}

#[test]
fn test_undirected_segment_loop_is_covered() {
    let features = features(vec![
        Feature::new("fiber_cable/1")
            .with_property("fiber_count", 1)
            .with_property("directed", false),
        Feature::new("mywcom_fiber_segment/3").with_property("cable", "fiber_cable/1"),
    ]);

    // Two segments of an undirected cable spliced end to end in a ring
    let conns = vec![
        conn(
            record(
                "mywcom_fiber_connection/1",
                "mywcom_fiber_segment/1",
                Side::Out,
                1,
                "mywcom_fiber_segment/3",
                Side::In,
                1,
                "splice_closure/1",
            ),
            &features,
        ),
        conn(
            record(
                "mywcom_fiber_connection/2",
                "mywcom_fiber_segment/3",
                Side::Out,
                1,
                "mywcom_fiber_segment/1",
                Side::In,
                1,
                "splice_closure/1",
            ),
            &features,
        ),
    ];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    assert_eq!(trees.len(), 1);

    let covered: HashSet<&str> = urns(&trees[0]).into_iter().collect();
    assert!(covered.contains("mywcom_fiber_segment/1"));
    assert!(covered.contains("mywcom_fiber_segment/3"));
    assert!(trees[0].walk().iter().any(|n| n.cycle));
}

// ============================================================================
// Soft failures
// ============================================================================

#[test]
fn test_unresolved_connection_is_skipped_and_reported() {
    let features = features(vec![]);
    let conns = vec![
        seg_to_splitter(&features),
        conn(
            record(
                "mywcom_fiber_connection/9",
                "mywcom_fiber_segment/99",
                Side::Out,
                1,
                "fiber_splitter/1",
                Side::In,
                1,
                "fiber_shelf/1",
            ),
            &features,
        ),
    ];

    let outcome = build_trace_trees(&config(), &conns, &features);
    assert!(!outcome.is_valid());
    assert_eq!(
        outcome.problems,
        vec![Problem::UnresolvedReference {
            record: "mywcom_fiber_connection/9".to_string(),
            urn: "mywcom_fiber_segment/99".to_string(),
        }]
    );
    assert_eq!(outcome.value.len(), 2);
}

#[test]
fn test_missing_cable_is_reported() {
    let features = features(vec![
        Feature::new("mywcom_fiber_segment/1").with_property("cable", "fiber_cable/404")
    ]);
    let conns = vec![seg_to_splitter(&features)];

    let outcome = build_trace_trees(&config(), &conns, &features);
    assert_eq!(
        outcome.problems,
        vec![Problem::MissingCable {
            segment: "mywcom_fiber_segment/1".to_string(),
            cable: "fiber_cable/404".to_string(),
        }]
    );
    // The segment has no known fibers; the splitter roots its own trees
    assert_eq!(outcome.value.len(), 4);
    assert!(outcome.value.iter().all(|t| t.urn() == "fiber_splitter/1"));
}

#[test]
fn test_conns_are_resolved_by_builder() {
    let features = features(vec![]);
    let rec = record(
        "mywcom_fiber_connection/1",
        "mywcom_fiber_segment/1",
        Side::Out,
        1,
        "fiber_splitter/1",
        Side::In,
        1,
        "fiber_shelf/1",
    );
    let conns = vec![Conn::new(rec, true, None)];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    assert_eq!(trees[0].children.len(), 4);
}

// ============================================================================
// Housing and equipment nodes
// ============================================================================

#[test]
fn test_housing_of_segment_feeding_equipment_skips_splice_layer() {
    let features = features(vec![]);
    let conns = vec![seg_to_splitter(&features)];

    let trees = build_trace_trees(&config(), &conns, &features).value;

    let housing = |tree: &PinTree| tree.housing.as_ref().map(|h| h.urn.clone());
    assert_eq!(housing(&trees[0]), Some("cabinet/1".to_string()));
    assert_eq!(
        housing(&trees[0].children[0]),
        Some("fiber_shelf/1".to_string())
    );
    assert_eq!(housing(&trees[1]), None);
}

#[test]
fn test_housing_of_segment_feeding_segment_is_splice() {
    let features = features(vec![]);
    let conns = vec![conn(
        record(
            "mywcom_fiber_connection/1",
            "mywcom_fiber_segment/1",
            Side::Out,
            1,
            "mywcom_fiber_segment/2",
            Side::In,
            1,
            "splice_closure/1",
        ),
        &features,
    )];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    assert_eq!(
        trees[0].housing.as_ref().map(|h| h.urn.as_str()),
        Some("splice_closure/1")
    );
}

#[test]
fn test_equipment_children_carry_equip_node() {
    let features = features(vec![]);
    let conns = vec![(
        seg_to_splitter(&features),
        Some("fiber_shelf/1".to_string()),
    )];

    let trees = TraceBuilder::new(&config())
        .build_housed(conns, &features)
        .value;

    assert_eq!(trees[0].equip_node, None);
    assert!(trees[0]
        .children
        .iter()
        .all(|c| c.equip_node.as_deref() == Some("fiber_shelf/1")));
}

#[test]
fn test_pin_tree_serializes_urns() {
    let features = features(vec![]);
    let conns = vec![seg_to_splitter(&features)];

    let trees = build_trace_trees(&config(), &conns, &features).value;
    let json = serde_json::to_value(&trees[0]).unwrap();

    assert_eq!(json["feature"], "mywcom_fiber_segment/1");
    assert_eq!(json["cable"], "fiber_cable/1");
    assert_eq!(json["children"][0]["conn"]["to_ref"], "fiber_splitter/1");
    assert_eq!(json["children"][0]["housing"], "fiber_shelf/1");
}
