//! Containment trees: what is inside what.
//!
//! [`StructureContent`] holds everything housed in, or passing through, one
//! structure (a manhole, cabinet, building, ...) and derives the trees the
//! structure views are built from:
//!
//! - [`StructureContent::cable_tree`]: structure, cable, ordered segments
//! - [`StructureContent::conduit_tree`]: structure, conduit, segments
//! - [`StructureContent::equipment_tree`]: structure and equipment with their pins
//! - [`StructureContent::containment_tree`]: everything in one hierarchy
//!
//! Unresolvable references are reported as [`Problem`]s alongside the tree;
//! the offending feature is left out.

mod equipment;
mod ordering;
mod route;


pub use equipment::{ContainmentType, EquipNode, PinSet, SegSide, SegSides};
pub use route::{build_route_tree, RouteContent, RouteInput};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EquipFunction, NetworkConfig};
use crate::conn::Conn;
use crate::error::{push_unique, AppError, AppResult, Outcome, Problem};
use crate::model::{
    serialize_opt_urn, serialize_urn, CircuitInfo, ConnectionRecord, Feature, FeatureMap, Side,
};
use crate::pins::PinRange;
use crate::source::{FeatureSource, Filter};

use ordering::ordered_seg_nodes;

/// Where a cable segment sits relative to a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructSide {
    /// Arrives from outside, ends at the structure.
    In,
    /// Starts at the structure, leaves to the outside.
    Out,
    /// Starts and ends at the structure.
    Int,
}

impl StructSide {
    /// Segment ends that lie at the structure.
    pub fn seg_ends(self) -> &'static [Side] {
        match self {
            StructSide::In => &[Side::Out],
            StructSide::Out => &[Side::In],
            StructSide::Int => &Side::BOTH,
        }
    }
}

/// Kind of a [`ContainmentNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The structure the tree is built for.
    Structure,
    /// The route the tree is built for.
    Route,
    Equipment,
    Conduit,
    Cable,
    /// One end of a segment.
    Segment,
    /// A segment with both ends in the structure.
    InternalSegment,
}

/// A node of a containment tree.
#[derive(Debug, Clone, Serialize)]
pub struct ContainmentNode {
    #[serde(serialize_with = "serialize_urn")]
    pub feature: Arc<Feature>,
    pub kind: NodeKind,
    #[serde(serialize_with = "serialize_opt_urn", skip_serializing_if = "Option::is_none")]
    pub cable: Option<Arc<Feature>>,
    /// Structure side of the cable run (segments only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cable_side: Option<Side>,
    /// Segment end at the structure (segments only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pins: Option<PinRange>,
    /// Connected pins, proposed connections excluded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_connected: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conns: Vec<Conn>,
    #[serde(serialize_with = "serialize_opt_urn", skip_serializing_if = "Option::is_none")]
    pub housing: Option<Arc<Feature>>,
    /// Slack equipment holding an internal segment.
    #[serde(serialize_with = "serialize_opt_urn", skip_serializing_if = "Option::is_none")]
    pub slack: Option<Arc<Feature>>,
    #[serde(serialize_with = "serialize_opt_urn", skip_serializing_if = "Option::is_none")]
    pub conduit_run: Option<Arc<Feature>>,
    /// The conduit continuing this one on the other side of the structure.
    #[serde(serialize_with = "serialize_opt_urn", skip_serializing_if = "Option::is_none")]
    pub pass_through_conduit: Option<Arc<Feature>>,
    /// Circuits running on the segment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub circuits: Vec<Arc<CircuitInfo>>,
    pub is_internal: bool,
    pub children: Vec<ContainmentNode>,
}

impl ContainmentNode {
    /// A bare node for `feature`.
    pub fn feature_node(feature: Arc<Feature>, kind: NodeKind) -> Self {
        Self {
            feature,
            kind,
            cable: None,
            cable_side: None,
            side: None,
            pins: None,
            n_connected: None,
            conns: Vec::new(),
            housing: None,
            slack: None,
            conduit_run: None,
            pass_through_conduit: None,
            circuits: Vec::new(),
            is_internal: false,
            children: Vec::new(),
        }
    }

    /// A node for one end of a segment.
    pub fn seg_node(pins: SegPins) -> Self {
        let mut node = Self::feature_node(pins.feature, NodeKind::Segment);
        node.cable = pins.cable;
        node.cable_side = Some(pins.cable_side);
        node.side = Some(pins.seg_side);
        node.pins = pins.pins;
        node.n_connected = Some(pins.n_connected);
        node.conns = pins.conns;
        node.housing = pins.housing;
        node.slack = pins.slack;
        node.circuits = pins.circuits;
        node
    }

    /// A pseudo-parent for a segment internal to the structure, with one child per end.
    pub fn internal_node(pins: InternalSegPins) -> Self {
        let mut node = Self::feature_node(pins.feature, NodeKind::InternalSegment);
        node.cable = pins.cable;
        node.housing = pins.housing;
        node.slack = pins.slack;
        node.is_internal = true;
        node.children = vec![Self::seg_node(pins.in_pins), Self::seg_node(pins.out_pins)];
        node
    }

    /// URN of the node's feature.
    pub fn urn(&self) -> &str {
        &self.feature.urn
    }

    /// URNs of the direct children, in order.
    pub fn child_urns(&self) -> Vec<&str> {
        self.children.iter().map(ContainmentNode::urn).collect()
    }

    /// First node in the subtree (including self) for `urn`, depth first.
    pub fn find(&self, urn: &str) -> Option<&ContainmentNode> {
        if self.urn() == urn {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(urn))
    }

    fn find_mut(&mut self, urn: &str) -> Option<&mut ContainmentNode> {
        if self.urn() == urn {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(urn))
    }
}

/// Tree nodes that can be assembled from a parent lookup.
trait Nest: Sized {
    fn push_child(&mut self, child: Self);
}

impl Nest for ContainmentNode {
    fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }
}

/// Take the node for `urn` out of `nodes` with its descendants attached.
///
/// Each node is used once, so housing loops cannot recurse forever.
fn assemble<N: Nest>(
    urn: &str,
    nodes: &mut HashMap<String, N>,
    children: &HashMap<String, Vec<String>>,
) -> Option<N> {
    let mut node = nodes.remove(urn)?;
    for child_urn in children.get(urn).into_iter().flatten() {
        if let Some(child) = assemble(child_urn, nodes, children) {
            node.push_child(child);
        }
    }
    Some(node)
}

/// Pins and connections on the end of a segment that lies at a structure.
#[derive(Debug, Clone, Serialize)]
pub struct SegPins {
    #[serde(serialize_with = "serialize_urn")]
    pub feature: Arc<Feature>,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub cable: Option<Arc<Feature>>,
    /// Structure side of the cable run.
    pub cable_side: Side,
    /// Segment end the pins are on.
    pub seg_side: Side,
    /// Fibers or pairs of the cable (unknown when the cable is missing).
    pub pins: Option<PinRange>,
    pub conns: Vec<Conn>,
    pub n_connected: u32,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub housing: Option<Arc<Feature>>,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub slack: Option<Arc<Feature>>,
    pub circuits: Vec<Arc<CircuitInfo>>,
}

/// Pins on both ends of a segment internal to a structure.
#[derive(Debug, Clone, Serialize)]
pub struct InternalSegPins {
    #[serde(serialize_with = "serialize_urn")]
    pub feature: Arc<Feature>,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub cable: Option<Arc<Feature>>,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub housing: Option<Arc<Feature>>,
    #[serde(serialize_with = "serialize_opt_urn")]
    pub slack: Option<Arc<Feature>>,
    pub in_pins: SegPins,
    pub out_pins: SegPins,
}

/// Segment pins at a structure, grouped by [`StructSide`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegPinSets {
    pub incoming: Vec<SegPins>,
    pub outgoing: Vec<SegPins>,
    pub internal: Vec<InternalSegPins>,
}

impl SegPinSets {
    /// Pins of the segments arriving (`In`) or leaving (`Out`).
    pub fn on(&self, side: Side) -> &[SegPins] {
        match side {
            Side::In => &self.incoming,
            Side::Out => &self.outgoing,
        }
    }
}

/// Segments at a structure grouped by [`StructSide`].
#[derive(Debug, Clone, Default)]
pub struct SegsBySide {
    pub incoming: Vec<Arc<Feature>>,
    pub outgoing: Vec<Arc<Feature>>,
    pub internal: Vec<Arc<Feature>>,
}

impl SegsBySide {
    /// Segments on `side`.
    pub fn get(&self, side: StructSide) -> &[Arc<Feature>] {
        match side {
            StructSide::In => &self.incoming,
            StructSide::Out => &self.outgoing,
            StructSide::Int => &self.internal,
        }
    }
}

/// Features housed in or passing through one structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentInput {
    /// The structure.
    pub root: Feature,
    #[serde(default)]
    pub equip: Vec<Feature>,
    #[serde(default)]
    pub conduits: Vec<Feature>,
    #[serde(default)]
    pub conduit_runs: Vec<Feature>,
    #[serde(default)]
    pub cables: Vec<Feature>,
    #[serde(default)]
    pub cable_segs: Vec<Feature>,
    #[serde(default)]
    pub conns: Vec<ConnectionRecord>,
    /// Circuits on the segments.
    #[serde(default)]
    pub seg_circuits: Vec<CircuitInfo>,
    /// Circuits on equipment ports.
    #[serde(default)]
    pub port_circuits: Vec<CircuitInfo>,
}

impl ContainmentInput {
    /// Collect the content of structure `root_urn` from `source`.
    pub fn gather<S>(source: &S, config: &NetworkConfig, root_urn: &str) -> AppResult<Self>
    where
        S: FeatureSource + ?Sized,
    {
        let root = source
            .feature_by_urn(root_urn)
            .ok_or_else(|| AppError::NotFound {
                urn: root_urn.to_string(),
            })?;

        let at_root = Filter::AnyOf(vec![
            Filter::field_eq("root_housing", root_urn),
            Filter::field_eq("in_structure", root_urn),
            Filter::field_eq("out_structure", root_urn),
        ]);

        let mut cable_segs = Vec::new();
        for seg_type in config.segment_types() {
            cable_segs.extend(source.features(seg_type, &at_root));
        }

        let mut conduits = Vec::new();
        for conduit_type in &config.conduit_types {
            conduits.extend(source.features(conduit_type, &at_root));
        }

        let equip: Vec<Arc<Feature>> = source
            .features_matching(&Filter::field_eq("root_housing", root_urn))
            .into_iter()
            .filter(|f| {
                !(config.is_segment(&f.urn)
                    || config.is_conduit(&f.urn)
                    || config.is_connection(&f.urn))
            })
            .collect();

        let cables = lookup_all(source, cable_segs.iter().filter_map(|s| s.cable()));
        let conduit_runs = lookup_all(source, conduits.iter().filter_map(|c| c.str_prop("conduit_run")));

        let conns = source.connections(&Filter::AnyOf(vec![
            Filter::field_eq("root_housing", root_urn),
            Filter::field_eq("housing", root_urn),
        ]));

        let seg_circuits = gather_circuits(source, &cable_segs);
        let port_circuits = gather_circuits(source, &equip);

        debug!(
            root = %root_urn,
            equip = equip.len(),
            segs = cable_segs.len(),
            conns = conns.len(),
            circuits = seg_circuits.len() + port_circuits.len(),
            "Gathered structure content"
        );

        Ok(Self {
            root: root.as_ref().clone(),
            equip: owned(equip),
            conduits: owned(conduits),
            conduit_runs: owned(conduit_runs),
            cables: owned(cables),
            cable_segs: owned(cable_segs),
            conns: conns.iter().map(|c| c.as_ref().clone()).collect(),
            seg_circuits,
            port_circuits,
        })
    }
}

/// Circuits running on any of `objects`.
fn gather_circuits<S>(source: &S, objects: &[Arc<Feature>]) -> Vec<CircuitInfo>
where
    S: FeatureSource + ?Sized,
{
    if objects.is_empty() {
        return Vec::new();
    }
    let filter = Filter::AnyOf(
        objects
            .iter()
            .map(|f| Filter::field_eq("object", &f.urn))
            .collect(),
    );
    source
        .circuits(&filter)
        .iter()
        .map(|c| c.as_ref().clone())
        .collect()
}

/// Circuits keyed by the URN of the object they run on.
fn circuits_by_object(
    circuits: impl IntoIterator<Item = CircuitInfo>,
) -> HashMap<String, Vec<Arc<CircuitInfo>>> {
    let mut by_object: HashMap<String, Vec<Arc<CircuitInfo>>> = HashMap::new();
    for info in circuits {
        by_object
            .entry(info.object.clone())
            .or_default()
            .push(Arc::new(info));
    }
    by_object
}

/// Distinct features for `urns`, in first-reference order.
fn lookup_all<'u, S>(source: &S, urns: impl Iterator<Item = &'u str>) -> Vec<Arc<Feature>>
where
    S: FeatureSource + ?Sized,
{
    let mut seen = HashSet::new();
    urns.filter(|urn| seen.insert(*urn))
        .filter_map(|urn| source.feature_by_urn(urn))
        .collect()
}

fn owned(features: Vec<Arc<Feature>>) -> Vec<Feature> {
    features.iter().map(|f| f.as_ref().clone()).collect()
}

fn share(features: &mut FeatureMap, list: Vec<Feature>) -> Vec<Arc<Feature>> {
    list.into_iter()
        .map(|f| {
            let f = Arc::new(f);
            features.insert(f.urn.clone(), Arc::clone(&f));
            f
        })
        .collect()
}

/// Build the full containment tree of a structure.
pub fn build_containment_tree(
    config: &NetworkConfig,
    input: ContainmentInput,
) -> Outcome<ContainmentNode> {
    StructureContent::new(config, input).containment_tree()
}

/// The content of one structure.
#[derive(Debug, Clone)]
pub struct StructureContent<'a> {
    config: &'a NetworkConfig,
    root: Arc<Feature>,
    features: FeatureMap,
    equips: Vec<Arc<Feature>>,
    conduits: Vec<Arc<Feature>>,
    cables: Vec<Arc<Feature>>,
    segs: Vec<Arc<Feature>>,
    conns: Vec<Arc<ConnectionRecord>>,
    circuits: HashMap<String, Vec<Arc<CircuitInfo>>>,
}

impl<'a> StructureContent<'a> {
    /// Index the content of a structure.
    pub fn new(config: &'a NetworkConfig, input: ContainmentInput) -> Self {
        let mut features = FeatureMap::new();
        let root = Arc::new(input.root);
        features.insert(root.urn.clone(), Arc::clone(&root));
        let equips = share(&mut features, input.equip);
        let conduits = share(&mut features, input.conduits);
        share(&mut features, input.conduit_runs);
        let cables = share(&mut features, input.cables);
        let segs = share(&mut features, input.cable_segs);

        Self {
            config,
            root,
            features,
            equips,
            conduits,
            cables,
            segs,
            conns: input.conns.into_iter().map(Arc::new).collect(),
            circuits: circuits_by_object(input.seg_circuits.into_iter().chain(input.port_circuits)),
        }
    }

    /// URN of the structure.
    pub fn urn(&self) -> &str {
        &self.root.urn
    }

    /// The structure.
    pub fn root(&self) -> &Arc<Feature> {
        &self.root
    }

    /// Every known feature, keyed by URN.
    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    fn feature(&self, urn: Option<&str>) -> Option<Arc<Feature>> {
        urn.and_then(|urn| self.features.get(urn)).cloned()
    }

    /// Circuits running on the segment or equipment `urn`.
    pub fn circuits(&self, urn: &str) -> &[Arc<CircuitInfo>] {
        self.circuits.get(urn).map_or(&[][..], Vec::as_slice)
    }

    // ------------------------------------------------------------------
    // Segment placement
    // ------------------------------------------------------------------

    /// Where `seg` sits relative to the structure (none if it does not touch it).
    pub fn side_of(&self, seg: &Feature) -> Option<StructSide> {
        let at_in = seg.structure(Side::In) == Some(self.urn());
        let at_out = seg.structure(Side::Out) == Some(self.urn());

        match (at_in, at_out) {
            (true, true) => Some(StructSide::Int),
            (_, true) => Some(StructSide::In),
            (true, false) => Some(StructSide::Out),
            (false, false) => None,
        }
    }

    /// Segments grouped by where they sit.
    pub fn segs_by_side(&self) -> SegsBySide {
        let mut res = SegsBySide::default();
        for seg in &self.segs {
            match self.side_of(seg) {
                Some(StructSide::In) => res.incoming.push(Arc::clone(seg)),
                Some(StructSide::Out) => res.outgoing.push(Arc::clone(seg)),
                Some(StructSide::Int) => res.internal.push(Arc::clone(seg)),
                None => {}
            }
        }
        res
    }

    /// Slack equipment keyed by the URN of the internal segment it holds.
    pub fn slacks_by_seg(&self) -> HashMap<String, Arc<Feature>> {
        self.segs
            .iter()
            .filter(|seg| self.side_of(seg) == Some(StructSide::Int))
            .filter_map(|seg| {
                let housing = self.feature(seg.housing())?;
                (self.config.defined_function(&housing) == Some(EquipFunction::Slack))
                    .then(|| (seg.urn.clone(), housing))
            })
            .collect()
    }

    /// Connections on the `side` end of `seg_urn`, oriented away from it.
    fn seg_conns(&self, seg_urn: &str, side: Side, problems: &mut Vec<Problem>) -> Vec<Conn> {
        let mut conns = Vec::new();
        for rec in &self.conns {
            if rec.in_object == seg_urn && rec.in_side == side {
                conns.push(Conn::new(Arc::clone(rec), true, Some(&self.features)));
            }
            if rec.out_object == seg_urn && rec.out_side == side {
                conns.push(Conn::new(Arc::clone(rec), false, Some(&self.features)));
            }
        }
        collect_conn_problems(&conns, problems);
        conns
    }

    /// The cable of `seg`, reporting it when missing.
    fn cable_of(&self, seg: &Feature, problems: &mut Vec<Problem>) -> Option<Arc<Feature>> {
        let cable = self.feature(seg.cable());
        if cable.is_none() {
            let cable_urn = seg.cable().unwrap_or_default();
            warn!(segment = %seg.urn, cable = %cable_urn, "Cable not found");
            push_unique(
                problems,
                Problem::MissingCable {
                    segment: seg.urn.clone(),
                    cable: cable_urn.to_string(),
                },
            );
        }
        cable
    }

    fn seg_pins_for(
        &self,
        seg: &Arc<Feature>,
        cable_side: Side,
        seg_side: Side,
        slacks: &HashMap<String, Arc<Feature>>,
        problems: &mut Vec<Problem>,
    ) -> SegPins {
        let cable = self.cable_of(seg, problems);
        let pins = cable
            .as_deref()
            .and_then(|c| self.config.cable_pin_count(c))
            .map(|n| PinRange::new(seg_side, 1, n));
        let conns = self.seg_conns(&seg.urn, seg_side, problems);

        SegPins {
            feature: Arc::clone(seg),
            cable,
            cable_side,
            seg_side,
            pins,
            n_connected: n_connected_pins(&conns),
            conns,
            housing: self.feature(seg.housing()),
            slack: slacks.get(&seg.urn).cloned(),
            circuits: self.circuits(&seg.urn).to_vec(),
        }
    }

    /// Pins and connections of the segment ends at the structure.
    ///
    /// With `undirected_only` directed segments are skipped. Internal
    /// segments are included when `include_internal` is set.
    pub fn seg_pins(&self, undirected_only: bool, include_internal: bool) -> Outcome<SegPinSets> {
        let mut problems = Vec::new();
        let by_side = self.segs_by_side();
        let slacks = self.slacks_by_seg();
        let keep = |seg: &&Arc<Feature>| !(undirected_only && seg.is_directed());

        let mut sets = SegPinSets::default();
        for seg in by_side.incoming.iter().filter(keep) {
            sets.incoming
                .push(self.seg_pins_for(seg, Side::In, Side::Out, &slacks, &mut problems));
        }
        for seg in by_side.outgoing.iter().filter(keep) {
            sets.outgoing
                .push(self.seg_pins_for(seg, Side::Out, Side::In, &slacks, &mut problems));
        }

        if include_internal {
            for seg in by_side.internal.iter().filter(keep) {
                let in_pins = self.seg_pins_for(seg, Side::In, Side::In, &slacks, &mut problems);
                let out_pins = self.seg_pins_for(seg, Side::Out, Side::Out, &slacks, &mut problems);
                sets.internal.push(InternalSegPins {
                    feature: Arc::clone(seg),
                    cable: in_pins.cable.clone(),
                    housing: self.feature(seg.housing()),
                    slack: slacks.get(&seg.urn).cloned(),
                    in_pins,
                    out_pins,
                });
            }
        }

        Outcome::new(sets, problems)
    }

    // ------------------------------------------------------------------
    // Cable tree
    // ------------------------------------------------------------------

    /// Structure, cables, and each cable's segments in physical order.
    pub fn cable_tree(&self) -> Outcome<ContainmentNode> {
        let (sets, mut problems) = self.seg_pins(false, true).into_parts();

        let mut cable_children: HashMap<String, Vec<ContainmentNode>> = HashMap::new();
        let seg_nodes = sets
            .incoming
            .into_iter()
            .chain(sets.outgoing)
            .map(|p| (p.cable.clone(), ContainmentNode::seg_node(p)))
            .chain(
                sets.internal
                    .into_iter()
                    .map(|p| (p.cable.clone(), ContainmentNode::internal_node(p))),
            );

        for (cable, node) in seg_nodes {
            match cable {
                Some(cable) if self.cables.iter().any(|c| c.urn == cable.urn) => cable_children
                    .entry(cable.urn.clone())
                    .or_default()
                    .push(node),
                _ => debug!(segment = %node.urn(), "Segment cable not in content, omitted"),
            }
        }

        let mut root = ContainmentNode::feature_node(Arc::clone(&self.root), NodeKind::Structure);
        for cable in &self.cables {
            let mut node = ContainmentNode::feature_node(Arc::clone(cable), NodeKind::Cable);
            let children = cable_children.remove(&cable.urn).unwrap_or_default();
            node.children = ordered_seg_nodes(&cable.urn, children, &mut problems);
            root.children.push(node);
        }

        Outcome::new(root, problems)
    }

    /// Per-cable segment ends connectable on `side` of equipment in the structure.
    ///
    /// Segments entering on `side` are included, plus undirected segments on
    /// the other side and internal segments. Cables are listed in the order
    /// first met.
    pub fn cable_connection_points(&self, side: Side) -> Outcome<Vec<ContainmentNode>> {
        let mut problems = Vec::new();
        let mut trees: Vec<ContainmentNode> = Vec::new();

        for conn_side in Side::BOTH {
            let undirected_only = conn_side != side;
            let (sets, found) = self.seg_pins(undirected_only, !undirected_only).into_parts();
            for problem in found {
                push_unique(&mut problems, problem);
            }

            for pins in sets.on(conn_side) {
                if let Some(cable) = pins.cable.clone() {
                    add_to_cable(&mut trees, &cable, ContainmentNode::seg_node(pins.clone()));
                }
            }
            for pins in sets.internal {
                if let Some(cable) = pins.cable.clone() {
                    add_to_cable(&mut trees, &cable, ContainmentNode::internal_node(pins));
                }
            }
        }

        for tree in &mut trees {
            let children = std::mem::take(&mut tree.children);
            tree.children = ordered_seg_nodes(&tree.feature.urn, children, &mut problems);
        }

        Outcome::new(trees, problems)
    }

    // ------------------------------------------------------------------
    // Conduit tree
    // ------------------------------------------------------------------

    /// The conduit continuing `conduit` through the structure, if any.
    fn pass_through_conduit(&self, conduit: &Feature) -> Option<Arc<Feature>> {
        if conduit.structure(Side::In) == Some(self.urn()) {
            self.feature(conduit.str_prop("in_conduit"))
        } else if conduit.structure(Side::Out) == Some(self.urn()) {
            self.feature(conduit.str_prop("out_conduit"))
        } else {
            None
        }
    }

    /// Structure, conduits, and the segments they carry.
    ///
    /// A conduit passing through the structure and the conduit continuing it
    /// are merged into one node.
    pub fn conduit_tree(&self) -> Outcome<ContainmentNode> {
        let (sets, problems) = self.seg_pins(false, false).into_parts();

        let mut nodes: HashMap<String, ContainmentNode> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        nodes.insert(
            self.urn().to_string(),
            ContainmentNode::feature_node(Arc::clone(&self.root), NodeKind::Structure),
        );

        for conduit in &self.conduits {
            let mut node = ContainmentNode::feature_node(Arc::clone(conduit), NodeKind::Conduit);
            node.housing = self.feature(conduit.housing());
            node.pass_through_conduit = self.pass_through_conduit(conduit);
            node.conduit_run = self.feature(conduit.str_prop("conduit_run"));
            nodes.insert(conduit.urn.clone(), node);
        }

        // Conduits housed outside the structure are shown as housed in it
        for conduit in &self.conduits {
            let parent = conduit
                .housing()
                .filter(|h| nodes.contains_key(*h))
                .unwrap_or(self.urn());
            children
                .entry(parent.to_string())
                .or_default()
                .push(conduit.urn.clone());
        }

        for pins in sets.incoming.into_iter().chain(sets.outgoing) {
            let seg_urn = pins.feature.urn.clone();
            let parent = pins
                .housing
                .as_ref()
                .map(|h| h.urn.clone())
                .filter(|h| nodes.contains_key(h))
                .unwrap_or_else(|| self.urn().to_string());
            children.entry(parent).or_default().push(seg_urn.clone());
            nodes.insert(seg_urn, ContainmentNode::seg_node(pins));
        }

        let mut root = assemble(self.urn(), &mut nodes, &children)
            .unwrap_or_else(|| ContainmentNode::feature_node(Arc::clone(&self.root), NodeKind::Structure));
        consolidate(&mut root);

        Outcome::new(root, problems)
    }

    // ------------------------------------------------------------------
    // Full containment
    // ------------------------------------------------------------------

    /// Structure, equipment, conduits and cables in one hierarchy.
    ///
    /// Equipment hangs under its `housing`; equipment whose housing is not
    /// part of the content, or whose housing chain loops, is reported and
    /// left out. Conduits hang under
    /// their housing, or the structure. Each cable is shown under the
    /// housing of its segment ends: the equipment named on the segment
    /// end, else the equipment housing a connection on it, else the conduit
    /// carrying it, else the structure.
    pub fn containment_tree(&self) -> Outcome<ContainmentNode> {
        let (sets, mut problems) = self.seg_pins(false, true).into_parts();

        let mut nodes: HashMap<String, ContainmentNode> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        nodes.insert(
            self.urn().to_string(),
            ContainmentNode::feature_node(Arc::clone(&self.root), NodeKind::Structure),
        );

        for equip in &self.equips {
            let mut node = ContainmentNode::feature_node(Arc::clone(equip), NodeKind::Equipment);
            node.housing = self.feature(equip.housing());
            nodes.insert(equip.urn.clone(), node);
        }
        for conduit in &self.conduits {
            let mut node = ContainmentNode::feature_node(Arc::clone(conduit), NodeKind::Conduit);
            node.housing = self.feature(conduit.housing());
            node.pass_through_conduit = self.pass_through_conduit(conduit);
            node.conduit_run = self.feature(conduit.str_prop("conduit_run"));
            nodes.insert(conduit.urn.clone(), node);
        }

        for equip in &self.equips {
            match equip.housing().filter(|h| nodes.contains_key(*h)) {
                Some(housing) => children
                    .entry(housing.to_string())
                    .or_default()
                    .push(equip.urn.clone()),
                None => {
                    let housing = equip.housing().unwrap_or_default();
                    warn!(equip = %equip.urn, housing = %housing, "Cannot find housing");
                    push_unique(
                        &mut problems,
                        Problem::UnresolvedHousing {
                            feature: equip.urn.clone(),
                            housing: housing.to_string(),
                        },
                    );
                }
            }
        }
        for conduit in &self.conduits {
            let parent = conduit
                .housing()
                .filter(|h| nodes.contains_key(*h))
                .unwrap_or(self.urn());
            children
                .entry(parent.to_string())
                .or_default()
                .push(conduit.urn.clone());
        }

        let equip_urns: HashSet<&str> = self.equips.iter().map(|e| e.urn.as_str()).collect();
        let housing_urns: HashSet<&str> = equip_urns
            .iter()
            .copied()
            .chain(self.conduits.iter().map(|c| c.urn.as_str()))
            .collect();

        // (parent, cable) groups in first-seen order
        let mut groups: Vec<(String, Arc<Feature>, Vec<ContainmentNode>)> = Vec::new();
        let mut place = |parent: String, cable: Arc<Feature>, node: ContainmentNode| {
            match groups
                .iter_mut()
                .find(|(p, c, _)| *p == parent && c.urn == cable.urn)
            {
                Some((_, _, segs)) => segs.push(node),
                None => groups.push((parent, cable, vec![node])),
            }
        };

        for pins in sets.incoming.into_iter().chain(sets.outgoing) {
            let Some(cable) = pins.cable.clone() else {
                continue;
            };
            let parent = self.seg_parent(&pins.feature, &[&pins], &equip_urns, &housing_urns);
            place(parent, cable, ContainmentNode::seg_node(pins));
        }
        for pins in sets.internal {
            let Some(cable) = pins.cable.clone() else {
                continue;
            };
            let parent = self.seg_parent(
                &pins.feature,
                &[&pins.in_pins, &pins.out_pins],
                &equip_urns,
                &housing_urns,
            );
            place(parent, cable, ContainmentNode::internal_node(pins));
        }

        let mut root = assemble(self.urn(), &mut nodes, &children)
            .unwrap_or_else(|| ContainmentNode::feature_node(Arc::clone(&self.root), NodeKind::Structure));
        report_housing_loops(&self.equips, &nodes, &mut problems);
        report_housing_loops(&self.conduits, &nodes, &mut problems);

        for (parent, cable, segs) in groups {
            let mut node = ContainmentNode::feature_node(Arc::clone(&cable), NodeKind::Cable);
            node.children = ordered_seg_nodes(&cable.urn, segs, &mut problems);
            match root.find_mut(&parent) {
                Some(parent_node) => parent_node.children.push(node),
                None => root.children.push(node),
            }
        }

        debug!(root = %self.urn(), problems = problems.len(), "Containment tree built");
        Outcome::new(root, problems)
    }

    /// URN of the node a segment's cable is shown under.
    fn seg_parent(
        &self,
        seg: &Feature,
        ends: &[&SegPins],
        equip_urns: &HashSet<&str>,
        housing_urns: &HashSet<&str>,
    ) -> String {
        let explicit = ends
            .iter()
            .filter_map(|end| seg.equipment(end.seg_side))
            .find(|urn| equip_urns.contains(urn));

        let implicit = || {
            ends.iter()
                .flat_map(|end| end.conns.iter())
                .filter_map(Conn::housing_urn)
                .find(|urn| equip_urns.contains(urn))
        };

        let carried = || seg.housing().filter(|urn| housing_urns.contains(urn));

        explicit
            .or_else(implicit)
            .or_else(carried)
            .unwrap_or(self.urn())
            .to_string()
    }
}

/// Report features left out of an assembled tree because their housing
/// is itself unplaced, as in a housing loop.
///
/// Features whose housing was never a node are reported where the
/// housing lookup fails.
fn report_housing_loops<N>(
    features: &[Arc<Feature>],
    unplaced: &HashMap<String, N>,
    problems: &mut Vec<Problem>,
) {
    for feature in features {
        let Some(housing) = feature.housing() else {
            continue;
        };
        if unplaced.contains_key(&feature.urn) && unplaced.contains_key(housing) {
            warn!(feature = %feature.urn, housing = %housing, "Housing not reachable from root");
            push_unique(
                problems,
                Problem::UnresolvedHousing {
                    feature: feature.urn.clone(),
                    housing: housing.to_string(),
                },
            );
        }
    }
}

/// Append `node` to the tree for `cable`, starting one if needed.
fn add_to_cable(trees: &mut Vec<ContainmentNode>, cable: &Arc<Feature>, node: ContainmentNode) {
    match trees.iter_mut().find(|t| t.feature.urn == cable.urn) {
        Some(tree) => tree.children.push(node),
        None => {
            let mut tree = ContainmentNode::feature_node(Arc::clone(cable), NodeKind::Cable);
            tree.children.push(node);
            trees.push(tree);
        }
    }
}

/// Number of connected pins, proposed connections excluded.
pub fn n_connected_pins(conns: &[Conn]) -> u32 {
    conns
        .iter()
        .filter(|c| !c.is_proposed())
        .map(|c| c.from_pins.size())
        .sum()
}

fn collect_conn_problems(conns: &[Conn], problems: &mut Vec<Problem>) {
    for conn in conns {
        for problem in conn.problems() {
            push_unique(problems, problem);
        }
    }
}

/// Merge children that show the same feature, or the two halves of a
/// pass-through conduit.
fn consolidate(tree: &mut ContainmentNode) {
    let mut merged: Vec<ContainmentNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for child in std::mem::take(&mut tree.children) {
        let existing = index.get(child.urn()).copied().or_else(|| {
            child
                .pass_through_conduit
                .as_ref()
                .and_then(|c| index.get(&c.urn).copied())
        });

        match existing {
            Some(i) => merged[i].children.extend(child.children),
            None => {
                index.insert(child.urn().to_string(), merged.len());
                merged.push(child);
            }
        }
    }

    tree.children = merged;
    for child in &mut tree.children {
        consolidate(child);
    }
}
