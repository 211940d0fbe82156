use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::config::NetworkConfig;
use crate::conn::Conn;
use crate::error::{push_unique, Outcome, Problem};
use crate::model::{feature_map, serialize_urn, CircuitInfo, ConnectionRecord, Feature, Side};
use crate::pins::PinRange;
use crate::trace::{PinTree, TraceBuilder};

use super::{
    assemble, collect_conn_problems, n_connected_pins, report_housing_loops, Nest,
    StructureContent,
};

/// Pins on one side of a piece of equipment and what is connected to them.
#[derive(Debug, Clone, Serialize)]
pub struct PinSet {
    pub pins: PinRange,
    pub conns: Vec<Conn>,
    pub n_connected: u32,
}

/// One end of a cable segment.
#[derive(Debug, Clone, Serialize)]
pub struct SegSide {
    #[serde(serialize_with = "serialize_urn")]
    pub seg: Arc<Feature>,
    pub side: Side,
}

impl SegSide {
    pub fn new(seg: Arc<Feature>, side: Side) -> Self {
        Self { seg, side }
    }

    /// Identifies the end: `<segment urn>/<side>`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.seg.urn, self.side)
    }
}

/// How a segment end is held by a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainmentType {
    /// Through a connection housed in the equipment.
    Implicit,
    /// Through the segment's `in_equipment` / `out_equipment` field.
    Explicit,
    /// Either.
    #[default]
    All,
}

/// Segment ends held by a node, by [`ContainmentType`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegSides {
    pub implicit: Vec<SegSide>,
    pub explicit: Vec<SegSide>,
    pub all: Vec<SegSide>,
}

impl SegSides {
    fn new(implicit: Vec<SegSide>, explicit: Vec<SegSide>) -> Self {
        let all = dedup_seg_sides(implicit.iter().chain(&explicit).cloned());
        Self {
            implicit,
            explicit,
            all,
        }
    }

    /// Ends of the given containment type.
    pub fn of(&self, containment: ContainmentType) -> &[SegSide] {
        match containment {
            ContainmentType::Implicit => &self.implicit,
            ContainmentType::Explicit => &self.explicit,
            ContainmentType::All => &self.all,
        }
    }
}

fn dedup_seg_sides(seg_sides: impl IntoIterator<Item = SegSide>) -> Vec<SegSide> {
    let mut seen = HashSet::new();
    seg_sides
        .into_iter()
        .filter(|s| seen.insert(s.id()))
        .collect()
}

/// A structure or piece of equipment with its ports, splices and the
/// equipment housed in it.
#[derive(Debug, Clone, Serialize)]
pub struct EquipNode {
    #[serde(serialize_with = "serialize_urn")]
    pub feature: Arc<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_pins: Option<PinSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_pins: Option<PinSet>,
    /// Connections housed here that join other objects.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub splices: Vec<Conn>,
    /// Circuits on the ports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub circuits: Vec<Arc<CircuitInfo>>,
    /// Circuits on the segments spliced here.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub splice_circuits: Vec<Arc<CircuitInfo>>,
    pub seg_sides: SegSides,
    pub children: Vec<EquipNode>,
}

impl Nest for EquipNode {
    fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }
}

impl EquipNode {
    /// URN of the node's feature.
    pub fn urn(&self) -> &str {
        &self.feature.urn
    }

    /// Pins on `side`, if the feature has ports there.
    pub fn pins(&self, side: Side) -> Option<&PinSet> {
        match side {
            Side::In => self.in_pins.as_ref(),
            Side::Out => self.out_pins.as_ref(),
        }
    }

    /// Connections housed directly in this node: ports then splices.
    pub fn conns(&self) -> Vec<&Conn> {
        let ports = Side::BOTH
            .into_iter()
            .filter_map(|side| self.pins(side))
            .flat_map(|set| set.conns.iter());
        ports.chain(self.splices.iter()).collect()
    }

    /// URNs of the cables held directly by this node.
    pub fn cables(&self, containment: ContainmentType) -> Vec<String> {
        let mut seen = HashSet::new();
        self.seg_sides
            .of(containment)
            .iter()
            .filter_map(|s| s.seg.cable())
            .filter(|urn| seen.insert(*urn))
            .map(str::to_string)
            .collect()
    }

    /// The node for `urn` in this subtree.
    pub fn subtree_for(&self, urn: &str) -> Option<&EquipNode> {
        if self.urn() == urn {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.subtree_for(urn))
    }

    /// Nodes from this one down to the node for `urn`, inclusive.
    pub fn path_to(&self, urn: &str) -> Option<Vec<&EquipNode>> {
        if self.urn() == urn {
            return Some(vec![self]);
        }
        self.children.iter().find_map(|child| {
            let mut path = child.path_to(urn)?;
            path.insert(0, self);
            Some(path)
        })
    }

    /// URNs of the circuits through this node, each once.
    pub fn circuit_urns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.circuits
            .iter()
            .chain(&self.splice_circuits)
            .filter(|c| seen.insert(c.circuit_urn.as_str()))
            .map(|c| c.circuit_urn.clone())
            .collect()
    }

    /// URNs of the circuits through this subtree, each once.
    pub fn all_circuit_urns(&self) -> Vec<String> {
        let mut urns = self.circuit_urns();
        for child in &self.children {
            for urn in child.all_circuit_urns() {
                if !urns.contains(&urn) {
                    urns.push(urn);
                }
            }
        }
        urns
    }

    /// URNs of the circuits on `pin`.
    ///
    /// Port circuits must be on `side`. Splice circuits match on the pin
    /// of the spliced segment.
    pub fn circuits_on(&self, side: Side, pin: u32) -> Vec<String> {
        let ports = self
            .circuits
            .iter()
            .filter(|c| c.side == side && c.pins().includes_pin(pin));
        let spliced = self
            .splice_circuits
            .iter()
            .filter(|c| c.pins().includes_pin(pin));

        let mut urns: Vec<String> = Vec::new();
        for info in ports.chain(spliced) {
            if !urns.contains(&info.circuit_urn) {
                urns.push(info.circuit_urn.clone());
            }
        }
        urns
    }

    /// Features of this node and everything below it, top down.
    pub fn all_equips(&self) -> Vec<Arc<Feature>> {
        let mut equips = vec![Arc::clone(&self.feature)];
        for child in &self.children {
            equips.extend(child.all_equips());
        }
        equips
    }

    /// Connections housed in this subtree.
    pub fn all_conns(&self) -> Vec<&Conn> {
        let mut conns = self.conns();
        for child in &self.children {
            conns.extend(child.all_conns());
        }
        conns
    }

    fn housed_conns(&self) -> Vec<(Conn, Option<String>)> {
        let mut conns: Vec<(Conn, Option<String>)> = self
            .conns()
            .into_iter()
            .map(|c| (c.clone(), Some(self.urn().to_string())))
            .collect();
        for child in &self.children {
            conns.extend(child.housed_conns());
        }
        conns
    }

    /// Segment ends held in this subtree, each once.
    pub fn all_seg_sides(&self, containment: ContainmentType) -> Vec<SegSide> {
        dedup_seg_sides(self.seg_sides_below(containment))
    }

    fn seg_sides_below(&self, containment: ContainmentType) -> Vec<SegSide> {
        let mut seg_sides = self.seg_sides.of(containment).to_vec();
        for child in &self.children {
            seg_sides.extend(child.seg_sides_below(containment));
        }
        seg_sides
    }

    /// Segments in this subtree that can be connected to `side` of equipment.
    ///
    /// A directed segment is connectable on its end facing the equipment
    /// side; undirected segments are always connectable.
    pub fn all_connectable_segs(&self, side: Side) -> Vec<Arc<Feature>> {
        let cable_side = side.other();
        let mut seen = HashSet::new();
        self.all_seg_sides(ContainmentType::All)
            .into_iter()
            .filter(|s| s.side == cable_side || !s.seg.is_directed())
            .map(|s| s.seg)
            .filter(|seg| seen.insert(seg.urn.clone()))
            .collect()
    }

    /// Signal paths through the connections of this subtree.
    ///
    /// Each trace node that enters equipment records the URN of the tree
    /// node housing the connection.
    ///
    /// Nodes reached through a connection also list the circuits they carry.
    pub fn trace_trees(&self, config: &NetworkConfig) -> Outcome<Vec<PinTree>> {
        let features = feature_map(self.all_equips());
        let mut outcome = TraceBuilder::new(config).build_housed(self.housed_conns(), &features);
        for tree in &mut outcome.value {
            self.annotate_circuits(tree);
        }
        outcome
    }

    /// Equipment nodes list the circuits on their out pin, segments the
    /// circuits spliced onto their in pin where the connection is housed.
    fn annotate_circuits(&self, tree: &mut PinTree) {
        if let Some(conn) = tree.conn.as_ref() {
            let located = if tree.cable.is_some() {
                let node = tree
                    .equip_node
                    .as_deref()
                    .or_else(|| conn.housing_urn())
                    .and_then(|urn| self.subtree_for(urn));
                let pin = tree
                    .in_pin
                    .filter(|p| conn.to_pins.includes_pin(*p))
                    .map(|p| conn.from_pin_for(p));
                node.zip(pin)
            } else {
                self.subtree_for(tree.urn()).zip(tree.out_pin)
            };
            if let Some((node, pin)) = located {
                tree.circuits = node.circuits_on(Side::Out, pin);
            }
        }

        for child in &mut tree.children {
            self.annotate_circuits(child);
        }
    }
}

impl StructureContent<'_> {
    /// Structure and the equipment housed in it, with ports and splices.
    ///
    /// Equipment whose housing is not part of the content, or whose housing
    /// chain loops, is reported and left out.
    pub fn equipment_tree(&self) -> Outcome<EquipNode> {
        let mut problems = Vec::new();

        let mut by_object: HashMap<&str, Vec<&Arc<ConnectionRecord>>> = HashMap::new();
        let mut by_housing: HashMap<&str, Vec<&Arc<ConnectionRecord>>> = HashMap::new();
        for rec in &self.conns {
            by_object.entry(rec.in_object.as_str()).or_default().push(rec);
            if rec.out_object != rec.in_object {
                by_object.entry(rec.out_object.as_str()).or_default().push(rec);
            }
            if let Some(housing) = rec.housing.as_deref() {
                by_housing.entry(housing).or_default().push(rec);
            }
        }

        let mut nodes: HashMap<String, EquipNode> = HashMap::new();
        for housing in std::iter::once(&self.root).chain(&self.equips) {
            let object_recs = by_object.get(housing.urn.as_str()).map_or(&[][..], Vec::as_slice);
            let housed_recs = by_housing.get(housing.urn.as_str()).map_or(&[][..], Vec::as_slice);
            let node = self.equip_node(housing, object_recs, housed_recs, &mut problems);
            nodes.insert(housing.urn.clone(), node);
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
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

        let root = assemble(self.urn(), &mut nodes, &children)
            .unwrap_or_else(|| self.equip_node(&self.root, &[], &[], &mut Vec::new()));
        report_housing_loops(&self.equips, &nodes, &mut problems);
        Outcome::new(root, problems)
    }

    fn equip_node(
        &self,
        housing: &Arc<Feature>,
        object_recs: &[&Arc<ConnectionRecord>],
        housed_recs: &[&Arc<ConnectionRecord>],
        problems: &mut Vec<Problem>,
    ) -> EquipNode {
        let urn = housing.urn.as_str();

        let pin_set = |side: Side| {
            let n_ports = self.config.equip_port_count(housing, side)?;
            let mut conns = Vec::new();
            for rec in object_recs {
                if rec.in_object == urn && rec.in_side == side {
                    conns.push(Conn::new(Arc::clone(rec), true, Some(&self.features)));
                }
                if rec.out_object == urn && rec.out_side == side {
                    conns.push(Conn::new(Arc::clone(rec), false, Some(&self.features)));
                }
            }
            Some(PinSet {
                pins: PinRange::new(side, 1, n_ports),
                n_connected: n_connected_pins(&conns),
                conns,
            })
        };
        let in_pins = pin_set(Side::In);
        let out_pins = pin_set(Side::Out);

        let splices: Vec<Conn> = housed_recs
            .iter()
            .filter(|rec| rec.in_object != urn && rec.out_object != urn)
            .map(|rec| Conn::new(Arc::clone(rec), true, Some(&self.features)))
            .collect();

        for set in in_pins.iter().chain(&out_pins) {
            collect_conn_problems(&set.conns, problems);
        }
        collect_conn_problems(&splices, problems);

        let mut node = EquipNode {
            feature: Arc::clone(housing),
            in_pins,
            out_pins,
            circuits: self.circuits(urn).to_vec(),
            splice_circuits: Vec::new(),
            splices,
            seg_sides: SegSides::default(),
            children: Vec::new(),
        };

        let mut spliced_segs: Vec<&str> = Vec::new();
        for conn in &node.splices {
            if !spliced_segs.contains(&conn.from_ref.as_str()) {
                spliced_segs.push(conn.from_ref.as_str());
            }
        }
        node.splice_circuits = spliced_segs
            .into_iter()
            .flat_map(|seg| self.circuits(seg).iter().cloned())
            .collect();

        let implicit = node
            .conns()
            .into_iter()
            .flat_map(|conn| {
                let from = conn
                    .from_cable
                    .as_ref()
                    .and(conn.from_feature.clone())
                    .map(|seg| SegSide::new(seg, conn.from_pins.side));
                let to = conn
                    .to_cable
                    .as_ref()
                    .and(conn.to_feature.clone())
                    .map(|seg| SegSide::new(seg, conn.to_pins.side));
                from.into_iter().chain(to)
            })
            .collect();

        let explicit = self
            .segs
            .iter()
            .flat_map(|seg| {
                Side::BOTH
                    .into_iter()
                    .filter(move |side| seg.end_housing(*side) == Some(urn))
                    .map(move |side| SegSide::new(Arc::clone(seg), side))
            })
            .collect();

        node.seg_sides = SegSides::new(implicit, explicit);
        node
    }
}
