//! Signal trace trees.
//!
//! Given every connection inside a piece of equipment (or any other
//! subtree), [`TraceBuilder`] reconstructs the directed signal paths as a
//! forest of [`PinTree`]s. Trees start at objects with nothing feeding
//! them; objects that sit entirely inside a connectivity loop get a tree
//! of their own so that every connected object is covered.

mod fanout;

#[cfg(test)]
#[path = "trace_tests.rs"]
mod trace_tests;

pub use fanout::FanOut;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::conn::Conn;
use crate::error::{push_unique, Outcome, Problem};
use crate::model::{serialize_opt_urn, serialize_urn, Feature, FeatureMap, Side};
use crate::pins::PinRange;

/// A pin of a feature and everything downstream of it.
#[derive(Debug, Clone, Serialize)]
pub struct PinTree {
    /// Pin owner (equipment or cable segment).
    #[serde(serialize_with = "serialize_urn")]
    pub feature: Arc<Feature>,
    /// Pin the signal arrives on (none at a root).
    pub in_pin: Option<u32>,
    /// Out pin this node represents (none where the signal stops).
    pub out_pin: Option<u32>,
    /// Connection from the upstream object.
    pub conn: Option<Conn>,
    /// Cable owning `feature`, for segments.
    #[serde(serialize_with = "serialize_opt_urn")]
    pub cable: Option<Arc<Feature>>,
    /// URN of the equipment tree node housing `conn`.
    pub equip_node: Option<String>,
    /// Housing to display for the node.
    #[serde(serialize_with = "serialize_opt_urn")]
    pub housing: Option<Arc<Feature>>,
    /// URNs of the circuits carried, where known.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub circuits: Vec<String>,
    /// True where a connectivity loop was cut.
    pub cycle: bool,
    /// Downstream objects.
    pub children: Vec<PinTree>,
}

impl PinTree {
    fn new(
        feature: Arc<Feature>,
        in_pin: Option<u32>,
        out_pin: Option<u32>,
        conn: Option<Conn>,
        cable: Option<Arc<Feature>>,
    ) -> Self {
        Self {
            feature,
            in_pin,
            out_pin,
            conn,
            cable,
            equip_node: None,
            housing: None,
            circuits: Vec::new(),
            cycle: false,
            children: Vec::new(),
        }
    }

    /// URN of the pin owner.
    pub fn urn(&self) -> &str {
        &self.feature.urn
    }

    /// This node and all its descendants, depth first.
    pub fn walk(&self) -> Vec<&PinTree> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(PinTree::size).sum::<usize>()
    }
}

/// Build trace trees with a default [`TraceBuilder`].
pub fn build_trace_trees(
    config: &NetworkConfig,
    conns: &[Conn],
    features: &FeatureMap,
) -> Outcome<Vec<PinTree>> {
    TraceBuilder::new(config).build(conns, features)
}

/// Builds [`PinTree`] forests from connections.
#[derive(Debug, Clone, Copy)]
pub struct TraceBuilder<'a> {
    config: &'a NetworkConfig,
}

impl<'a> TraceBuilder<'a> {
    /// Create a builder using the feature types and equipment functions of `config`.
    pub fn new(config: &'a NetworkConfig) -> Self {
        Self { config }
    }

    /// Build trace trees for `conns`.
    ///
    /// Connections are resolved against `features` (plus anything they
    /// already resolved). Connections with unresolved endpoints are left
    /// out and reported.
    pub fn build(&self, conns: &[Conn], features: &FeatureMap) -> Outcome<Vec<PinTree>> {
        self.build_housed(conns.iter().map(|c| (c.clone(), None)), features)
    }

    /// As [`TraceBuilder::build`], each connection paired with the URN of
    /// the equipment tree node it belongs to.
    pub fn build_housed<I>(&self, conns: I, features: &FeatureMap) -> Outcome<Vec<PinTree>>
    where
        I: IntoIterator<Item = (Conn, Option<String>)>,
    {
        let conns: Vec<(Conn, Option<String>)> = conns.into_iter().collect();

        let mut features = features.clone();
        for (conn, _) in &conns {
            for (urn, feature) in conn.features() {
                features.entry(urn).or_insert(feature);
            }
        }

        let mut build = TraceBuild::new(self.config, &features);
        for (conn, equip_node) in &conns {
            let conn = Conn::new(Arc::clone(conn.record()), conn.is_forward(), Some(&features));
            build.add_conn(conn, equip_node.clone());
        }

        let mut trees = build.trees();
        for tree in &mut trees {
            annotate_housing(tree, &features);
        }

        debug!(
            conns = conns.len(),
            trees = trees.len(),
            problems = build.problems.len(),
            "Trace trees built"
        );
        Outcome::new(trees, build.problems)
    }
}

/// A connection filed on one side of a feature.
#[derive(Debug, Clone)]
struct SideConn {
    conn: Conn,
    equip_node: Option<String>,
}

/// Connections on each side of one feature.
#[derive(Debug)]
struct FeatureInfo {
    feature: Arc<Feature>,
    cable: Option<Arc<Feature>>,
    is_seg: bool,
    out_pins: Option<PinRange>,
    conns_in: Vec<SideConn>,
    conns_out: Vec<SideConn>,
    visited: bool,
}

impl FeatureInfo {
    fn conns_mut(&mut self, side: Side) -> &mut Vec<SideConn> {
        match side {
            Side::In => &mut self.conns_in,
            Side::Out => &mut self.conns_out,
        }
    }

    /// File `conn` on `side`, replacing an earlier view of the same record.
    fn file(&mut self, side: Side, conn: SideConn) {
        let bucket = self.conns_mut(side);
        match bucket.iter_mut().find(|c| c.conn.urn == conn.conn.urn) {
            Some(existing) => *existing = conn,
            None => bucket.push(conn),
        }
    }
}

/// State of one trace tree build.
struct TraceBuild<'a> {
    config: &'a NetworkConfig,
    features: &'a FeatureMap,
    infos: Vec<FeatureInfo>,
    index: HashMap<String, usize>,
    problems: Vec<Problem>,
}

impl<'a> TraceBuild<'a> {
    fn new(config: &'a NetworkConfig, features: &'a FeatureMap) -> Self {
        Self {
            config,
            features,
            infos: Vec::new(),
            index: HashMap::new(),
            problems: Vec::new(),
        }
    }

    /// File `conn` on the logical sides of both its endpoints.
    fn add_conn(&mut self, conn: Conn, equip_node: Option<String>) {
        if !conn.is_valid() {
            warn!(conn = %conn.urn, "Skipping connection with unresolved endpoint");
            for problem in conn.problems() {
                push_unique(&mut self.problems, problem);
            }
            return;
        }

        let from = self.ensure_info(&conn.from_ref);
        let to = self.ensure_info(&conn.to_ref);
        let (Some(from), Some(to)) = (from, to) else {
            return;
        };

        let side_conn = |conn: Conn| SideConn {
            conn,
            equip_node: equip_node.clone(),
        };

        if conn.logical_from_side() == Side::Out {
            self.infos[from].file(Side::Out, side_conn(conn.clone()));
        } else {
            self.infos[from].file(Side::In, side_conn(conn.reversed()));
        }

        if conn.logical_to_side() == Side::In {
            self.infos[to].file(Side::In, side_conn(conn));
        } else {
            self.infos[to].file(Side::Out, side_conn(conn.reversed()));
        }
    }

    /// Index of the info for `urn`, created on first use.
    fn ensure_info(&mut self, urn: &str) -> Option<usize> {
        if let Some(idx) = self.index.get(urn) {
            return Some(*idx);
        }

        let feature = Arc::clone(self.features.get(urn)?);
        let is_seg = self.config.is_segment(urn);

        let (cable, out_pins) = if is_seg {
            let cable = match feature.cable() {
                Some(cable_urn) => {
                    let cable = self.features.get(cable_urn).cloned();
                    if cable.is_none() {
                        warn!(segment = %urn, cable = %cable_urn, "Cable not found");
                        push_unique(
                            &mut self.problems,
                            Problem::MissingCable {
                                segment: urn.to_string(),
                                cable: cable_urn.to_string(),
                            },
                        );
                    }
                    cable
                }
                None => None,
            };
            let out_pins = cable
                .as_deref()
                .and_then(|c| self.config.cable_pin_count(c))
                .map(|n| PinRange::new(Side::Out, 1, n));
            (cable, out_pins)
        } else {
            let out_pins = self
                .config
                .equip_port_count(&feature, Side::Out)
                .map(|n| PinRange::new(Side::Out, 1, n));
            (None, out_pins)
        };

        let idx = self.infos.len();
        self.infos.push(FeatureInfo {
            feature,
            cable,
            is_seg,
            out_pins,
            conns_in: Vec::new(),
            conns_out: Vec::new(),
            visited: false,
        });
        self.index.insert(urn.to_string(), idx);
        Some(idx)
    }

    /// Trees from unfed objects, then from anything a loop kept unreached.
    fn trees(&mut self) -> Vec<PinTree> {
        let roots: Vec<usize> = (0..self.infos.len())
            .filter(|idx| self.infos[*idx].conns_in.is_empty())
            .collect();

        let mut trees = Vec::new();
        for idx in roots {
            trees.extend(self.pin_trees_for(idx));
        }

        // Undirected segments inside a loop
        for idx in 0..self.infos.len() {
            if !self.infos[idx].visited && self.infos[idx].is_seg {
                trees.extend(self.pin_trees_for(idx));
            }
        }

        // Undirected equipment inside a loop
        for idx in 0..self.infos.len() {
            if !self.infos[idx].visited {
                trees.extend(self.pin_trees_for(idx));
            }
        }

        trees
    }

    /// One tree per out pin of a feature.
    fn pin_trees_for(&mut self, idx: usize) -> Vec<PinTree> {
        let Some(out_pins) = self.infos[idx].out_pins else {
            return Vec::new();
        };

        out_pins
            .pins()
            .map(|pin| self.pin_tree(idx, None, Some(pin), None, &mut HashSet::new()))
            .collect()
    }

    /// Tree of objects downstream of `out_pin` of a feature.
    ///
    /// `active` holds the features on the current path; meeting one of
    /// them again ends the branch.
    fn pin_tree(
        &mut self,
        idx: usize,
        in_pin: Option<u32>,
        out_pin: Option<u32>,
        conn: Option<Conn>,
        active: &mut HashSet<String>,
    ) -> PinTree {
        let info = &mut self.infos[idx];
        info.visited = true;

        let mut node = PinTree::new(
            Arc::clone(&info.feature),
            in_pin,
            out_pin,
            conn,
            info.cable.clone(),
        );

        let urn = info.feature.urn.clone();
        if active.contains(&urn) {
            debug!(urn = %urn, in_pin = ?in_pin, out_pin = ?out_pin, "Cycle detected");
            node.cycle = true;
            return node;
        }
        active.insert(urn.clone());

        if let Some(out_pin) = out_pin {
            let out_conns: Vec<SideConn> = self.infos[idx]
                .conns_out
                .iter()
                .filter(|c| c.conn.from_pins.includes_pin(out_pin))
                .cloned()
                .collect();

            for side_conn in out_conns {
                node.children
                    .extend(self.children_for(side_conn, out_pin, active));
            }
        }

        active.remove(&urn);
        node
    }

    /// Nodes fed by `out_pin` through one connection.
    fn children_for(
        &mut self,
        side_conn: SideConn,
        out_pin: u32,
        active: &mut HashSet<String>,
    ) -> Vec<PinTree> {
        let SideConn { conn, equip_node } = side_conn;
        let Some(&child_idx) = self.index.get(&conn.to_ref) else {
            return Vec::new();
        };
        let child_in_pin = conn.to_pin_for(out_pin);

        // Segments carry a single pin straight through
        if self.infos[child_idx].is_seg {
            let child = self.pin_tree(
                child_idx,
                Some(child_in_pin),
                Some(child_in_pin),
                Some(conn),
                active,
            );
            return vec![child];
        }

        let equip = Arc::clone(&self.infos[child_idx].feature);
        let fan_out = FanOut::for_function(self.config.defined_function(&equip));

        match fan_out.out_pins(child_in_pin, self.config.equip_out_ports(&equip)) {
            Some(child_out_pins) => child_out_pins
                .pins()
                .map(|child_out_pin| {
                    let mut child = self.pin_tree(
                        child_idx,
                        Some(child_in_pin),
                        Some(child_out_pin),
                        Some(conn.clone()),
                        active,
                    );
                    child.equip_node = equip_node.clone();
                    child
                })
                .collect(),
            None => {
                let mut child =
                    self.pin_tree(child_idx, Some(child_in_pin), None, Some(conn), active);
                // Terminal equipment may still root trees of its own
                self.infos[child_idx].visited = false;
                child.equip_node = equip_node;
                vec![child]
            }
        }
    }
}

/// Set the display housing on every node of `tree`.
fn annotate_housing(tree: &mut PinTree, features: &FeatureMap) {
    tree.housing = housing_for(tree, features);
    for child in &mut tree.children {
        annotate_housing(child, features);
    }
}

/// The housing to show for a node.
///
/// A segment shows the splice it feeds into: the connection housing when
/// the next object is also a cable, or that housing's own housing when it
/// is equipment.
fn housing_for(tree: &PinTree, features: &FeatureMap) -> Option<Arc<Feature>> {
    if tree.cable.is_none() {
        return tree
            .feature
            .housing()
            .and_then(|urn| features.get(urn).cloned());
    }

    let conn = tree.children.first()?.conn.as_ref()?;
    let housing = conn.housing_feature.as_ref()?;

    if conn.to_cable.is_some() {
        return Some(Arc::clone(housing));
    }

    housing.housing().and_then(|urn| features.get(urn).cloned())
}
