use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::{push_unique, AppError, AppResult, Outcome, Problem};
use crate::model::{CircuitInfo, Feature, FeatureMap};
use crate::source::{FeatureSource, Filter};

use super::{
    assemble, circuits_by_object, gather_circuits, lookup_all, owned, report_housing_loops, share,
    ContainmentNode, NodeKind,
};

/// Conduits and cable segments running along one route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInput {
    pub route: Feature,
    #[serde(default)]
    pub conduits: Vec<Feature>,
    #[serde(default)]
    pub conduit_runs: Vec<Feature>,
    #[serde(default)]
    pub cables: Vec<Feature>,
    #[serde(default)]
    pub cable_segs: Vec<Feature>,
    /// Circuits on the segments.
    #[serde(default)]
    pub circuits: Vec<CircuitInfo>,
}

impl RouteInput {
    /// Collect the content of route `route_urn` from `source`.
    pub fn gather<S>(source: &S, config: &NetworkConfig, route_urn: &str) -> AppResult<Self>
    where
        S: FeatureSource + ?Sized,
    {
        let route = source
            .feature_by_urn(route_urn)
            .ok_or_else(|| AppError::NotFound {
                urn: route_urn.to_string(),
            })?;
        let on_route = Filter::field_eq("root_housing", route_urn);

        let conduits: Vec<Arc<Feature>> = config
            .conduit_types
            .iter()
            .flat_map(|t| source.features(t, &on_route))
            .collect();
        let cable_segs: Vec<Arc<Feature>> = config
            .segment_types()
            .into_iter()
            .flat_map(|t| source.features(t, &on_route))
            .collect();

        let cables = lookup_all(source, cable_segs.iter().filter_map(|s| s.cable()));
        let conduit_runs = lookup_all(source, conduits.iter().filter_map(|c| c.str_prop("conduit_run")));

        let circuits = gather_circuits(source, &cable_segs);

        debug!(
            route = %route_urn,
            conduits = conduits.len(),
            segs = cable_segs.len(),
            circuits = circuits.len(),
            "Gathered route content"
        );

        Ok(Self {
            route: route.as_ref().clone(),
            conduits: owned(conduits),
            conduit_runs: owned(conduit_runs),
            cables: owned(cables),
            cable_segs: owned(cable_segs),
            circuits,
        })
    }
}

/// The content of one route.
#[derive(Debug, Clone)]
pub struct RouteContent {
    route: Arc<Feature>,
    features: FeatureMap,
    conduits: Vec<Arc<Feature>>,
    segs: Vec<Arc<Feature>>,
    circuits: HashMap<String, Vec<Arc<CircuitInfo>>>,
}

impl RouteContent {
    /// Index the content of a route.
    pub fn new(input: RouteInput) -> Self {
        let mut features = FeatureMap::new();
        let route = Arc::new(input.route);
        features.insert(route.urn.clone(), Arc::clone(&route));
        let conduits = share(&mut features, input.conduits);
        share(&mut features, input.conduit_runs);
        share(&mut features, input.cables);
        let segs = share(&mut features, input.cable_segs);

        Self {
            route,
            features,
            conduits,
            segs,
            circuits: circuits_by_object(input.circuits),
        }
    }

    /// Route, conduits and segments, each under its `housing`.
    ///
    /// Features whose housing is not part of the content are reported and
    /// left out.
    pub fn cable_tree(&self) -> Outcome<ContainmentNode> {
        let mut problems = Vec::new();
        let mut nodes: HashMap<String, ContainmentNode> = HashMap::new();
        nodes.insert(
            self.route.urn.clone(),
            ContainmentNode::feature_node(Arc::clone(&self.route), NodeKind::Route),
        );

        for conduit in &self.conduits {
            let mut node = ContainmentNode::feature_node(Arc::clone(conduit), NodeKind::Conduit);
            node.conduit_run = conduit
                .str_prop("conduit_run")
                .and_then(|urn| self.features.get(urn))
                .cloned();
            nodes.insert(conduit.urn.clone(), node);
        }
        for seg in &self.segs {
            let mut node = ContainmentNode::feature_node(Arc::clone(seg), NodeKind::Segment);
            node.cable = seg.cable().and_then(|urn| self.features.get(urn)).cloned();
            node.circuits = self.circuits.get(&seg.urn).cloned().unwrap_or_default();
            nodes.insert(seg.urn.clone(), node);
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for feature in self.conduits.iter().chain(&self.segs) {
            match feature.housing().filter(|h| nodes.contains_key(*h)) {
                Some(housing) => children
                    .entry(housing.to_string())
                    .or_default()
                    .push(feature.urn.clone()),
                None => {
                    let housing = feature.housing().unwrap_or_default();
                    warn!(feature = %feature.urn, housing = %housing, "Cannot find housing");
                    push_unique(
                        &mut problems,
                        Problem::UnresolvedHousing {
                            feature: feature.urn.clone(),
                            housing: housing.to_string(),
                        },
                    );
                }
            }
        }

        let root = assemble(&self.route.urn, &mut nodes, &children).unwrap_or_else(|| {
            ContainmentNode::feature_node(Arc::clone(&self.route), NodeKind::Route)
        });
        report_housing_loops(&self.conduits, &nodes, &mut problems);
        Outcome::new(root, problems)
    }
}

/// Build the containment tree of a route.
pub fn build_route_tree(input: RouteInput) -> Outcome<ContainmentNode> {
    RouteContent::new(input).cable_tree()
}
