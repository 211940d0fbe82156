use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::{push_unique, Problem};
use crate::model::Side;

use super::ContainmentNode;

/// Order the segment nodes of one cable along the cable.
///
/// The chain starts at the node whose `in` neighbour is not among `nodes`
/// and follows `out` links. A chain that starts on the outgoing side is
/// reversed so outgoing segments are listed last. Nodes that cannot be
/// chained are appended in their original order and reported.
pub(crate) fn ordered_seg_nodes(
    cable_urn: &str,
    nodes: Vec<ContainmentNode>,
    problems: &mut Vec<Problem>,
) -> Vec<ContainmentNode> {
    if nodes.len() <= 1 {
        return nodes;
    }

    let by_id: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.feature.id(), i))
        .collect();
    let link = |i: usize, side: Side| {
        nodes[i]
            .feature
            .segment_link(side)
            .and_then(|id| by_id.get(id.as_str()).copied())
    };

    let mut head = None;
    for i in 0..nodes.len() {
        if link(i, Side::In).is_none() {
            head = Some(i);
        }
    }

    let mut chain = Vec::with_capacity(nodes.len());
    let mut seen = HashSet::new();
    let mut current = head;
    while let Some(i) = current {
        if !seen.insert(i) {
            break;
        }
        chain.push(i);
        current = link(i, Side::Out);
    }

    if chain
        .first()
        .is_some_and(|i| nodes[*i].cable_side == Some(Side::Out))
    {
        chain.reverse();
    }

    let unchained: Vec<usize> = (0..nodes.len()).filter(|i| !seen.contains(i)).collect();
    if !unchained.is_empty() {
        let urns: Vec<String> = unchained
            .iter()
            .map(|i| nodes[*i].urn().to_string())
            .collect();
        warn!(cable = %cable_urn, segments = ?urns, "Segments not chained");
        push_unique(
            problems,
            Problem::BrokenSegmentChain {
                cable: cable_urn.to_string(),
                unchained: urns,
            },
        );
        chain.extend(unchained);
    }

    let mut slots: Vec<Option<ContainmentNode>> = nodes.into_iter().map(Some).collect();
    chain.into_iter().filter_map(|i| slots[i].take()).collect()
}
