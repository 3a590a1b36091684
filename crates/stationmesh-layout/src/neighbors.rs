//! Nearest-neighbor connectivity graph.
//!
//! Every station picks its two nearest stations. The graph is the union of
//! those picks with direction dropped: an edge exists if either endpoint
//! chose the other. A station chosen by many others can therefore have a
//! degree above two.

use std::collections::BTreeSet;

use crate::station::{ConnectivityGraph, PositionMap, StationId};

/// How many nearest stations each station selects.
pub const NEAREST_NEIGHBORS: usize = 2;

/// Build the nearest-two graph.
pub fn build_graph(positions: &PositionMap) -> ConnectivityGraph {
    build_graph_with(positions, NEAREST_NEIGHBORS)
}

/// Build the graph with `k` picks per station.
///
/// Ties in distance go to the station that sorts first. Every input station
/// is a key of the output, isolated ones with an empty set.
pub fn build_graph_with(positions: &PositionMap, k: usize) -> ConnectivityGraph {
    let mut graph: ConnectivityGraph = positions
        .keys()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();
    if positions.len() < 2 {
        return graph;
    }

    // BTreeMap order is the station order, so position in this list is the
    // deterministic tie-break.
    let stations: Vec<_> = positions.iter().collect();

    for (i, (id, point)) in stations.iter().enumerate() {
        let mut others: Vec<(f64, usize)> = stations
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, (_, other))| (point.distance(other), j))
            .collect();
        others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for &(_, j) in others.iter().take(k) {
            let neighbor = stations[j].0;
            link(&mut graph, id, neighbor);
        }
    }
    graph
}

fn link(graph: &mut ConnectivityGraph, a: &StationId, b: &StationId) {
    if let Some(set) = graph.get_mut(a) {
        set.insert(b.clone());
    }
    if let Some(set) = graph.get_mut(b) {
        set.insert(a.clone());
    }
}
