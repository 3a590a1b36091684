//! Stationmesh Layout
//!
//! Relative 2D layout of a wireless station mesh from noisy pairwise
//! distance reports, and the sparse connectivity graph derived from it.
//!
//! # Pipeline
//!
//! 1. [`aggregate`] folds per-station neighbor reports into a symmetric
//!    distance/variance matrix over the sorted station set.
//! 2. [`solve`] relaxes the matrix into planar coordinates, anchored at the
//!    two lexicographically smallest stations.
//! 3. [`build_graph`] links every station to its two nearest stations.
//!
//! All three are pure functions over owned snapshots. [`reconstruct`] runs
//! them in sequence.
//!
//! # Example
//!
//! ```
//! use stationmesh_layout::{reconstruct, NeighborReading, NeighborReport, SolverConfig};
//!
//! let reports = vec![NeighborReport::new(
//!     "P1",
//!     vec![NeighborReading::new("P2", 5.0, 0.01).unwrap()],
//! )];
//! let layout = reconstruct(&reports, &SolverConfig::default());
//! assert_eq!(layout.positions["P2"].x, 5.0);
//! assert!(layout.graph["P1"].contains("P2"));
//! ```

mod aggregate;
mod error;
mod neighbors;
mod solver;
mod station;

pub use aggregate::{aggregate, MeasurementMatrix, Measurements, NeighborReading, NeighborReport};
pub use error::{LayoutError, Result};
pub use neighbors::{build_graph, build_graph_with, NEAREST_NEIGHBORS};
pub use solver::{
    solve, solve_positions, AdaptiveStep, ConvergenceTrace, FixedStep, Solution, SolverConfig, StepPolicy,
    StopReason, CONVERGENCE_EPSILON, DEFAULT_LEARNING_RATE, DEFAULT_MAX_ITERATIONS,
};
pub use station::{ConnectivityGraph, Point, PositionMap, StationId};

/// Output of one full reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub positions: PositionMap,
    pub graph: ConnectivityGraph,
    pub trace: ConvergenceTrace,
}

impl Layout {
    /// Number of stations placed.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Aggregate, solve and build the graph in one go.
pub fn reconstruct(reports: &[NeighborReport], config: &SolverConfig) -> Layout {
    let measurements = aggregate(reports);
    let (positions, trace) = solve_positions(&measurements, config);
    let graph = build_graph(&positions);
    Layout {
        positions,
        graph,
        trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(station: &str, readings: &[(&str, f64, f64)]) -> NeighborReport {
        NeighborReport::new(
            station,
            readings
                .iter()
                .map(|(id, d, v)| NeighborReading::new(*id, *d, *v).unwrap())
                .collect(),
        )
    }

    #[test]
    fn empty_input_gives_empty_layout() {
        let layout = reconstruct(&[], &SolverConfig::default());
        assert!(layout.is_empty());
        assert!(layout.graph.is_empty());
    }

    #[test]
    fn single_station_layout() {
        let layout = reconstruct(&[report("S1", &[])], &SolverConfig::default());
        assert_eq!(layout.positions["S1"], Point::ORIGIN);
        assert!(layout.graph["S1"].is_empty());
    }

    #[test]
    fn two_station_layout() {
        let layout = reconstruct(&[report("P1", &[("P2", 5.0, 0.01)])], &SolverConfig::default());
        assert_eq!(layout.positions["P1"], Point::new(0.0, 0.0));
        assert_eq!(layout.positions["P2"], Point::new(5.0, 0.0));
        assert_eq!(layout.trace.iterations(), 0);
    }

    #[test]
    fn chain_layout_covers_every_station() {
        let reports = vec![
            report("N1", &[("N2", 10.0, 0.1), ("N3", 14.14, 0.2)]),
            report("N2", &[("N1", 10.2, 0.1), ("N3", 10.0, 0.1)]),
            report("N3", &[("N1", 13.9, 0.15), ("N2", 9.8, 0.12), ("N4", 7.07, 0.1)]),
            report("N4", &[("N3", 7.0, 0.1)]),
        ];
        let layout = reconstruct(&reports, &SolverConfig::default().with_seed(11));
        assert_eq!(layout.len(), 4);
        assert!(layout.positions.values().all(Point::is_finite));
        for id in ["N1", "N2", "N3", "N4"] {
            assert!(!layout.graph[id].is_empty(), "{} isolated", id);
        }
    }
}
