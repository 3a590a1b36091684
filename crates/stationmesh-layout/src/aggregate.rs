//! Measurement aggregation.
//!
//! Stations report the distances they observe to their neighbors. A pair can
//! be reported from both ends, several times, with different readings. The
//! aggregator folds all of that into one symmetric distance/variance matrix
//! over a deterministically indexed station set.
//!
//! # Sentinel
//!
//! An entry of `0.0` means "unmeasured". A real distance of zero between two
//! distinct stations does not occur in this domain, so the solver skips any
//! zero entry.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;

use crate::error::{LayoutError, Result};
use crate::station::StationId;

/// One distance observation from a reporting station to a neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborReading {
    pub neighbor: StationId,
    pub distance: f64,
    pub variance: f64,
}

impl NeighborReading {
    /// Build a validated reading.
    pub fn new(neighbor: impl Into<StationId>, distance: f64, variance: f64) -> Result<Self> {
        let neighbor = neighbor.into();
        if neighbor.is_empty() {
            return Err(LayoutError::EmptyNeighbor);
        }
        if !distance.is_finite() || distance < 0.0 {
            return Err(LayoutError::InvalidDistance {
                target: neighbor.to_string(),
                value: distance,
            });
        }
        if !variance.is_finite() || variance < 0.0 {
            return Err(LayoutError::InvalidVariance {
                target: neighbor.to_string(),
                value: variance,
            });
        }
        Ok(Self {
            neighbor,
            distance,
            variance,
        })
    }
}

/// The latest snapshot a single station has sent.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborReport {
    pub station: StationId,
    pub readings: Vec<NeighborReading>,
}

impl NeighborReport {
    pub fn new(station: impl Into<StationId>, readings: Vec<NeighborReading>) -> Self {
        Self {
            station: station.into(),
            readings,
        }
    }
}

/// Symmetric N×N distance and variance matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMatrix {
    distance: DMatrix<f64>,
    variance: DMatrix<f64>,
}

impl MeasurementMatrix {
    /// An all-unmeasured matrix over `n` stations.
    pub fn unmeasured(n: usize) -> Self {
        Self {
            distance: DMatrix::zeros(n, n),
            variance: DMatrix::zeros(n, n),
        }
    }

    /// Record a measurement for the unordered pair `(i, j)`.
    ///
    /// Diagonal entries are never written.
    pub fn set(&mut self, i: usize, j: usize, distance: f64, variance: f64) {
        if i == j {
            return;
        }
        self.distance[(i, j)] = distance;
        self.distance[(j, i)] = distance;
        self.variance[(i, j)] = variance;
        self.variance[(j, i)] = variance;
    }

    /// Number of stations covered.
    pub fn len(&self) -> usize {
        self.distance.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance[(i, j)]
    }

    pub fn variance(&self, i: usize, j: usize) -> f64 {
        self.variance[(i, j)]
    }

    /// Whether the pair carries a real (non-sentinel) distance.
    pub fn is_measured(&self, i: usize, j: usize) -> bool {
        i != j && self.distance[(i, j)] > 0.0
    }

    /// Mean over all measured entries, `None` when nothing was measured.
    pub fn mean_measured_distance(&self) -> Option<f64> {
        let (sum, count) = self
            .distance
            .iter()
            .filter(|d| **d > 0.0)
            .fold((0.0, 0usize), |(s, c), d| (s + d, c + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

/// Aggregated measurements with their station index assignment.
///
/// Index `i` belongs to `stations()[i]`; the list is sorted, so index 0 and
/// index 1 are the two lexicographically smallest ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurements {
    stations: Vec<StationId>,
    index: BTreeMap<StationId, usize>,
    matrix: MeasurementMatrix,
}

impl Measurements {
    /// Sorted station list (index → id).
    pub fn stations(&self) -> &[StationId] {
        &self.stations
    }

    /// Id → index map.
    pub fn index(&self) -> &BTreeMap<StationId, usize> {
        &self.index
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn station(&self, index: usize) -> Option<&StationId> {
        self.stations.get(index)
    }

    pub fn matrix(&self) -> &MeasurementMatrix {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[derive(Default)]
struct PairSum {
    distance: f64,
    variance: f64,
    count: usize,
}

/// Fold per-station reports into a single measurement matrix.
///
/// Every id appearing as a reporter or as a named neighbor becomes a
/// station. Readings for the same unordered pair, from either direction,
/// are averaged. A station naming itself is ignored. Empty input yields
/// empty structures.
pub fn aggregate(reports: &[NeighborReport]) -> Measurements {
    let ids: BTreeSet<&StationId> = reports
        .iter()
        .flat_map(|r| std::iter::once(&r.station).chain(r.readings.iter().map(|n| &n.neighbor)))
        .collect();

    let stations: Vec<StationId> = ids.into_iter().cloned().collect();
    let index: BTreeMap<StationId, usize> = stations
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let mut pairs: BTreeMap<(usize, usize), PairSum> = BTreeMap::new();
    for report in reports {
        let a = index[&report.station];
        for reading in &report.readings {
            let b = index[&reading.neighbor];
            if a == b {
                continue;
            }
            let sum = pairs.entry((a.min(b), a.max(b))).or_default();
            sum.distance += reading.distance;
            sum.variance += reading.variance;
            sum.count += 1;
        }
    }

    let mut matrix = MeasurementMatrix::unmeasured(stations.len());
    for ((i, j), sum) in pairs {
        let n = sum.count as f64;
        matrix.set(i, j, sum.distance / n, sum.variance / n);
    }

    Measurements {
        stations,
        index,
        matrix,
    }
}
