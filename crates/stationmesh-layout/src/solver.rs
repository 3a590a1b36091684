//! Position solving by force-directed relaxation.
//!
//! Given a measurement matrix, place every station in the plane so that the
//! Euclidean distances between placed points agree with the measured ones.
//!
//! # Anchoring
//!
//! Index 0 is pinned to the origin and index 1 to `(D[0][1], 0)`. That removes
//! translation and rotation from the solution space. Reflection remains: a
//! mirrored layout is an equally valid answer and is not distinguished.
//!
//! When the anchor pair was never co-measured, index 1 is left free and
//! relaxes like every other point; only the origin stays pinned.
//!
//! # Relaxation
//!
//! Each iteration visits the free points in index order and moves each one,
//! in place, along the sum of unit directions toward its measured partners
//! scaled by the *need* `current - measured`. Too far apart pulls together,
//! too close pushes apart. This is gradient descent on the squared distance
//! error with a step size adapted from the mean absolute need.
//!
//! No global optimum is promised. Collinear or highly symmetric inputs may
//! settle in a local optimum that is ambiguous up to reflection or
//! permutation.

use std::time::{Duration, Instant};

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::aggregate::{MeasurementMatrix, Measurements};
use crate::station::{Point, PositionMap};

/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// Default initial step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// Mean absolute need below which the layout counts as converged.
pub const CONVERGENCE_EPSILON: f64 = 1e-6;

/// Relative signal increase tolerated before the step is shrunk.
pub const DIVERGENCE_TOLERANCE: f64 = 1.01;

/// Divisor applied to the step on divergence.
pub const STEP_SHRINK: f64 = 3.0;

/// Multiplier applied to the step while the signal keeps falling.
pub const STEP_GROWTH: f64 = 1.1;

/// Side of the seeding square when nothing was measured.
const FALLBACK_SPREAD: f64 = 1.0;

/// Below this separation two points are treated as coincident.
const COINCIDENT: f64 = 1e-12;

/// Solver parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of relaxation passes.
    pub max_iterations: usize,
    /// Initial step size.
    pub learning_rate: f64,
    /// Stop once the convergence signal drops below this.
    pub epsilon: f64,
    /// Seed for the initial placement of free points.
    pub seed: u64,
    /// Optional wall-clock budget, checked between iterations.
    pub deadline: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            learning_rate: DEFAULT_LEARNING_RATE,
            epsilon: CONVERGENCE_EPSILON,
            seed: 0,
            deadline: None,
        }
    }
}

impl SolverConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Step-size schedule between iterations.
pub trait StepPolicy {
    /// Step to use for the next iteration given the previous and current
    /// convergence signals.
    fn next_step(&mut self, step: f64, previous: f64, current: f64) -> f64;
}

/// Shrink on divergence, grow while improving.
///
/// - signal rose by more than 1%: divide the step by 3
/// - signal strictly fell: multiply the step by 1.1
/// - otherwise: keep it
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveStep;

impl StepPolicy for AdaptiveStep {
    fn next_step(&mut self, step: f64, previous: f64, current: f64) -> f64 {
        if current > previous * DIVERGENCE_TOLERANCE {
            step / STEP_SHRINK
        } else if current < previous {
            step * STEP_GROWTH
        } else {
            step
        }
    }
}

/// Constant step size.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedStep;

impl StepPolicy for FixedStep {
    fn next_step(&mut self, step: f64, _previous: f64, _current: f64) -> f64 {
        step
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StopReason {
    /// Fewer than two points, or every point is pinned.
    NothingToSolve,
    /// Signal fell below epsilon.
    Converged,
    /// Iteration cap reached.
    IterationCap,
    /// Wall-clock budget exhausted.
    Deadline,
}

/// Per-iteration record of the relaxation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvergenceTrace {
    /// Mean absolute need after each iteration.
    pub signals: Vec<f64>,
    /// Step size used by each iteration.
    pub step_sizes: Vec<f64>,
    pub stop: StopReason,
}

impl ConvergenceTrace {
    fn new() -> Self {
        Self {
            signals: Vec::new(),
            step_sizes: Vec::new(),
            stop: StopReason::NothingToSolve,
        }
    }

    pub fn iterations(&self) -> usize {
        self.signals.len()
    }

    pub fn converged(&self) -> bool {
        self.stop == StopReason::Converged
    }

    pub fn final_signal(&self) -> Option<f64> {
        self.signals.last().copied()
    }
}

/// Solved points by matrix index, plus the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub points: Vec<Point>,
    pub trace: ConvergenceTrace,
}

/// Place every matrix index in the plane.
///
/// Pure and blocking: runs until the signal converges, the iteration cap is
/// hit, or the optional deadline passes. Identical input and seed give
/// identical output.
pub fn solve(matrix: &MeasurementMatrix, config: &SolverConfig, policy: &mut dyn StepPolicy) -> Solution {
    let n = matrix.len();
    let mut trace = ConvergenceTrace::new();
    if n == 0 {
        return Solution {
            points: Vec::new(),
            trace,
        };
    }

    let spread = matrix.mean_measured_distance().unwrap_or(FALLBACK_SPREAD);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut points: Vec<Vector2<f64>> = (0..n)
        .map(|_| Vector2::new(rng.gen::<f64>() * spread, rng.gen::<f64>() * spread))
        .collect();

    points[0] = Vector2::zeros();
    let first_free = if n > 1 && matrix.is_measured(0, 1) {
        points[1] = Vector2::new(matrix.distance(0, 1), 0.0);
        2
    } else {
        1
    };

    if first_free < n {
        trace.stop = relax_until_stable(&mut points, matrix, first_free, config, policy, &mut trace);
    }

    Solution {
        points: points.into_iter().map(Point::from).collect(),
        trace,
    }
}

/// Solve aggregated measurements with the adaptive schedule and key the
/// result by station id.
pub fn solve_positions(measurements: &Measurements, config: &SolverConfig) -> (PositionMap, ConvergenceTrace) {
    let solution = solve(measurements.matrix(), config, &mut AdaptiveStep);
    let positions = measurements
        .stations()
        .iter()
        .cloned()
        .zip(solution.points)
        .collect();
    (positions, solution.trace)
}

fn relax_until_stable(
    points: &mut [Vector2<f64>],
    matrix: &MeasurementMatrix,
    first_free: usize,
    config: &SolverConfig,
    policy: &mut dyn StepPolicy,
    trace: &mut ConvergenceTrace,
) -> StopReason {
    let started = Instant::now();
    let mut step = config.learning_rate;
    let mut previous = f64::INFINITY;

    for _ in 0..config.max_iterations {
        if config.deadline.is_some_and(|budget| started.elapsed() >= budget) {
            return StopReason::Deadline;
        }

        let signal = relax(points, matrix, first_free, step);
        trace.signals.push(signal);
        trace.step_sizes.push(step);

        if signal < config.epsilon {
            return StopReason::Converged;
        }
        step = policy.next_step(step, previous, signal);
        previous = signal;
    }
    StopReason::IterationCap
}

/// One relaxation pass over the free points. Returns the mean absolute need
/// over every measured pair evaluated, or zero if none were.
fn relax(points: &mut [Vector2<f64>], matrix: &MeasurementMatrix, first_free: usize, step: f64) -> f64 {
    let mut total_need = 0.0;
    let mut evaluated = 0usize;

    for i in first_free..points.len() {
        let mut force = Vector2::zeros();
        for j in 0..points.len() {
            if !matrix.is_measured(i, j) {
                continue;
            }
            let offset = points[j] - points[i];
            let current = offset.norm();
            let need = current - matrix.distance(i, j);
            total_need += need.abs();
            evaluated += 1;

            // Coincident points have no direction; they contribute no force.
            if current > COINCIDENT {
                force += offset * (need / current);
            }
        }

        let moved = points[i] + force * step;
        if moved.x.is_finite() && moved.y.is_finite() {
            points[i] = moved;
        }
    }

    if evaluated == 0 {
        0.0
    } else {
        total_need / evaluated as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, NeighborReading, NeighborReport};

    fn report(station: &str, readings: &[(&str, f64, f64)]) -> NeighborReport {
        NeighborReport::new(
            station,
            readings
                .iter()
                .map(|(id, d, v)| NeighborReading::new(*id, *d, *v).unwrap())
                .collect(),
        )
    }

    fn right_triangle() -> Measurements {
        aggregate(&[
            report("A", &[("B", 3.0, 0.01), ("C", 4.0, 0.01)]),
            report("B", &[("C", 5.0, 0.01)]),
        ])
    }

    fn assert_distances_match(positions: &PositionMap, m: &Measurements, tolerance: f64) {
        let mx = m.matrix();
        for i in 0..m.len() {
            for j in (i + 1)..m.len() {
                if !mx.is_measured(i, j) {
                    continue;
                }
                let a = &positions[&m.stations()[i]];
                let b = &positions[&m.stations()[j]];
                let expected = mx.distance(i, j);
                let got = a.distance(b);
                let relative = (got - expected).abs() / expected;
                assert!(
                    relative < tolerance,
                    "pair ({}, {}): expected {}, got {}",
                    i,
                    j,
                    expected,
                    got
                );
            }
        }
    }

    #[test]
    fn empty_matrix_gives_nothing() {
        let solution = solve(&MeasurementMatrix::unmeasured(0), &SolverConfig::default(), &mut AdaptiveStep);
        assert!(solution.points.is_empty());
        assert_eq!(solution.trace.stop, StopReason::NothingToSolve);
    }

    #[test]
    fn single_station_sits_at_origin() {
        let m = aggregate(&[report("S1", &[])]);
        let (positions, trace) = solve_positions(&m, &SolverConfig::default());
        assert_eq!(positions.len(), 1);
        assert_eq!(positions["S1"], Point::ORIGIN);
        assert_eq!(trace.iterations(), 0);
    }

    #[test]
    fn two_stations_are_placed_exactly() {
        let m = aggregate(&[report("P1", &[("P2", 5.0, 0.01)])]);
        let (positions, trace) = solve_positions(&m, &SolverConfig::default());
        assert_eq!(positions["P1"], Point::new(0.0, 0.0));
        assert_eq!(positions["P2"], Point::new(5.0, 0.0));
        assert_eq!(trace.iterations(), 0);
        assert_eq!(trace.stop, StopReason::NothingToSolve);
    }

    #[test]
    fn right_triangle_is_reconstructed() {
        let m = right_triangle();
        let (positions, trace) = solve_positions(&m, &SolverConfig::default().with_seed(7));
        assert_distances_match(&positions, &m, 0.05);
        assert_eq!(positions["A"], Point::ORIGIN);
        assert_eq!(positions["B"], Point::new(3.0, 0.0));
        assert!(trace.iterations() > 0);
    }

    #[test]
    fn same_seed_same_layout() {
        let m = right_triangle();
        let config = SolverConfig::default().with_seed(99);
        let first = solve(m.matrix(), &config, &mut AdaptiveStep);
        let second = solve(m.matrix(), &config, &mut AdaptiveStep);
        assert_eq!(first, second);
    }

    #[test]
    fn distances_hold_across_seeds() {
        let m = right_triangle();
        for seed in [1, 2, 3, 42, 1234] {
            let (positions, _) = solve_positions(&m, &SolverConfig::default().with_seed(seed));
            assert_distances_match(&positions, &m, 0.05);
        }
    }

    #[test]
    fn missing_anchor_pair_frees_second_point() {
        // A-B never co-measured; both are tied to C.
        let m = aggregate(&[report("C", &[("A", 4.0, 0.01), ("B", 3.0, 0.01)])]);
        assert!(!m.matrix().is_measured(0, 1));

        let (positions, trace) = solve_positions(&m, &SolverConfig::default().with_seed(5));
        assert_eq!(positions["A"], Point::ORIGIN);
        assert!(positions.values().all(Point::is_finite));
        assert!(trace.iterations() > 0);
        assert_distances_match(&positions, &m, 0.05);
    }

    #[test]
    fn unmeasured_pair_of_two_converges_immediately() {
        let m = aggregate(&[report("A", &[]), report("B", &[])]);
        let (positions, trace) = solve_positions(&m, &SolverConfig::default());
        assert_eq!(positions["A"], Point::ORIGIN);
        assert!(positions["B"].is_finite());
        assert_eq!(trace.stop, StopReason::Converged);
        assert_eq!(trace.iterations(), 1);
    }

    #[test]
    fn coincident_points_produce_no_nan() {
        let mut mx = MeasurementMatrix::unmeasured(3);
        mx.set(0, 1, 1.0, 0.0);
        mx.set(0, 2, 1.0, 0.0);
        mx.set(1, 2, 1.0, 0.0);
        let mut points = vec![Vector2::zeros(); 3];
        let signal = relax(&mut points, &mx, 2, 0.5);
        assert!(signal.is_finite());
        assert!(points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn iteration_cap_is_respected() {
        let m = aggregate(&[
            report("A", &[("B", 1.0, 0.01), ("C", 2.0, 0.05), ("D", 1.5, 0.02)]),
            report("B", &[("A", 1.05, 0.015), ("C", 1.2, 0.03), ("E", 2.5, 0.1)]),
            report("C", &[("A", 1.95, 0.04), ("B", 1.15, 0.025)]),
            report("D", &[("A", 1.55, 0.025), ("E", 1.0, 0.01)]),
            report("E", &[("B", 2.4, 0.09), ("D", 0.95, 0.015)]),
        ]);
        let config = SolverConfig::default().with_max_iterations(3);
        let (positions, trace) = solve_positions(&m, &config);
        assert_eq!(trace.stop, StopReason::IterationCap);
        assert_eq!(trace.iterations(), 3);
        assert_eq!(positions.len(), 5);
        assert!(positions.values().all(Point::is_finite));
    }

    #[test]
    fn zero_deadline_stops_before_iterating() {
        let m = right_triangle();
        let config = SolverConfig::default().with_deadline(Duration::ZERO);
        let (_, trace) = solve_positions(&m, &config);
        assert_eq!(trace.stop, StopReason::Deadline);
        assert_eq!(trace.iterations(), 0);
    }

    #[test]
    fn fixed_step_keeps_rate() {
        let m = right_triangle();
        let config = SolverConfig::default().with_learning_rate(0.1).with_max_iterations(20);
        let solution = solve(m.matrix(), &config, &mut FixedStep);
        assert!(solution.trace.step_sizes.iter().all(|s| *s == 0.1));
    }

    #[test]
    fn adaptive_step_rules() {
        let mut policy = AdaptiveStep;
        assert!((policy.next_step(0.3, 1.0, 1.02) - 0.1).abs() < 1e-12);
        assert!((policy.next_step(0.3, 1.0, 0.5) - 0.33).abs() < 1e-12);
        assert_eq!(policy.next_step(0.3, 1.0, 1.005), 0.3);
        assert_eq!(policy.next_step(0.3, 1.0, 1.0), 0.3);
    }

    #[test]
    fn first_iteration_grows_step() {
        let m = right_triangle();
        let config = SolverConfig::default().with_seed(3).with_max_iterations(2);
        let solution = solve(m.matrix(), &config, &mut AdaptiveStep);
        let steps = &solution.trace.step_sizes;
        assert_eq!(steps.len(), 2);
        assert!((steps[1] - DEFAULT_LEARNING_RATE * STEP_GROWTH).abs() < 1e-12);
    }
}
