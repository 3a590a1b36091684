//! Master Coordinator - owns fleet state and drives the reconciliation cycle.
//!
//! Two kinds of callers touch the coordinator concurrently:
//!
//! - **Message handlers**, once per delivered report, in any order and in
//!   parallel with each other. Each handler mutates exactly one of the
//!   buffers below under the state lock.
//! - **The cycle**, a single instance at a time. It copies all buffers in
//!   one critical section and works on that snapshot with no lock held.
//!
//! # Cycle
//!
//! ```text
//! Idle → Tick → ConflictCheck → VersionReconcile → Reconstruct → Publish → Idle
//! ```
//!
//! Reconstruction runs the layout pipeline on the blocking pool. A slow
//! reconstruction delays the next tick; cycles never overlap.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use stationmesh_layout::{
    aggregate, build_graph, solve_positions, ConvergenceTrace, Layout, NeighborReading, NeighborReport, SolverConfig,
    StationId,
};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CycleConfig;
use crate::error::DecodeError;
use crate::messages::{Inbound, OutboundMessage, UpdateCommand};
use crate::publish::{Clock, Publisher};
use crate::reconcile::{check_master_claims, update_commands, MasterConflict};
use crate::store::{LayoutStore, PublishedLayout};

/// Fewest stations worth laying out.
const MIN_STATIONS: usize = 2;

/// Phase of the reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Tick,
    ConflictCheck,
    VersionReconcile,
    Reconstruct,
    Publish,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Tick => write!(f, "Tick"),
            Self::ConflictCheck => write!(f, "ConflictCheck"),
            Self::VersionReconcile => write!(f, "VersionReconcile"),
            Self::Reconstruct => write!(f, "Reconstruct"),
            Self::Publish => write!(f, "Publish"),
        }
    }
}

/// Why a cycle published no layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No station has reported measurements yet.
    NoMeasurements,
    /// Measurements name fewer than two stations.
    TooFewStations(usize),
}

/// What the Reconstruct phase did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstruction {
    Skipped(SkipReason),
    Published { stations: usize, trace: ConvergenceTrace },
    /// The solver task died; the cycle carried on.
    Failed(String),
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: SystemTime,
    pub conflict: Option<MasterConflict>,
    pub update_commands: Vec<UpdateCommand>,
    pub reconstruction: Reconstruction,
}

/// Everything the handlers write, guarded as one unit.
#[derive(Debug, Default)]
struct FleetState {
    /// Latest neighbor snapshot per reporting station.
    reports: BTreeMap<StationId, Vec<NeighborReading>>,
    versions: BTreeMap<StationId, String>,
    /// Add-only.
    master_claims: BTreeSet<StationId>,
}

/// Copy of the fleet state taken at tick time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSnapshot {
    pub reports: Vec<NeighborReport>,
    pub versions: BTreeMap<StationId, String>,
    pub master_claims: BTreeSet<StationId>,
}

impl FleetState {
    fn apply(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::StationReport(report) => {
                self.reports.insert(report.station, report.readings);
            }
            Inbound::VersionReport { station, version } => {
                self.versions.insert(station, version);
            }
            Inbound::MasterAnnounce { station, is_master } => {
                if is_master {
                    self.master_claims.insert(station);
                }
            }
        }
    }

    fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            reports: self
                .reports
                .iter()
                .map(|(station, readings)| NeighborReport::new(station.clone(), readings.clone()))
                .collect(),
            versions: self.versions.clone(),
            master_claims: self.master_claims.clone(),
        }
    }
}

/// The master: shared fleet state plus the periodic cycle.
pub struct MasterCoordinator {
    state: Mutex<FleetState>,
    /// Held for the whole of a cycle.
    cycle_lock: Mutex<()>,
    config: CycleConfig,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    store: LayoutStore,
    phase: watch::Sender<CyclePhase>,
    cycles: AtomicU64,
}

impl fmt::Debug for MasterCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterCoordinator")
            .field("config", &self.config)
            .field("phase", &*self.phase.borrow())
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MasterCoordinator {
    /// Create a coordinator with injected transport and clock.
    pub fn new(config: CycleConfig, publisher: Arc<dyn Publisher>, clock: Arc<dyn Clock>) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        debug!(period = ?config.period, "Created master coordinator");
        Self {
            state: Mutex::new(FleetState::default()),
            cycle_lock: Mutex::new(()),
            config,
            publisher,
            clock,
            store: LayoutStore::new(),
            phase,
            cycles: AtomicU64::new(0),
        }
    }

    /// Handle to the last published layout, for queries.
    pub fn store(&self) -> LayoutStore {
        self.store.clone()
    }

    /// Watch the cycle phase.
    pub fn phases(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Current cycle phase.
    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Decode a raw message and apply it.
    ///
    /// Undecodable payloads are logged and dropped without touching state.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        match Inbound::decode(topic, payload) {
            Ok(inbound) => {
                self.apply(inbound).await;
                Ok(())
            }
            Err(e) => {
                warn!(topic, error = %e, "Dropping inbound message");
                Err(e)
            }
        }
    }

    /// Apply an already decoded message.
    pub async fn apply(&self, inbound: Inbound) {
        let station = inbound.station();
        match &inbound {
            Inbound::StationReport(report) => debug!(%station, readings = report.readings.len(), "Neighbor report"),
            Inbound::VersionReport { version, .. } => debug!(%station, version, "Version report"),
            Inbound::MasterAnnounce { is_master, .. } => debug!(%station, is_master, "Master announcement"),
        }
        self.state.lock().await.apply(inbound);
    }

    /// Copy all fleet buffers in one critical section.
    pub async fn snapshot(&self) -> FleetSnapshot {
        self.state.lock().await.snapshot()
    }

    fn enter(&self, phase: CyclePhase) {
        self.phase.send_replace(phase);
        debug!(%phase, "Cycle phase");
    }

    fn send(&self, message: OutboundMessage) {
        let topic = message.topic.clone();
        if let Err(e) = self.publisher.publish(message) {
            warn!(%topic, error = %e, "Publish failed");
        }
    }

    /// Run one full cycle.
    ///
    /// Concurrent callers queue; at most one cycle is active at a time.
    pub async fn run_cycle(&self) -> CycleReport {
        let _running = self.cycle_lock.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = self.clock.now();

        self.enter(CyclePhase::Tick);
        let snapshot = self.snapshot().await;

        self.enter(CyclePhase::ConflictCheck);
        let conflict = check_master_claims(&snapshot.master_claims);
        match &conflict {
            Some(c) => warn!(
                cycle,
                claimants = ?c.claimants,
                presumed = %c.presumed,
                "More than one master claimed; not resolving"
            ),
            None => debug!(cycle, masters = ?snapshot.master_claims, "Master claims"),
        }

        self.enter(CyclePhase::VersionReconcile);
        let commands = update_commands(&snapshot.versions);
        for command in &commands {
            match OutboundMessage::update_command(command) {
                Ok(message) => {
                    info!(
                        station = %command.station,
                        required = %command.required_version,
                        current = %command.your_version,
                        "Requesting update"
                    );
                    self.send(message);
                }
                Err(e) => error!(station = %command.station, error = %e, "Cannot encode update command"),
            }
        }

        self.enter(CyclePhase::Reconstruct);
        let reconstruction = if snapshot.reports.is_empty() {
            info!(cycle, "No measurements; skipping reconstruction");
            Reconstruction::Skipped(SkipReason::NoMeasurements)
        } else {
            self.reconstruct(cycle, snapshot.reports).await
        };

        self.enter(CyclePhase::Idle);
        CycleReport {
            cycle,
            started_at,
            conflict,
            update_commands: commands,
            reconstruction,
        }
    }

    async fn reconstruct(&self, cycle: u64, reports: Vec<NeighborReport>) -> Reconstruction {
        let solver = self.config.solver_for_cycle();
        let seed = solver.seed;
        let outcome = tokio::task::spawn_blocking(move || layout_reports(&reports, &solver)).await;

        match outcome {
            Ok(Err(stations)) => {
                info!(cycle, stations, "Too few stations; skipping reconstruction");
                Reconstruction::Skipped(SkipReason::TooFewStations(stations))
            }
            Ok(Ok(layout)) => {
                info!(
                    cycle,
                    stations = layout.len(),
                    iterations = layout.trace.iterations(),
                    stop = ?layout.trace.stop,
                    seed,
                    "Layout recomputed"
                );
                self.enter(CyclePhase::Publish);
                self.publish_layout(cycle, &layout).await;
                Reconstruction::Published {
                    stations: layout.len(),
                    trace: layout.trace,
                }
            }
            Err(e) => {
                error!(cycle, error = %e, "Solver task failed");
                Reconstruction::Failed(e.to_string())
            }
        }
    }

    async fn publish_layout(&self, cycle: u64, layout: &Layout) {
        match OutboundMessage::positions(&layout.positions) {
            Ok(message) => self.send(message),
            Err(e) => error!(cycle, error = %e, "Cannot encode positions"),
        }
        match OutboundMessage::graph(&layout.graph) {
            Ok(message) => self.send(message),
            Err(e) => error!(cycle, error = %e, "Cannot encode graph"),
        }
        self.store
            .replace(PublishedLayout {
                cycle,
                published_at_ms: self.clock.now_millis(),
                positions: layout.positions.clone(),
                graph: layout.graph.clone(),
            })
            .await;
        info!(cycle, stations = layout.len(), "Topology published");
    }

    /// Tick every period until `shutdown` flips to true or its sender drops.
    ///
    /// The first cycle runs one full period after start.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(period = ?self.config.period, "Reconciliation cycle started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciliation cycle stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Aggregate, solve and build the graph, or report how many stations there
/// were if that is too few to lay out.
fn layout_reports(reports: &[NeighborReport], solver: &SolverConfig) -> Result<Layout, usize> {
    let measurements = aggregate(reports);
    if measurements.len() < MIN_STATIONS {
        return Err(measurements.len());
    }
    let (positions, trace) = solve_positions(&measurements, solver);
    let graph = build_graph(&positions);
    Ok(Layout {
        positions,
        graph,
        trace,
    })
}
