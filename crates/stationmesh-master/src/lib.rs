//! Stationmesh Master
//!
//! The master side of a wireless station mesh. Stations publish the
//! distances they observe to their neighbors, their software version and
//! whether they believe they are master. The master keeps the latest of
//! each, and once per cycle:
//!
//! - reports conflicting master claims,
//! - asks stations on an older version to update,
//! - rebuilds the station layout and nearest-neighbor graph, and
//! - publishes both.
//!
//! # Architecture
//!
//! - **Messages**: typed wire payloads, validated at the boundary
//! - **Coordinator**: shared fleet state and the periodic cycle
//! - **Reconcile**: version ordering and master-conflict detection
//! - **Store / API**: last published layout behind a read-only HTTP API
//! - **Bridge**: JSON-lines adapter for an external pub/sub client
//!
//! # Example
//!
//! ```no_run
//! use stationmesh_master::{MasterConfig, MasterNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MasterConfig::from_env()?;
//!     MasterNode::new(config).run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod messages;
pub mod node;
pub mod publish;
pub mod reconcile;
pub mod store;

pub use config::{CycleConfig, MasterConfig};
pub use coordinator::{CyclePhase, CycleReport, FleetSnapshot, MasterCoordinator, Reconstruction, SkipReason};
pub use error::{DecodeError, Error, Result};
pub use messages::{Channel, Inbound, OutboundMessage, UpdateCommand};
pub use node::MasterNode;
pub use publish::{ChannelPublisher, Clock, ManualClock, Publisher, SystemClock};
pub use reconcile::MasterConflict;
pub use store::{LayoutStore, PublishedLayout, StationView};
