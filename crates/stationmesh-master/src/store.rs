//! Last published layout, kept for read-only queries.

use std::sync::Arc;

use serde::Serialize;
use stationmesh_layout::{ConnectivityGraph, Point, PositionMap, StationId};
use tokio::sync::RwLock;

/// A layout as it went out on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedLayout {
    /// Cycle that produced it; 0 before the first publish.
    pub cycle: u64,
    /// Publish time in milliseconds since the Unix epoch.
    pub published_at_ms: u64,
    pub positions: PositionMap,
    pub graph: ConnectivityGraph,
}

/// One station's slice of the published layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationView {
    pub station: StationId,
    pub position: Point,
    pub neighbors: Vec<StationId>,
}

/// Shared handle to the most recently published layout.
///
/// Cloning shares the same underlying slot.
#[derive(Debug, Clone, Default)]
pub struct LayoutStore {
    current: Arc<RwLock<Arc<PublishedLayout>>>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published layout.
    pub async fn replace(&self, layout: PublishedLayout) {
        *self.current.write().await = Arc::new(layout);
    }

    /// Position and neighbors of one station, `None` if unknown.
    pub async fn lookup(&self, station: &str) -> Option<StationView> {
        let layout = self.current.read().await;
        let (id, position) = layout.positions.get_key_value(station)?;
        let neighbors = layout
            .graph
            .get(station)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Some(StationView {
            station: id.clone(),
            position: *position,
            neighbors,
        })
    }

    /// The whole published layout.
    pub async fn dump(&self) -> Arc<PublishedLayout> {
        Arc::clone(&*self.current.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> PublishedLayout {
        let mut positions = PositionMap::new();
        positions.insert("A".into(), Point::new(0.0, 0.0));
        positions.insert("B".into(), Point::new(3.0, 0.0));
        let mut graph = ConnectivityGraph::new();
        graph.insert("A".into(), BTreeSet::from([StationId::from("B")]));
        graph.insert("B".into(), BTreeSet::from([StationId::from("A")]));
        PublishedLayout {
            cycle: 4,
            published_at_ms: 1_000,
            positions,
            graph,
        }
    }

    #[tokio::test]
    async fn empty_before_first_publish() {
        let store = LayoutStore::new();
        assert!(store.lookup("A").await.is_none());
        assert_eq!(store.dump().await.cycle, 0);
    }

    #[tokio::test]
    async fn lookup_known_and_unknown() {
        let store = LayoutStore::new();
        store.replace(sample()).await;

        let view = store.lookup("B").await.unwrap();
        assert_eq!(view.position, Point::new(3.0, 0.0));
        assert_eq!(view.neighbors, vec![StationId::from("A")]);
        assert!(store.lookup("Z").await.is_none());
    }

    #[tokio::test]
    async fn clones_share_the_slot() {
        let store = LayoutStore::new();
        let reader = store.clone();
        store.replace(sample()).await;
        assert_eq!(reader.dump().await.cycle, 4);
    }
}
