//! Wire messages exchanged over the pub/sub transport.
//!
//! Inbound topics:
//!
//! | Topic | Payload |
//! |---|---|
//! | `station/{id}/neighbors` | `{"from": id, "data": [{"id", "dist", "var"}]}` |
//! | `station/{id}/version` | `{"id": id, "version": "1.0"}` |
//! | `station/{id}/is_master` | `{"id": id, "is_master": true}` |
//!
//! Outbound topics: `station/{id}/update`, `topology/positions`,
//! `topology/graph`.
//!
//! The `{id}` segment of an inbound topic only routes the message. The
//! station named inside the payload is the one the message is about.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stationmesh_layout::{ConnectivityGraph, NeighborReading, NeighborReport, PositionMap, StationId};

use crate::error::DecodeError;

/// Topic carrying recomputed positions.
pub const POSITIONS_TOPIC: &str = "topology/positions";

/// Topic carrying the connectivity graph.
pub const GRAPH_TOPIC: &str = "topology/graph";

const STATION_PREFIX: &str = "station";

/// Inbound channel a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    StationReport,
    VersionReport,
    MasterAnnounce,
}

impl Channel {
    /// Classify an inbound topic.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let mut parts = topic.split('/');
        let (Some(STATION_PREFIX), Some(id), Some(kind), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        if id.is_empty() {
            return None;
        }
        match kind {
            "neighbors" => Some(Self::StationReport),
            "version" => Some(Self::VersionReport),
            "is_master" => Some(Self::MasterAnnounce),
            _ => None,
        }
    }
}

/// Topic addressing an update command to one station.
pub fn update_topic(station: &StationId) -> String {
    format!("{STATION_PREFIX}/{station}/update")
}

#[derive(Debug, Deserialize)]
struct ReadingWire {
    id: String,
    dist: f64,
    var: f64,
}

#[derive(Debug, Deserialize)]
struct StationReportWire {
    from: String,
    data: Vec<ReadingWire>,
}

#[derive(Debug, Deserialize)]
struct VersionReportWire {
    id: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct MasterAnnounceWire {
    id: String,
    is_master: bool,
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Latest neighbor snapshot of one station.
    StationReport(NeighborReport),
    /// Software version a station runs.
    VersionReport { station: StationId, version: String },
    /// A station stating whether it considers itself master.
    MasterAnnounce { station: StationId, is_master: bool },
}

impl Inbound {
    /// Decode and validate a raw payload received on `topic`.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        let channel = Channel::from_topic(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        let malformed = |source: serde_json::Error| DecodeError::Malformed {
            topic: topic.to_string(),
            source,
        };

        match channel {
            Channel::StationReport => {
                let wire: StationReportWire = serde_json::from_slice(payload).map_err(malformed)?;
                let station = non_empty(wire.from, topic)?;
                let readings = wire
                    .data
                    .into_iter()
                    .map(|r| NeighborReading::new(r.id, r.dist, r.var))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| DecodeError::InvalidReading {
                        station: station.to_string(),
                        source,
                    })?;
                Ok(Self::StationReport(NeighborReport { station, readings }))
            }
            Channel::VersionReport => {
                let wire: VersionReportWire = serde_json::from_slice(payload).map_err(malformed)?;
                let station = non_empty(wire.id, topic)?;
                let version = wire.version.trim().to_string();
                if version.is_empty() {
                    return Err(DecodeError::EmptyVersion(station.to_string()));
                }
                Ok(Self::VersionReport { station, version })
            }
            Channel::MasterAnnounce => {
                let wire: MasterAnnounceWire = serde_json::from_slice(payload).map_err(malformed)?;
                let station = non_empty(wire.id, topic)?;
                Ok(Self::MasterAnnounce {
                    station,
                    is_master: wire.is_master,
                })
            }
        }
    }

    /// Station the message is about.
    pub fn station(&self) -> &StationId {
        match self {
            Self::StationReport(report) => &report.station,
            Self::VersionReport { station, .. } | Self::MasterAnnounce { station, .. } => station,
        }
    }
}

fn non_empty(id: String, topic: &str) -> Result<StationId, DecodeError> {
    let id = id.trim();
    if id.is_empty() {
        Err(DecodeError::EmptyStation(topic.to_string()))
    } else {
        Ok(StationId::new(id))
    }
}

/// Instruction for a station to move to the fleet's newest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCommand {
    #[serde(skip)]
    pub station: StationId,
    pub required_version: String,
    pub your_version: String,
}

/// A message ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Value,
}

impl OutboundMessage {
    fn json<T: Serialize>(topic: String, body: &T) -> serde_json::Result<Self> {
        Ok(Self {
            topic,
            payload: serde_json::to_value(body)?,
        })
    }

    pub fn update_command(command: &UpdateCommand) -> serde_json::Result<Self> {
        Self::json(update_topic(&command.station), command)
    }

    pub fn positions(positions: &PositionMap) -> serde_json::Result<Self> {
        Self::json(POSITIONS_TOPIC.to_string(), positions)
    }

    pub fn graph(graph: &ConnectivityGraph) -> serde_json::Result<Self> {
        Self::json(GRAPH_TOPIC.to_string(), graph)
    }

    /// Payload as JSON bytes.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stationmesh_layout::Point;
    use std::collections::BTreeSet;

    #[test]
    fn topics_are_classified() {
        assert_eq!(Channel::from_topic("station/N1/neighbors"), Some(Channel::StationReport));
        assert_eq!(Channel::from_topic("station/N1/version"), Some(Channel::VersionReport));
        assert_eq!(Channel::from_topic("station/N1/is_master"), Some(Channel::MasterAnnounce));
        assert_eq!(Channel::from_topic("station/N1/update"), None);
        assert_eq!(Channel::from_topic("station//version"), None);
        assert_eq!(Channel::from_topic("station/N1/version/extra"), None);
        assert_eq!(Channel::from_topic("topology/positions"), None);
    }

    #[test]
    fn decodes_station_report() {
        let payload = br#"{"from": "N2", "data": [{"id": "N1", "dist": 10.2, "var": 0.1}]}"#;
        let inbound = Inbound::decode("station/N1/neighbors", payload).unwrap();
        let Inbound::StationReport(report) = inbound else {
            panic!("expected station report");
        };
        // The payload's reporter wins over the topic segment.
        assert_eq!(report.station.as_str(), "N2");
        assert_eq!(report.readings.len(), 1);
        assert_eq!(report.readings[0].neighbor.as_str(), "N1");
        assert_eq!(report.readings[0].distance, 10.2);
    }

    #[test]
    fn decodes_version_and_announce() {
        let v = Inbound::decode("station/A/version", br#"{"id": "A", "version": "1.0"}"#).unwrap();
        assert_eq!(
            v,
            Inbound::VersionReport {
                station: "A".into(),
                version: "1.0".into()
            }
        );
        let m = Inbound::decode("station/A/is_master", br#"{"id": "A", "is_master": true}"#).unwrap();
        assert_eq!(m.station().as_str(), "A");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            Inbound::decode("station/A/version", b"not json"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            Inbound::decode("station/A/version", br#"{"id": "A"}"#),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            Inbound::decode("station/A/neighbors", br#"{"from": "A", "data": [{"id": "B", "dist": 1.0}]}"#),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            Inbound::decode("station/A/neighbors", br#"{"from": "A", "data": [{"id": "B", "dist": -1.0, "var": 0.1}]}"#),
            Err(DecodeError::InvalidReading { .. })
        ));
        assert!(matches!(
            Inbound::decode("station/A/is_master", br#"{"id": " ", "is_master": true}"#),
            Err(DecodeError::EmptyStation(_))
        ));
        assert!(matches!(
            Inbound::decode("station/A/version", br#"{"id": "A", "version": ""}"#),
            Err(DecodeError::EmptyVersion(_))
        ));
        assert!(matches!(
            Inbound::decode("other/topic", b"{}"),
            Err(DecodeError::UnknownTopic(_))
        ));
    }

    #[test]
    fn update_command_wire_shape() {
        let cmd = UpdateCommand {
            station: "C".into(),
            required_version: "1.0".into(),
            your_version: "0.9".into(),
        };
        let msg = OutboundMessage::update_command(&cmd).unwrap();
        assert_eq!(msg.topic, "station/C/update");
        assert_eq!(msg.payload, json!({"required_version": "1.0", "your_version": "0.9"}));
    }

    #[test]
    fn layout_wire_shapes() {
        let mut positions = PositionMap::new();
        positions.insert("P1".into(), Point::new(0.0, 0.0));
        positions.insert("P2".into(), Point::new(5.0, 0.0));
        let msg = OutboundMessage::positions(&positions).unwrap();
        assert_eq!(msg.topic, POSITIONS_TOPIC);
        assert_eq!(msg.payload, json!({"P1": [0.0, 0.0], "P2": [5.0, 0.0]}));

        let mut graph = ConnectivityGraph::new();
        graph.insert("P1".into(), BTreeSet::from([StationId::from("P2")]));
        graph.insert("P2".into(), BTreeSet::from([StationId::from("P1")]));
        let msg = OutboundMessage::graph(&graph).unwrap();
        assert_eq!(msg.topic, GRAPH_TOPIC);
        assert_eq!(msg.payload, json!({"P1": ["P2"], "P2": ["P1"]}));
    }
}
