//! Viewer-facing event payloads.
//!
//! [`ViewerEvent`] is the closed set of events a dashboard can receive.
//! Payloads are pass-through: the producer's JSON reaches the viewer
//! unchanged. The only shape checks are the ones a tag needs to exist at
//! all (`entities` is an array, an anomaly is an object); the gateway adds
//! `latencyMs` to tracking batches.
//!
//! Every event serializes as an adjacently tagged frame:
//!
//! ```json
//! {"event": "entity:tracking", "data": {"entities": [], "latencyMs": 12}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Event name of entity tracking batches.
pub const ENTITY_TRACKING: &str = "entity:tracking";
/// Event name of detected anomalies.
pub const ANOMALY_DETECTED: &str = "anomaly:detected";
/// Event name of session statistics updates.
pub const SESSION_STATS: &str = "session:stats";
/// Event name of node status updates.
pub const NODE_STATUS: &str = "node:status";
/// Event name of raw sensor frames.
pub const SENSOR_FRAME: &str = "sensor:frame";

/// Deserialize an optional field so that an explicit `null` stays
/// `Some(Value::Null)`. Pair with `#[serde(default)]`, which covers the
/// absent case.
pub fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Entity tracking
// ---------------------------------------------------------------------------

/// Payload of an `entity:tracking` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTracking {
    /// Entities in this frame, exactly as the producer sent them.
    pub entities: Vec<Value>,
    /// Producer frame statistics. Omitted when the producer omitted them.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub stats: Option<Value>,
    /// Producer-to-dispatch latency in milliseconds.
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

/// Payload of an `anomaly:detected` event: the detector's record, kept
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyRecord(pub Map<String, Value>);

impl AnomalyRecord {
    /// Detector-assigned id (`anomalyId`), whatever its JSON type.
    pub fn anomaly_id(&self) -> Option<&Value> {
        self.0.get("anomalyId")
    }

    /// Severity grade as sent (`severity`).
    pub fn severity(&self) -> Option<&Value> {
        self.0.get("severity")
    }
}

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// Every event a viewer can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ViewerEvent {
    /// A batch of entity positions for one frame.
    #[serde(rename = "entity:tracking")]
    EntityTracking(EntityTracking),
    /// A single anomaly record.
    #[serde(rename = "anomaly:detected")]
    AnomalyDetected(AnomalyRecord),
    /// Aggregated session statistics.
    #[serde(rename = "session:stats")]
    SessionStats(Value),
    /// Health/status of one edge node.
    #[serde(rename = "node:status")]
    NodeStatus(Value),
    /// A raw sensor frame from one edge node.
    #[serde(rename = "sensor:frame")]
    SensorFrame(Value),
}

impl ViewerEvent {
    /// The wire name of this event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EntityTracking(_) => ENTITY_TRACKING,
            Self::AnomalyDetected(_) => ANOMALY_DETECTED,
            Self::SessionStats(_) => SESSION_STATS,
            Self::NodeStatus(_) => NODE_STATUS,
            Self::SensorFrame(_) => SENSOR_FRAME,
        }
    }

    /// Serialize this event into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
