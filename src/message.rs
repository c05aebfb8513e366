//! Wire messages
//!
//! Inbound: one JSON object per frame, classified by a discriminant field.
//! `kind` is canonical; the server's historical `event` field is accepted
//! when `kind` is absent.
//!
//! Outbound: caller-defined JSON objects, passed through without validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::model::{null_as_default, DebugSection, PersistentVolume, SnapshotMap, VolumeTagBag};

/// Discriminant fields, in lookup order
pub const KIND_FIELDS: [&str; 2] = ["kind", "event"];

/// Read the discriminant of a raw payload
pub fn kind_of(payload: &Value) -> Option<&str> {
    KIND_FIELDS
        .iter()
        .find_map(|field| payload.get(field).and_then(Value::as_str))
}

/// A decoded, classified inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Full snapshot of all volumes
    Volumes(IndexMap<String, VolumeTagBag>),
    /// Full snapshot of all EBS snapshots
    Snapshots(SnapshotMap),
    /// PV listing for one cluster
    Pvs {
        cluster: String,
        pvs: Vec<PersistentVolume>,
    },
    /// Debug panel sections, keyed by cluster
    Debug(IndexMap<String, DebugSection>),
    /// Anything else, including payloads with no discriminant
    Unhandled { kind: Option<String> },
}

#[derive(Deserialize)]
struct VolumesBody {
    volumes: IndexMap<String, VolumeTagBag>,
}

#[derive(Deserialize)]
struct SnapshotsBody {
    snapshots: SnapshotMap,
}

#[derive(Deserialize)]
struct PvsBody {
    cluster: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pvs: Vec<PersistentVolume>,
}

#[derive(Deserialize)]
struct DebugBody {
    sections: IndexMap<String, DebugSection>,
}

impl InboundEvent {
    /// Parse frame text into a JSON payload
    pub fn parse(text: &str) -> Result<Value> {
        serde_json::from_str(text).map_err(|e| SyncError::MalformedPayload {
            details: e.to_string(),
        })
    }

    /// Classify and decode a payload
    pub fn decode(payload: &Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(SyncError::MalformedPayload {
                details: format!("expected a JSON object, got {}", type_name(payload)),
            });
        }

        let kind = match kind_of(payload) {
            Some(kind) => kind,
            None => return Ok(Self::Unhandled { kind: None }),
        };

        match kind {
            "volumes" => body::<VolumesBody>(kind, payload).map(|b| Self::Volumes(b.volumes)),
            "snapshots" => {
                body::<SnapshotsBody>(kind, payload).map(|b| Self::Snapshots(b.snapshots))
            }
            "pvs" => body::<PvsBody>(kind, payload).map(|b| Self::Pvs {
                cluster: b.cluster,
                pvs: b.pvs,
            }),
            "debug" => body::<DebugBody>(kind, payload).map(|b| Self::Debug(b.sections)),
            other => Ok(Self::Unhandled {
                kind: Some(other.to_string()),
            }),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &str {
        match self {
            Self::Volumes(_) => "volumes",
            Self::Snapshots(_) => "snapshots",
            Self::Pvs { .. } => "pvs",
            Self::Debug(_) => "debug",
            Self::Unhandled { .. } => "unhandled",
        }
    }
}

fn body<T: for<'de> Deserialize<'de>>(kind: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| SyncError::InvalidEvent {
        kind: kind.to_string(),
        details: e.to_string(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outbound command, sent verbatim as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundCommand(Value);

impl OutboundCommand {
    /// Wrap any JSON value; the payload is not validated
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// `{event: "debugButton", action, ...extra}`.
    ///
    /// `extra` never overrides `event` or `action`.
    pub fn debug_button(action: impl Into<String>, extra: Map<String, Value>) -> Self {
        let mut body = extra;
        body.insert("event".into(), Value::String("debugButton".into()));
        body.insert("action".into(), Value::String(action.into()));
        Self(Value::Object(body))
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Frame text for the wire
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}

impl From<Value> for OutboundCommand {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
