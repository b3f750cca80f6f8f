//! Core data model.
//!
//! A capture is one image taken when the motion sensor fired. It flows through
//! recognition, the dedup gate, and (for non-compliant visitors) a delayed
//! recheck. Every accepted decision becomes a telemetry event.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seconds since the Unix epoch. The wire format of every timestamp the
/// recognition service sees.
pub type Timestamp = f64;

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Newtype for capture IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub Uuid);

impl CaptureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

/// Image dimensions as reported to the recognition service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl Default for ImageShape {
    /// The camera module's native capture: 640x480 RGB.
    fn default() -> Self {
        Self {
            height: 480,
            width: 640,
            channels: 3,
        }
    }
}

/// One image taken by the capture trigger.
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub id: CaptureId,
    pub timestamp: Timestamp,
    pub image: Vec<u8>,
    pub shape: ImageShape,
    pub node_id: String,
}

impl CaptureEvent {
    pub fn new(node_id: impl Into<String>, timestamp: Timestamp, image: Vec<u8>) -> Self {
        Self {
            id: CaptureId::new(),
            timestamp,
            image,
            shape: ImageShape::default(),
            node_id: node_id.into(),
        }
    }

    pub fn shape(mut self, shape: ImageShape) -> Self {
        self.shape = shape;
        self
    }
}

/// A capture waiting in the dispatch queue, plus the headers its outbound
/// request will carry.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub timestamp: Timestamp,
    pub capture: CaptureEvent,
    pub headers: BTreeMap<String, String>,
}

impl DispatchRequest {
    pub fn new(capture: CaptureEvent) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        Self {
            timestamp: capture.timestamp,
            capture,
            headers,
        }
    }

    /// Context handed to the recheck that may follow this capture.
    /// The image itself is not kept.
    pub fn context(&self) -> RequestContext {
        RequestContext {
            capture_id: self.capture.id,
            captured_at: self.capture.timestamp,
            node_id: self.capture.node_id.clone(),
            headers: self.headers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

/// One detected individual in an image.
///
/// `face_found == false` means the image held nobody recognizable; the other
/// fields are then meaningless. `compliant == None` means the service has not
/// decided yet (treated like non-compliant for scheduling a recheck).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub identity: Option<String>,
    pub compliant: Option<bool>,
    pub face_found: bool,
}

impl RecognitionResult {
    pub fn no_face() -> Self {
        Self {
            identity: None,
            compliant: None,
            face_found: false,
        }
    }

    pub fn identified(identity: impl Into<String>, compliant: bool) -> Self {
        Self {
            identity: Some(identity.into()),
            compliant: Some(compliant),
            face_found: true,
        }
    }
}

/// Per-identity answer to a recheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub identity: String,
    pub compliant: bool,
}

/// Context carried from a capture to its recheck.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub capture_id: CaptureId,
    pub captured_at: Timestamp,
    pub node_id: String,
    pub headers: BTreeMap<String, String>,
}

/// Outbound recheck call: every identity due at one instant.
#[derive(Debug, Clone)]
pub struct RecheckRequest {
    pub node_id: String,
    pub identities: Vec<String>,
    pub timestamp: Timestamp,
    pub captured_at: Timestamp,
    pub capture_ids: Vec<CaptureId>,
    pub headers: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Recheck
// ---------------------------------------------------------------------------

/// Identities scheduled for a second recognition pass.
#[derive(Debug, Clone)]
pub struct RecheckEntry {
    pub fire_at: Timestamp,
    pub identities: BTreeSet<String>,
    pub context: RequestContext,
}

impl RecheckEntry {
    pub fn new(
        fire_at: Timestamp,
        identities: impl IntoIterator<Item = String>,
        context: RequestContext,
    ) -> Self {
        Self {
            fire_at,
            identities: identities.into_iter().collect(),
            context,
        }
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Display metadata for a staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub identity: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "unknown_field")]
    pub title: String,
    #[serde(default = "unknown_field")]
    pub unit: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl StaffProfile {
    /// Placeholder used when the store has no record for an identity.
    pub fn unknown(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            name: None,
            title: unknown_field(),
            unit: unknown_field(),
            department: None,
            phone: None,
        }
    }

    /// Name used when addressing the person, falling back to the identity.
    pub fn display_name(&self) -> String {
        let name = self.name.as_deref().unwrap_or(&self.identity);
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Display metadata for the device's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProfile {
    pub node_id: String,
    #[serde(default = "unknown_field")]
    pub unit: String,
    #[serde(default = "unknown_field")]
    pub room_number: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl NodeProfile {
    pub fn unknown(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            unit: unknown_field(),
            room_number: unknown_field(),
            department: None,
        }
    }
}

fn unknown_field() -> String {
    "unknown".to_string()
}

// ---------------------------------------------------------------------------
// Telemetry events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Entry,
    Alert,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Entry => "Entry",
            EventType::Alert => "Alert",
        };
        write!(f, "{s}")
    }
}

/// What the pipeline decided about one person, as reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMessage {
    #[serde(rename = "Clean")]
    Clean,
    #[serde(rename = "Not clean")]
    NotClean,
    #[serde(rename = "Alert given")]
    AlertGiven,
    #[serde(rename = "No alert")]
    NoAlert,
}

impl ResponseMessage {
    pub fn entry(compliant: bool) -> Self {
        if compliant {
            ResponseMessage::Clean
        } else {
            ResponseMessage::NotClean
        }
    }

    pub fn alert(compliant: bool) -> Self {
        if compliant {
            ResponseMessage::NoAlert
        } else {
            ResponseMessage::AlertGiven
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMessage::Clean => "Clean",
            ResponseMessage::NotClean => "Not clean",
            ResponseMessage::AlertGiven => "Alert given",
            ResponseMessage::NoAlert => "No alert",
        }
    }
}

impl std::fmt::Display for ResponseMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured compliance record for the analytics sink. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// ISO-8601 UTC.
    pub time: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub node_id: String,
    pub identity: String,
    pub title: String,
    pub unit: String,
    pub room: String,
    pub response_type: EventType,
    pub response_message: ResponseMessage,
}

impl TelemetryEvent {
    pub fn build(
        event_type: EventType,
        time: DateTime<Utc>,
        node: &NodeProfile,
        staff: &StaffProfile,
        message: ResponseMessage,
    ) -> Self {
        Self {
            time: time.to_rfc3339_opts(SecondsFormat::Micros, true),
            event_type,
            node_id: node.node_id.clone(),
            identity: staff.identity.clone(),
            title: staff.title.clone(),
            unit: node.unit.clone(),
            room: node.room_number.clone(),
            response_type: event_type,
            response_message: message,
        }
    }
}
