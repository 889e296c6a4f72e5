//! Activity events and batches

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Exchange type of an audit event
///
/// Unknown type strings are kept verbatim in [`EventType::Other`] so they can
/// be written back unchanged; they encode as exchange nature `0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Device clock synchronization
    Time,
    /// Manifest request
    Manifest,
    /// File chunk download
    Download,
    /// Download confirmation
    Confirm,
    /// Any other type string
    Other(String),
}

impl EventType {
    /// Parse a type field. Matching is case-sensitive.
    pub fn parse(value: &str) -> Self {
        match value {
            "TIME" => Self::Time,
            "MANIFEST" => Self::Manifest,
            "DOWNLOAD" => Self::Download,
            "CONFIRM" => Self::Confirm,
            other => Self::Other(other.to_string()),
        }
    }

    /// The type string as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Self::Time => "TIME",
            Self::Manifest => "MANIFEST",
            Self::Download => "DOWNLOAD",
            Self::Confirm => "CONFIRM",
            Self::Other(s) => s,
        }
    }

    /// Exchange nature code written into the NC record
    pub fn exchange_nature(&self) -> u8 {
        match self {
            Self::Time => 1,
            Self::Manifest => 2,
            Self::Download => 3,
            Self::Confirm => 4,
            Self::Other(_) => 0,
        }
    }

    /// Whether this event marks activity files as pending and downloaded
    pub fn is_download(&self) -> bool {
        matches!(self, Self::Download)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single device activity event decoded from the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the activity happened (millisecond precision)
    pub timestamp: NaiveDateTime,
    /// Exchange type
    pub event_type: EventType,
    /// Device identifier
    pub device_id: String,
    /// Free-form payload, not written to the binary record
    pub data: String,
}

impl Event {
    /// Create a new event
    pub fn new(
        timestamp: NaiveDateTime,
        event_type: EventType,
        device_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event_type,
            device_id: device_id.into(),
            data: data.into(),
        }
    }
}

/// An ordered group of events materialized together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    events: Vec<Event>,
}

impl Batch {
    /// Create a batch from events, preserving their order
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// The events in arrival order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The first event, whose date names the file
    pub fn first(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the batch, returning its events
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl From<Vec<Event>> for Batch {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}
