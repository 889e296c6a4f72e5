//! Wire format of audit entries on the append-only log
//!
//! Each log record holds one UTF-8 line of four pipe-separated fields:
//!
//! ```text
//! 2024-01-01T08:30:00.125|DOWNLOAD|DEV-0001|firmware.bin:0:4096
//! ```
//!
//! The data field is the remainder of the line and may itself contain `|`.

use chrono::NaiveDateTime;
use tracing::trace;

use crate::error::CodecError;
use crate::event::{Event, EventType};

/// chrono format of the timestamp field
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Exact length of a `yyyy-MM-ddTHH:mm:ss.fff` timestamp
const TIMESTAMP_LEN: usize = 23;

const FIELD_SEPARATOR: char = '|';

/// Capability to turn raw log bytes into a typed value
///
/// Returning `None` drops the record; the log cursor still advances past it.
pub trait Decode: Send + Sync {
    /// The decoded value handed to subscribers
    type Item: Send + 'static;

    /// Decode one raw log record
    fn decode(&self, bytes: &[u8]) -> Option<Self::Item>;
}

/// Decoder for the pipe-separated audit wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct WireDecoder;

impl Decode for WireDecoder {
    type Item = Event;

    fn decode(&self, bytes: &[u8]) -> Option<Event> {
        match parse_entry(bytes) {
            Ok(event) => Some(event),
            Err(e) => {
                trace!(error = %e, len = bytes.len(), "Dropping malformed entry");
                None
            }
        }
    }
}

/// Parse one wire entry into an [`Event`]
pub fn parse_entry(bytes: &[u8]) -> Result<Event, CodecError> {
    let text = std::str::from_utf8(bytes)?;
    // Data keeps any further separators; it is never written to the record
    let fields: Vec<&str> = text.splitn(4, FIELD_SEPARATOR).collect();
    if fields.len() < 4 {
        return Err(CodecError::MissingFields {
            found: fields.len(),
        });
    }

    Ok(Event {
        timestamp: parse_timestamp(fields[0])?,
        event_type: EventType::parse(fields[1]),
        device_id: fields[2].to_string(),
        data: fields[3].to_string(),
    })
}

/// Format an [`Event`] as a wire entry
pub fn format_entry(event: &Event) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        event.timestamp.format(TIMESTAMP_FORMAT),
        event.event_type,
        event.device_id,
        event.data,
        sep = FIELD_SEPARATOR,
    )
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, CodecError> {
    // chrono's %.3f accepts any fraction width, the wire format does not
    if value.len() != TIMESTAMP_LEN || value.as_bytes()[19] != b'.' {
        return Err(CodecError::invalid_timestamp(
            value,
            "expected yyyy-MM-ddTHH:mm:ss.fff",
        ));
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| CodecError::invalid_timestamp(value, e))
}
