//! # Activity Core
//!
//! Core types, codecs and errors for activity file generation.
//!
//! This crate is pure: it performs no I/O. It defines how audit events look
//! on the append-only log, how they are laid out in the NC binary record
//! format consumed downstream, and how generated files are named.
//!
//! ## Key Types
//!
//! - [`Event`]: A decoded device activity event
//! - [`EventType`]: The exchange type of an event (TIME, MANIFEST, ...)
//! - [`Batch`]: An ordered group of events materialized into one file
//! - [`CounterState`]: Persisted counter used to name generated files
//! - [`SiteId`]: The 19-character site field embedded in every file name
//!
//! ## Codecs
//!
//! - [`wire`]: Pipe-separated text format written to the log
//! - [`record`]: 39-byte NC binary record
//! - [`naming`]: Base-36 file naming

pub mod counter;
pub mod error;
pub mod event;
pub mod naming;
pub mod record;
pub mod wire;

// Re-export main types
pub use counter::CounterState;
pub use error::CodecError;
pub use event::{Batch, Event, EventType};
pub use naming::{REFERENCE_DATE, SiteId, activity_file_name, base36, days_since_reference};
pub use record::{NcRecord, RECORD_LEN, decode_records, encode_batch, encode_event};
pub use wire::{Decode, WireDecoder, format_entry, parse_entry};
