//! NC binary record format
//!
//! Every event is written as one fixed 39-byte record. The length field
//! counts the 35 bytes that follow the tag and the length itself:
//!
//! ```text
//! offset  size  field
//!  0      2     tag "NC"
//!  2      2     record length (u16 BE, always 35)
//!  4      4     date: year (i16 BE), month, day
//!  8      3     time: hour, minute, second
//! 11      2     exchange duration (always 0)
//! 13     19     device id (ASCII, space padded)
//! 32      1     direction (always 1, device to server)
//! 33      1     exchange nature
//! 34      1     result code (always 0, success)
//! 35      4     flags: pending download, downloaded, pending params, params done
//! ```

use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::CodecError;
use crate::event::{Batch, Event};

/// Record tag
pub const RECORD_TAG: [u8; 2] = *b"NC";

/// Length field value: everything after the tag and length
pub const RECORD_BODY_LEN: u16 = 35;

/// Total size of one record in bytes: tag, length field and body
pub const RECORD_LEN: usize = 4 + RECORD_BODY_LEN as usize;

/// Width of the device id field
pub const DEVICE_ID_LEN: usize = 19;

const DIRECTION_DEVICE_TO_SERVER: u8 = 1;
const RESULT_SUCCESS: u8 = 0;

/// Append the NC record for `event` to `buf`
pub fn encode_event(event: &Event, buf: &mut impl BufMut) {
    let ts = &event.timestamp;
    let download = u8::from(event.event_type.is_download());

    buf.put_slice(&RECORD_TAG);
    buf.put_u16(RECORD_BODY_LEN);

    buf.put_i16(ts.year() as i16);
    buf.put_u8(ts.month() as u8);
    buf.put_u8(ts.day() as u8);

    buf.put_u8(ts.hour() as u8);
    buf.put_u8(ts.minute() as u8);
    buf.put_u8(ts.second() as u8);

    // Duration of the exchange is not tracked
    buf.put_u16(0);

    buf.put_slice(&device_id_field(&event.device_id));

    buf.put_u8(DIRECTION_DEVICE_TO_SERVER);
    buf.put_u8(event.event_type.exchange_nature());
    buf.put_u8(RESULT_SUCCESS);

    buf.put_u8(download);
    buf.put_u8(download);
    buf.put_u8(0);
    buf.put_u8(0);
}

/// Encode every event of a batch, in order
pub fn encode_batch(batch: &Batch) -> BytesMut {
    let mut buf = BytesMut::with_capacity(batch.len() * RECORD_LEN);
    for event in batch.events() {
        encode_event(event, &mut buf);
    }
    buf
}

/// Device id as a fixed ASCII field; non-ASCII characters become `?`
fn device_id_field(device_id: &str) -> [u8; DEVICE_ID_LEN] {
    let mut field = [b' '; DEVICE_ID_LEN];
    for (slot, c) in field.iter_mut().zip(device_id.chars()) {
        *slot = if c.is_ascii() { c as u8 } else { b'?' };
    }
    field
}

/// A decoded NC record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcRecord {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration: u16,
    /// Device id with padding removed
    pub device_id: String,
    pub direction: u8,
    pub exchange_nature: u8,
    pub result: u8,
    /// Pending download, downloaded, pending params, params done
    pub flags: [u8; 4],
}

impl NcRecord {
    /// Decode a single record from the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < RECORD_LEN {
            return Err(CodecError::TruncatedRecord {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = &bytes[..RECORD_LEN];

        let tag = [buf.get_u8(), buf.get_u8()];
        if tag != RECORD_TAG {
            return Err(CodecError::InvalidTag(tag));
        }
        let len = buf.get_u16();
        if len != RECORD_BODY_LEN {
            return Err(CodecError::InvalidLength(len));
        }

        let (year, month, day) = (buf.get_i16(), buf.get_u8(), buf.get_u8());
        let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .ok_or_else(|| CodecError::InvalidDate(format!("{year}-{month}-{day}")))?;

        let (hour, minute, second) = (buf.get_u8(), buf.get_u8(), buf.get_u8());
        let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
            .ok_or_else(|| CodecError::InvalidDate(format!("{hour}:{minute}:{second}")))?;

        let duration = buf.get_u16();

        let mut device = [0u8; DEVICE_ID_LEN];
        buf.copy_to_slice(&mut device);
        let device_id = String::from_utf8_lossy(&device).trim_end().to_string();

        let direction = buf.get_u8();
        let exchange_nature = buf.get_u8();
        let result = buf.get_u8();
        let mut flags = [0u8; 4];
        buf.copy_to_slice(&mut flags);

        Ok(Self {
            date,
            time,
            duration,
            device_id,
            direction,
            exchange_nature,
            result,
            flags,
        })
    }
}

/// Decode the records of a whole activity file
pub fn decode_records(bytes: &[u8]) -> Result<Vec<NcRecord>, CodecError> {
    bytes.chunks(RECORD_LEN).map(NcRecord::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use chrono::NaiveDateTime;

    fn event(ts: &str, event_type: EventType, device: &str) -> Event {
        let timestamp = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S").unwrap();
        Event::new(timestamp, event_type, device, "")
    }

    #[test]
    fn test_record_layout_is_bit_exact() {
        let mut buf = BytesMut::new();
        encode_event(
            &event("2024-03-15T13:45:30", EventType::Download, "DEV-0001"),
            &mut buf,
        );

        assert_eq!(buf.len(), RECORD_LEN);
        let mut expected = Vec::with_capacity(RECORD_LEN);
        expected.extend_from_slice(b"NC");
        expected.extend_from_slice(&[0x00, 0x23]); // length 35
        expected.extend_from_slice(&[0x07, 0xE8, 0x03, 0x0F]); // 2024-03-15
        expected.extend_from_slice(&[13, 45, 30]);
        expected.extend_from_slice(&[0x00, 0x00]);
        expected.extend_from_slice(b"DEV-0001");
        expected.extend_from_slice(&[b' '; 11]);
        expected.extend_from_slice(&[1, 3, 0]);
        expected.extend_from_slice(&[1, 1, 0, 0]);
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_non_download_flags_are_zero() {
        let mut buf = BytesMut::new();
        encode_event(&event("2024-01-01T00:00:00", EventType::Time, "D"), &mut buf);
        assert_eq!(buf[33], 1);
        assert_eq!(&buf[35..39], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_device_id_truncated_to_field() {
        let mut buf = BytesMut::new();
        let long = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        encode_event(&event("2024-01-01T00:00:00", EventType::Confirm, long), &mut buf);
        assert_eq!(buf.len(), RECORD_LEN);
        assert_eq!(&buf[13..32], b"ABCDEFGHIJKLMNOPQRS");
    }

    #[test]
    fn test_device_id_non_ascii_replaced() {
        assert_eq!(&device_id_field("né")[..3], b"n? ");
    }

    #[test]
    fn test_other_type_nature_zero() {
        let mut buf = BytesMut::new();
        encode_event(
            &event("2024-01-01T00:00:00", EventType::Other("PING".into()), "D"),
            &mut buf,
        );
        assert_eq!(buf[33], 0);
    }

    #[test]
    fn test_decode_file_of_records() {
        let batch = Batch::new(vec![
            event("2024-01-01T10:00:00", EventType::Manifest, "A"),
            event("2024-01-01T10:00:01", EventType::Download, "B"),
        ]);
        let records = decode_records(&encode_batch(&batch)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].device_id, "A");
        assert_eq!(records[0].exchange_nature, 2);
        assert_eq!(records[1].flags, [1, 1, 0, 0]);
        assert_eq!(records[1].time, NaiveTime::from_hms_opt(10, 0, 1).unwrap());
    }

    #[test]
    fn test_length_field_counts_bytes_after_header() {
        let mut buf = BytesMut::new();
        encode_event(&event("2024-01-01T00:00:00", EventType::Time, "D"), &mut buf);
        assert_eq!(RECORD_LEN, 39);
        assert_eq!(buf.len(), RECORD_LEN);
        let body_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        assert_eq!(body_len, buf.len() - 4);
    }

    #[test]
    fn test_decode_many_records_stays_aligned() {
        let events: Vec<_> = (0..50)
            .map(|i| {
                let device = format!("DEV-{i:03}");
                event("2024-01-01T10:00:00", EventType::Download, &device)
            })
            .collect();
        let bytes = encode_batch(&Batch::new(events));
        assert_eq!(bytes.len(), 50 * RECORD_LEN);

        let records = decode_records(&bytes).unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[49].device_id, "DEV-049");
        assert!(records.iter().all(|r| r.exchange_nature == 3 && r.direction == 1));
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let batch = Batch::new(vec![event("2024-01-01T10:00:00", EventType::Time, "A")]);
        let bytes = encode_batch(&batch);
        let err = decode_records(&bytes[..RECORD_LEN - 1]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedRecord { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_tag() {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..2].copy_from_slice(b"XX");
        assert!(matches!(
            NcRecord::decode(&bytes),
            Err(CodecError::InvalidTag(_))
        ));
    }
}
