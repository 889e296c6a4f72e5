//! Activity file naming
//!
//! Generated files are named
//! `S<site:19><days since 1987-01-01, base36:3><counter, base36:4>.BIN`.
//! The name is a pure function of the batch date and the counter, so
//! republishing the same counter yields the same name.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

/// Date that day numbers in file names count from
pub const REFERENCE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1987, 1, 1) {
    Some(date) => date,
    None => panic!("invalid reference date"),
};

/// Width of the site field in file names
pub const SITE_ID_LEN: usize = 19;

/// Width of the day number in file names
pub const DAYS_WIDTH: usize = 3;

/// Width of the counter in file names
pub const COUNTER_WIDTH: usize = 4;

/// Extension of generated files
pub const FILE_EXTENSION: &str = "BIN";

const SITE_PADDING: char = '-';
const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Fixed-width base-36 encoding, most significant digit first
///
/// Values that need more than `width` digits keep only their low-order
/// digits: `base36(36u64.pow(4), 4) == "0000"`.
pub fn base36(mut value: u64, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for slot in digits.iter_mut().rev() {
        *slot = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }
    // Only ASCII digits were written
    digits.into_iter().map(char::from).collect()
}

/// Whole days between [`REFERENCE_DATE`] and `date`
pub fn days_since_reference(date: NaiveDate) -> Result<u64, CodecError> {
    let days = date.signed_duration_since(REFERENCE_DATE).num_days();
    u64::try_from(days).map_err(|_| CodecError::DateBeforeReference(date))
}

/// Build the name of the activity file for `date` and `counter`
pub fn activity_file_name(
    site: &SiteId,
    date: NaiveDate,
    counter: u64,
) -> Result<String, CodecError> {
    let days = days_since_reference(date)?;
    Ok(format!(
        "S{}{}{}.{}",
        site.as_str(),
        base36(days, DAYS_WIDTH),
        base36(counter, COUNTER_WIDTH),
        FILE_EXTENSION
    ))
}

/// The 19-character site field of activity file names
///
/// Accepts up to 19 characters from `[A-Za-z0-9_-]` and right-pads with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId(String);

impl SiteId {
    /// Validate and pad a site identifier
    pub fn new(value: &str) -> Result<Self, CodecError> {
        let valid_chars = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if value.is_empty() || value.len() > SITE_ID_LEN || !valid_chars {
            return Err(CodecError::InvalidSiteId(value.to_string()));
        }

        let mut padded = value.to_string();
        while padded.len() < SITE_ID_LEN {
            padded.push(SITE_PADDING);
        }
        Ok(Self(padded))
    }

    /// The padded 19-character field
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self("CTD_API------------".to_string())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SiteId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for SiteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SiteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_base36_fixed_width() {
        assert_eq!(base36(0, 4), "0000");
        assert_eq!(base36(6, 4), "0006");
        assert_eq!(base36(35, 4), "000Z");
        assert_eq!(base36(36, 4), "0010");
        assert_eq!(base36(36u64.pow(4) - 1, 4), "ZZZZ");
    }

    #[test]
    fn test_base36_overflow_keeps_low_digits() {
        assert_eq!(base36(36u64.pow(4), 4), "0000");
        assert_eq!(base36(36u64.pow(4) + 7, 4), "0007");
        assert_eq!(base36(36u64.pow(5) + 36 + 1, 4), "0011");
    }

    #[test]
    fn test_days_since_reference() {
        assert_eq!(days_since_reference(REFERENCE_DATE).unwrap(), 0);
        assert_eq!(days_since_reference(date(1987, 1, 2)).unwrap(), 1);
        assert_eq!(days_since_reference(date(2024, 1, 1)).unwrap(), 13514);
        assert!(matches!(
            days_since_reference(date(1986, 12, 31)),
            Err(CodecError::DateBeforeReference(_))
        ));
    }

    #[test]
    fn test_file_name_layout() {
        let site = SiteId::default();
        let name = activity_file_name(&site, date(2024, 1, 1), 6).unwrap();
        // 13514 days = "AFE" in base 36
        assert_eq!(name, "SCTD_API------------AFE0006.BIN");
        assert_eq!(name.len(), 1 + 19 + 3 + 4 + 4);
    }

    #[test]
    fn test_consecutive_counters_differ_only_in_suffix() {
        let site = SiteId::new("SITE42").unwrap();
        let a = activity_file_name(&site, date(2024, 6, 1), 41).unwrap();
        let b = activity_file_name(&site, date(2024, 6, 1), 42).unwrap();
        assert_eq!(a[..a.len() - 8], b[..b.len() - 8]);
        assert_eq!(&a[a.len() - 8..], "0015.BIN");
        assert_eq!(&b[b.len() - 8..], "0016.BIN");
    }

    #[test]
    fn test_site_id_padding() {
        let site = SiteId::new("CTD_API").unwrap();
        assert_eq!(site.as_str(), "CTD_API------------");
        assert_eq!(site, SiteId::default());
    }

    #[test]
    fn test_site_id_rejects_invalid() {
        assert!(SiteId::new("").is_err());
        assert!(SiteId::new("ABCDEFGHIJKLMNOPQRST").is_err()); // 20 chars
        assert!(SiteId::new("bad/site").is_err());
        assert!(SiteId::new("ABCDEFGHIJKLMNOPQRS").is_ok()); // 19 chars
    }
}
