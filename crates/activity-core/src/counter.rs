//! Persisted file counter state

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Counter used to name activity files
///
/// `counter` is global and never resets; `date` is the date of the last
/// published batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub date: NaiveDate,
    pub counter: u64,
    pub last_generated_file: String,
}

impl CounterState {
    /// Create a new counter state
    pub fn new(date: NaiveDate, counter: u64, last_generated_file: impl Into<String>) -> Self {
        Self {
            date,
            counter,
            last_generated_file: last_generated_file.into(),
        }
    }

    /// State used when nothing has been persisted yet: today, counter 0
    pub fn initial() -> Self {
        Self::new(Utc::now().date_naive(), 0, String::new())
    }

    /// The counter value the next published file will carry
    pub fn next_counter(&self) -> u64 {
        self.counter + 1
    }

    /// Three-line text form: ISO date, counter, last file name
    pub fn to_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.date.format(DATE_FORMAT),
            self.counter,
            self.last_generated_file
        )
    }

    /// Parse the three-line text form
    ///
    /// The last file name line is optional. Returns `None` if the date or
    /// counter line is missing or malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let date = NaiveDate::parse_from_str(lines.next()?.trim(), DATE_FORMAT).ok()?;
        let counter = lines.next()?.trim().parse().ok()?;
        let last_generated_file = lines.next().map(str::trim).unwrap_or_default();
        Some(Self::new(date, counter, last_generated_file))
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_form() {
        let state = CounterState::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            5,
            "SCTD_API------------AFE0005.BIN",
        );
        let text = state.to_text();
        assert_eq!(text, "2024-01-01\n5\nSCTD_API------------AFE0005.BIN\n");
        assert_eq!(CounterState::parse(&text), Some(state));
    }

    #[test]
    fn test_parse_without_file_line() {
        let state = CounterState::parse("2024-01-01\n12").unwrap();
        assert_eq!(state.counter, 12);
        assert!(state.last_generated_file.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CounterState::parse("").is_none());
        assert!(CounterState::parse("2024-01-01").is_none());
        assert!(CounterState::parse("not a date\n1\n").is_none());
        assert!(CounterState::parse("2024-01-01\n-3\n").is_none());
    }

    #[test]
    fn test_initial_starts_at_zero() {
        let state = CounterState::initial();
        assert_eq!(state.counter, 0);
        assert_eq!(state.next_counter(), 1);
        assert_eq!(state.date, Utc::now().date_naive());
    }
}
