//! Bar interval strings (`"1m"`, `"4h"`, `"1d"`).
//!
//! Grammar: `<positive integer><unit>` with unit in `{s, m, h, d}`.

use std::fmt;
use std::str::FromStr;

use crate::error::BwError;

/// A parsed bar interval. Keeps the source string for topic names and
/// exchange requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    raw: String,
    seconds: u64,
}

impl Interval {
    /// Parse an interval string. Leading/trailing whitespace is ignored and
    /// the unit is case-insensitive. Intervals whose length in milliseconds
    /// overflows `u64` are rejected.
    pub fn parse(s: &str) -> Result<Self, BwError> {
        let trimmed = s.trim();
        let invalid = || BwError::Config(format!("invalid interval: {s:?}"));

        let unit = trimmed.chars().last().ok_or_else(invalid)?;
        let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let unit_secs = match unit.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        if value == 0 {
            return Err(invalid());
        }
        let seconds = value
            .checked_mul(unit_secs)
            .filter(|secs| secs.checked_mul(1_000).is_some())
            .ok_or_else(invalid)?;

        Ok(Self {
            raw: trimmed.to_string(),
            seconds,
        })
    }

    /// Canonical (trimmed) form, used in topic names, scheduler keys and
    /// exchange requests.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn millis(&self) -> u64 {
        self.seconds * 1_000
    }
}

impl FromStr for Interval {
    type Err = BwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
