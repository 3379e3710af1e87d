//! Durations with day and week units, used for relative expirations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

fn unit_nanos(unit: char) -> Option<i64> {
    let seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => return None,
    };
    Some(seconds * NANOS_PER_SECOND)
}

/// A duration written as `<n>[.<frac>]<unit>`, such as `2d`, `1.5w` or `-3h`.
///
/// Units are `s`, `m`, `h`, `d` and `w`. The empty string is a zero duration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongDuration(String);

impl LongDuration {
    /// Wraps a raw duration string without parsing it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty duration.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the duration.
    pub fn duration(&self) -> Result<TimeDelta> {
        let s = self.0.as_str();
        let Some(unit) = s.chars().last() else {
            return Ok(TimeDelta::zero());
        };
        let multiplier = unit_nanos(unit)
            .ok_or_else(|| self.invalid(format!("unknown unit {unit:?}")))?;

        let body = &s[..s.len() - unit.len_utf8()];
        let (negative, body) = match body.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, body),
        };

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() > 2 {
            return Err(self.invalid("too many decimal parts"));
        }
        if parts.iter().all(|p| p.is_empty()) {
            return Err(self.invalid("missing amount"));
        }
        if parts
            .iter()
            .any(|p| !p.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(self.invalid("amount must be a decimal number"));
        }

        let whole: i64 = if parts[0].is_empty() {
            0
        } else {
            parts[0]
                .parse()
                .map_err(|e: std::num::ParseIntError| self.invalid(e.to_string()))?
        };
        let mut nanos = whole
            .checked_mul(multiplier)
            .ok_or_else(|| self.invalid("amount out of range"))?;

        if let Some(frac) = parts.get(1).filter(|f| !f.is_empty()) {
            let fraction: f64 = format!("0.{frac}")
                .parse()
                .map_err(|e: std::num::ParseFloatError| self.invalid(e.to_string()))?;
            nanos = nanos
                .checked_add((fraction * multiplier as f64) as i64)
                .ok_or_else(|| self.invalid("amount out of range"))?;
        }
        if negative {
            nanos = -nanos;
        }
        Ok(TimeDelta::nanoseconds(nanos))
    }

    /// Returns `t` shifted by this duration.
    pub fn add_to(&self, t: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let delta = self.duration()?;
        t.checked_add_signed(delta)
            .ok_or_else(|| self.invalid("resulting time out of range"))
    }

    fn invalid(&self, detail: impl Into<String>) -> DomainError {
        DomainError::InvalidLongDuration {
            input: self.0.clone(),
            detail: detail.into(),
        }
    }
}

impl FromStr for LongDuration {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let parsed = Self::new(s);
        parsed.duration()?;
        Ok(parsed)
    }
}

impl fmt::Display for LongDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
