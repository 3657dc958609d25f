// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identifier types that tolerate how the backing store writes numbers.
//!
//! Tabular backends hand numeric IDs back as floats (`12345.0`) or as
//! padded strings; everything is normalized to a canonical decimal string.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Strava athlete ID, normalized to a trimmed integer string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AthleteId(String);

impl AthleteId {
    /// Normalize a raw ID: trim whitespace and strip a decimal suffix.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_id(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AthleteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for AthleteId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for AthleteId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl Serialize for AthleteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AthleteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawId::deserialize(deserializer)?;
        Ok(Self(raw.into_normalized()))
    }
}

/// Deserialize an activity ID written as an integer, float, or string.
pub fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let normalized = RawId::deserialize(deserializer)?.into_normalized();
    normalized
        .parse()
        .map_err(|_| de::Error::custom(format!("invalid numeric id: {:?}", normalized)))
}

/// Any of the shapes an ID comes back in.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Unsigned(u64),
    Float(f64),
    Text(String),
}

impl RawId {
    fn into_normalized(self) -> String {
        match self {
            RawId::Unsigned(n) => n.to_string(),
            RawId::Float(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
                (f as u64).to_string()
            }
            RawId::Float(f) => normalize_id(&f.to_string()),
            RawId::Text(s) => normalize_id(&s),
        }
    }
}

fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c.is_ascii_digit()) => {
            whole.to_string()
        }
        _ => trimmed.to_string(),
    }
}
