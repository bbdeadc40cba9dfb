use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// Identifier of a monitored data source (device, packet, sensor...).
///
/// Deserializes from either a string or an unsigned integer, since most
/// device fleets number their sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// An opaque key/value payload received from a source.
///
/// Fields are kept sorted so snapshots render deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading {
    fields: BTreeMap<String, serde_json::Value>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Numeric view of a field. Numeric strings ("30.5") are accepted too,
    /// since many field devices report everything as text.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Reading {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

impl TryFrom<serde_json::Value> for Reading {
    type Error = VigilError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(map) => Ok(map.into()),
            other => Err(VigilError::InvalidReading(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

/// Latest reading held for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingFact {
    pub source_id: SourceId,
    pub reading: Reading,
    pub arrival_millis: i64,
}

/// Latest arrival timestamp recorded for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastArrivalFact {
    pub last_received_at_millis: i64,
}

/// One message on the ingestion channel.
///
/// Wire form is a single JSON object per line:
/// `{"source_id": "42", "reading": {"temp": 30}, "arrival_ms": 1700000000000}`.
/// `arrival_ms` may be omitted, in which case the caller stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub source_id: SourceId,
    pub reading: Reading,
    #[serde(default)]
    pub arrival_ms: Option<i64>,
}

impl IngestRecord {
    pub fn parse_line(line: &str) -> Result<Self, VigilError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(VigilError::InvalidReading("empty line".to_string()));
        }
        Ok(serde_json::from_str(line)?)
    }
}
