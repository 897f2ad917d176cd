use crate::timestamp::parse_timestamp;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Names of the reading fields the service interprets.
///
/// Every other field of a reading is opaque and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    /// Grouping column for tabular sources (header matched case-insensitively)
    pub station_id: String,
    pub state: String,
    pub district: String,
    pub timestamp: String,
    pub water_level: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            station_id: "station_id".to_string(),
            state: "state".to_string(),
            district: "district".to_string(),
            timestamp: "timestamp".to_string(),
            water_level: "water_level".to_string(),
        }
    }
}

/// One timestamped measurement, stored exactly as it appeared in the source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(Map<String, Value>);

impl Reading {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Parsed timestamp, `None` when the field is absent, not a string, or malformed
    pub fn timestamp(&self, field: &str) -> Option<NaiveDateTime> {
        lookup_ignore_case(&self.0, field)?
            .as_str()
            .and_then(parse_timestamp)
    }

    /// Numeric water level, `None` when the field is absent or not a number
    pub fn water_level(&self, field: &str) -> Option<f64> {
        lookup_ignore_case(&self.0, field)?
            .as_f64()
            .filter(|v| v.is_finite())
    }
}

/// Exact key first, then the first key equal to `name` ignoring ASCII case
pub(crate) fn lookup_ignore_case<'m>(
    fields: &'m Map<String, Value>,
    name: &str,
) -> Option<&'m Value> {
    fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    pub state: Option<String>,
    pub district: Option<String>,
    /// Stored order, not necessarily chronological
    pub readings: Vec<Reading>,
}

impl Station {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: None,
            district: None,
            readings: Vec::new(),
        }
    }

    pub fn in_state(&self, state: &str) -> bool {
        matches_ignore_case(self.state.as_deref(), state)
    }

    pub fn in_district(&self, district: &str) -> bool {
        matches_ignore_case(self.district.as_deref(), district)
    }
}

fn matches_ignore_case(value: Option<&str>, wanted: &str) -> bool {
    value.is_some_and(|v| v.to_lowercase() == wanted.to_lowercase())
}
