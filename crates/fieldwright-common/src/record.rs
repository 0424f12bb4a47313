use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::{Value, time};

/// One custom-field slot on a record, addressable by display name or id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldValue {
    pub field_id: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    /// ISO-8601 start; an offset suffix, if present, is significant.
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    /// ISO-8601 duration (`PT1H30M`).
    #[serde(default)]
    pub duration: Option<String>,
}

/// The tracked record being enriched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    pub id: String,
    pub user_id: String,
    pub time_interval: TimeInterval,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
    #[serde(default)]
    pub bill_rate: Option<f64>,
    #[serde(default)]
    pub cost_rate: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub billable: Option<bool>,
}

impl RecordSnapshot {
    /// Look a custom field up by display name first, then by id.
    pub fn field(&self, key: &str) -> Option<&CustomFieldValue> {
        self.custom_fields
            .iter()
            .find(|f| f.name == key)
            .or_else(|| self.custom_fields.iter().find(|f| f.field_id == key))
    }

    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        time::parse_timestamp(&self.time_interval.start)
    }

    pub fn end(&self) -> Option<DateTime<FixedOffset>> {
        self.time_interval
            .end
            .as_deref()
            .and_then(time::parse_timestamp)
    }

    /// Duration from the explicit ISO duration, falling back to `end - start`.
    /// `None` for a running record with neither.
    pub fn duration_seconds(&self) -> Option<f64> {
        if let Some(secs) = self
            .time_interval
            .duration
            .as_deref()
            .and_then(time::parse_iso_duration)
        {
            return Some(secs.max(0.0));
        }
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => {
                Some(((end - start).num_milliseconds() as f64 / 1000.0).max(0.0))
            }
            _ => None,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds().unwrap_or(0.0) / 3600.0
    }
}
