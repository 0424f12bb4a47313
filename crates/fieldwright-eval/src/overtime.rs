//! Overtime and rest-gap aggregation.
//!
//! Given a target record and a window of records for the same subject, the
//! calculator derives how many hours the subject has logged on the target's
//! local day (up to and including the target), the rest gap since the
//! previous record, and the resulting pay multiplier and flag.
//!
//! Day grouping uses the offset written on the target's start timestamp, so
//! a record starting `2024-03-01T23:30:00-05:00` belongs to March 1st even
//! though that instant is March 2nd in UTC.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use fieldwright_common::{RecordSnapshot, Value, time::offset_signature};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SHORT_REST_THRESHOLD_HOURS: f64 = 8.0;
pub const SHORT_REST_FLOOR_MULTIPLIER: f64 = 1.5;
pub const OT_THRESHOLD_HOURS: f64 = 10.0;
pub const DT_THRESHOLD_HOURS: f64 = 14.0;
pub const OT_MULTIPLIER: f64 = 1.5;
pub const DT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OvertimeFlag {
    Reg,
    Ot,
    Dt,
}

impl OvertimeFlag {
    /// 0 for `REG`, 1 for `OT`, 2 for `DT`.
    pub fn tier(&self) -> usize {
        match self {
            OvertimeFlag::Reg => 0,
            OvertimeFlag::Ot => 1,
            OvertimeFlag::Dt => 2,
        }
    }
}

impl Display for OvertimeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OvertimeFlag::Reg => "REG",
            OvertimeFlag::Ot => "OT",
            OvertimeFlag::Dt => "DT",
        })
    }
}

/// Thresholds and multipliers of the overtime policy. Tiers are strict:
/// exactly `ot_threshold_hours` is still regular time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OvertimeConfig {
    pub short_rest_threshold_hours: f64,
    pub short_rest_floor_multiplier: f64,
    pub ot_threshold_hours: f64,
    pub dt_threshold_hours: f64,
    pub ot_multiplier: f64,
    pub dt_multiplier: f64,
}

impl Default for OvertimeConfig {
    fn default() -> Self {
        Self {
            short_rest_threshold_hours: SHORT_REST_THRESHOLD_HOURS,
            short_rest_floor_multiplier: SHORT_REST_FLOOR_MULTIPLIER,
            ot_threshold_hours: OT_THRESHOLD_HOURS,
            dt_threshold_hours: DT_THRESHOLD_HOURS,
            ot_multiplier: OT_MULTIPLIER,
            dt_multiplier: DT_MULTIPLIER,
        }
    }
}

impl OvertimeConfig {
    fn base_tier(&self, daily_hours: f64) -> (f64, OvertimeFlag) {
        if daily_hours > self.dt_threshold_hours {
            (self.dt_multiplier, OvertimeFlag::Dt)
        } else if daily_hours > self.ot_threshold_hours {
            (self.ot_multiplier, OvertimeFlag::Ot)
        } else {
            (1.0, OvertimeFlag::Reg)
        }
    }

    fn flag_for(&self, multiplier: f64) -> OvertimeFlag {
        if multiplier >= self.dt_multiplier {
            OvertimeFlag::Dt
        } else if multiplier >= self.ot_multiplier {
            OvertimeFlag::Ot
        } else {
            OvertimeFlag::Reg
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeSummary {
    /// Final multiplier after the short-rest adjustment.
    pub multiplier: f64,
    /// Multiplier from daily hours alone.
    pub base_multiplier: f64,
    pub flag: OvertimeFlag,
    pub daily_hours: f64,
    pub entry_hours: f64,
    pub rest_gap_hours: Option<f64>,
    pub short_rest: bool,
    pub previous_entry_id: Option<String>,
    /// `+HH:MM` offset of the target's start timestamp.
    pub tz_offset: String,
    /// Local calendar date plus offset signature, e.g. `2024-03-01-05:00`.
    pub day_key: String,
    pub day_start_utc: DateTime<Utc>,
    /// Last millisecond of the local day.
    pub day_end_utc: DateTime<Utc>,
}

impl OvertimeSummary {
    /// Field lookup for `OT(key)`. Short keys are matched case-insensitively;
    /// anything else falls back to the serialized field name, then null.
    pub fn get(&self, key: &str) -> Value {
        match key.to_ascii_lowercase().as_str() {
            "multiplier" => Value::Number(self.multiplier),
            "base" => Value::Number(self.base_multiplier),
            "flag" => Value::Text(self.flag.to_string()),
            "dailyhours" => Value::Number(self.daily_hours),
            "entryhours" => Value::Number(self.entry_hours),
            "restgaphours" => self.rest_gap_hours.map(Value::Number).unwrap_or(Value::Null),
            "shortrest" => Value::Boolean(self.short_rest),
            "previousentryid" => self
                .previous_entry_id
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            "daykey" => Value::Text(self.day_key.clone()),
            "daystartutc" => Value::DateTime(self.day_start_utc.fixed_offset()),
            "dayendutc" => Value::DateTime(self.day_end_utc.fixed_offset()),
            _ => self.field_by_name(key),
        }
    }

    fn field_by_name(&self, key: &str) -> Value {
        let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) else {
            return Value::Null;
        };
        let fields: BTreeMap<String, serde_json::Value> = map.into_iter().collect();
        fields
            .get(key)
            .or_else(|| {
                fields
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .cloned()
            .map(Value::from)
            .unwrap_or(Value::Null)
    }
}

fn round_places(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

fn hours_between(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

/// Local day of `start` in its own offset, as UTC bounds.
fn local_day_bounds(start: DateTime<FixedOffset>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let offset = *start.offset();
    let midnight = start.date_naive().and_hms_opt(0, 0, 0)?;
    let day_start = offset.from_local_datetime(&midnight).single()?.with_timezone(&Utc);
    let day_end = day_start + Duration::days(1) - Duration::milliseconds(1);
    Some((day_start, day_end))
}

#[derive(Debug, Clone, Default)]
pub struct OvertimeCalculator {
    config: OvertimeConfig,
}

impl OvertimeCalculator {
    pub fn new(config: OvertimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OvertimeConfig {
        &self.config
    }

    /// Summary for `record` with no surrounding window.
    pub fn single(&self, record: &RecordSnapshot) -> Option<OvertimeSummary> {
        self.summarize(record, &[], None)
    }

    /// Returns `None` only when the target's start timestamp is unreadable.
    ///
    /// `candidates` may or may not contain the target itself; records are
    /// de-duplicated by id. `previous_hint` replaces the computed preceding
    /// record when it ended later.
    pub fn summarize(
        &self,
        record: &RecordSnapshot,
        candidates: &[RecordSnapshot],
        previous_hint: Option<&RecordSnapshot>,
    ) -> Option<OvertimeSummary> {
        let start = record.start()?;
        let (day_start, day_end) = local_day_bounds(start)?;
        let tz_offset = offset_signature(start.offset());
        let day_key = format!("{}{}", start.date_naive().format("%Y-%m-%d"), tz_offset);

        let entry_hours = record.duration_hours();

        let mut seen: Vec<&str> = vec![record.id.as_str()];
        let mut daily = entry_hours;
        for c in candidates {
            if seen.contains(&c.id.as_str()) {
                continue;
            }
            let Some(c_start) = c.start() else { continue };
            let c_start_utc = c_start.with_timezone(&Utc);
            if c_start_utc >= day_start && c_start_utc <= day_end && c_start <= start {
                daily += c.duration_hours();
                seen.push(c.id.as_str());
            }
        }

        let mut previous: Option<(&RecordSnapshot, DateTime<FixedOffset>)> = None;
        for c in candidates.iter().filter(|c| c.id != record.id) {
            let Some(c_end) = c.end() else { continue };
            if c_end <= start && previous.is_none_or(|(_, best)| c_end > best) {
                previous = Some((c, c_end));
            }
        }
        if let Some(hint) = previous_hint.filter(|h| h.id != record.id) {
            if let Some(hint_end) = hint.end() {
                if previous.is_none_or(|(_, best)| hint_end > best) {
                    previous = Some((hint, hint_end));
                }
            }
        }

        let rest_gap_hours =
            previous.map(|(_, end)| round_places(hours_between(end, start).max(0.0), 3));
        let short_rest = rest_gap_hours
            .map(|gap| gap < self.config.short_rest_threshold_hours)
            .unwrap_or(false);

        let daily_hours = round_places(daily, 4);
        let (base_multiplier, base_flag) = self.config.base_tier(daily_hours);
        let (multiplier, flag) = if short_rest {
            let m = base_multiplier.max(self.config.short_rest_floor_multiplier);
            (m, self.config.flag_for(m))
        } else {
            (base_multiplier, base_flag)
        };

        debug!(
            record_id = %record.id,
            daily_hours,
            ?rest_gap_hours,
            %flag,
            multiplier,
            "computed overtime summary"
        );

        Some(OvertimeSummary {
            multiplier,
            base_multiplier,
            flag,
            daily_hours,
            entry_hours: round_places(entry_hours, 4),
            rest_gap_hours,
            short_rest,
            previous_entry_id: previous.map(|(p, _)| p.id.clone()),
            tz_offset,
            day_key,
            day_start_utc: day_start,
            day_end_utc: day_end,
        })
    }
}
