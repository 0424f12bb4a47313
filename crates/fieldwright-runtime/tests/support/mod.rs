#![allow(dead_code)]

use std::sync::Arc;

use fieldwright_common::{FormulaDefinition, RecordSnapshot};
use fieldwright_eval::FormulaEngine;
use fieldwright_runtime::{
    BackfillConfig, MemoryUpstream, RecordProcessor, Scheduler, SchedulerConfig, Snapshot, Upstream,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// A record with a `Hours` and a `Label` field, both empty.
pub fn record(id: &str, user: &str, start: &str, end: &str) -> RecordSnapshot {
    serde_json::from_value(json!({
        "id": id,
        "userId": user,
        "timeInterval": {"start": start, "end": end},
        "customFields": [
            {"fieldId": "cf-hours", "name": "Hours", "value": null},
            {"fieldId": "cf-label", "name": "Label", "value": null}
        ]
    }))
    .expect("fixture record")
}

pub fn formulas() -> Vec<FormulaDefinition> {
    vec![
        FormulaDefinition::new("f-hours", "Hours", "ROUND(hours, 2)"),
        FormulaDefinition::new("f-label", "Label", "OTLABEL()"),
    ]
}

/// Two records on each of 2024-01-01..03, for two subjects.
pub fn three_days() -> Snapshot {
    let mut records = Vec::new();
    for day in 1..=3 {
        records.push(record(
            &format!("a-{day}"),
            "alice",
            &format!("2024-01-0{day}T08:00:00Z"),
            &format!("2024-01-0{day}T12:00:00Z"),
        ));
        records.push(record(
            &format!("b-{day}"),
            "bob",
            &format!("2024-01-0{day}T13:00:00Z"),
            &format!("2024-01-0{day}T16:30:00Z"),
        ));
    }
    Snapshot {
        records,
        formulas: formulas(),
        ..Default::default()
    }
}

/// Spacing of 10 ms, no jitter, three attempts per task.
pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        rps: 100.0,
        jitter: 0.0,
        max_attempts: 3,
        max_backoff_ms: 100,
    }
}

pub fn backfill_config() -> BackfillConfig {
    BackfillConfig {
        page_size: 1,
        retry_delay_ms: 50,
        ..Default::default()
    }
}

pub struct Harness {
    pub upstream: Arc<MemoryUpstream>,
    pub processor: RecordProcessor,
    pub cancel: CancellationToken,
}

pub fn harness(snapshot: Snapshot) -> Harness {
    harness_with(snapshot, backfill_config())
}

pub fn harness_with(snapshot: Snapshot, config: BackfillConfig) -> Harness {
    let upstream = MemoryUpstream::shared(snapshot);
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::spawn(scheduler_config(), cancel.clone());
    let processor = RecordProcessor::new(
        FormulaEngine::new(),
        Upstream::from_shared(upstream.clone()),
        scheduler,
        config,
    );
    Harness {
        upstream,
        processor,
        cancel,
    }
}
