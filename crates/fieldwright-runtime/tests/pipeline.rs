mod support;

use fieldwright_common::Value;
use fieldwright_runtime::{Operation, PassContext, RunStatus, Snapshot, UpstreamError};
use support::{formulas, harness, record, three_days};

fn field(upstream: &fieldwright_runtime::MemoryUpstream, record_id: &str, name: &str) -> Value {
    upstream
        .record_by_id(record_id)
        .and_then(|r| r.field(name).map(|f| f.value.clone()))
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn process_patches_and_records_the_run() {
    let h = harness(three_days());
    let outcome = h.processor.process("a-1", None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome.updated);
    assert_eq!(outcome.subject_id.as_deref(), Some("alice"));
    assert_eq!(
        outcome.changes.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Hours", "Label"]
    );
    assert_eq!(field(&h.upstream, "a-1", "Hours"), Value::Number(4.0));
    assert_eq!(field(&h.upstream, "a-1", "Label"), Value::Text("REG".into()));

    let patches = h.upstream.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].0, "a-1");
    assert_eq!(patches[0].1.len(), 2);

    let ledger = h.upstream.ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, RunStatus::Success);
    assert_eq!(ledger[0].correlation_id, outcome.correlation_id);
    assert_eq!(ledger[0].diff, outcome.changes);
}

#[tokio::test(start_paused = true)]
async fn a_second_pass_changes_nothing() {
    let h = harness(three_days());
    h.processor.process("b-2", None).await.unwrap();
    let again = h.processor.process("b-2", None).await.unwrap();

    assert_eq!(again.status, RunStatus::Success);
    assert!(!again.updated);
    assert!(again.changes.is_empty());
    assert_eq!(h.upstream.patches().len(), 1);

    let ledger = h.upstream.ledger();
    assert_eq!(ledger.len(), 2);
    assert!(ledger[1].diff.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_edits_discard_the_updates() {
    let h = harness(three_days());
    h.upstream
        .edit_after_next_read("a-1", "cf-label", Value::Text("manual".into()));

    let outcome = h.processor.process("a-1", None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Skipped);
    assert!(!outcome.updated);
    assert!(outcome.changes.is_empty());
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| d.code == "concurrent.modification")
    );

    assert!(h.upstream.patches().is_empty());
    assert_eq!(field(&h.upstream, "a-1", "Label"), Value::Text("manual".into()));
    assert_eq!(h.upstream.ledger()[0].status, RunStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn upstream_failures_surface_and_are_recorded() {
    let h = harness(three_days());
    let err = h.processor.process("nope", None).await.unwrap_err();
    assert_eq!(err, UpstreamError::NotFound("nope".into()));

    let ledger = h.upstream.ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, RunStatus::Error);
    assert_eq!(ledger[0].error.as_deref(), Some("record 'nope' not found"));
}

#[tokio::test(start_paused = true)]
async fn formula_load_failure_is_returned() {
    let h = harness(three_days());
    h.upstream.fail_next(
        Operation::Formulas,
        UpstreamError::Transport("connection reset".into()),
    );
    let err = h.processor.process("a-1", None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)));
    assert!(h.upstream.patches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_patches_are_retried() {
    let h = harness(three_days());
    // exactly the scheduler's own budget
    h.upstream.rate_limit(Operation::Patch, 3, None);

    let outcome = h.processor.process("a-1", None).await.unwrap();
    assert!(outcome.updated);
    assert_eq!(h.upstream.calls(Operation::Patch), 4);
    assert_eq!(h.upstream.patches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ledger_failures_do_not_fail_the_record() {
    let h = harness(three_days());
    h.upstream
        .fail_next(Operation::Ledger, UpstreamError::Transport("down".into()));
    let outcome = h.processor.process("a-1", None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(h.upstream.ledger().is_empty());
    assert_eq!(h.upstream.patches().len(), 1);
}

fn long_day() -> Snapshot {
    Snapshot {
        records: vec![
            record("m-1", "alice", "2024-01-01T06:00:00Z", "2024-01-01T12:00:00Z"),
            record("m-2", "alice", "2024-01-01T13:00:00Z", "2024-01-01T19:00:00Z"),
            record("x-1", "bob", "2024-01-01T07:00:00Z", "2024-01-01T12:00:00Z"),
        ],
        formulas: formulas(),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn overtime_uses_the_subjects_day() {
    let h = harness(long_day());
    h.processor.process("m-2", None).await.unwrap();
    assert_eq!(field(&h.upstream, "m-2", "Label"), Value::Text("OT".into()));

    let record = h.upstream.record_by_id("m-2").unwrap();
    let summary = h.processor.overtime_summary(&record).await.unwrap();
    assert_eq!(summary.daily_hours, 12.0);
    assert_eq!(summary.rest_gap_hours, Some(1.0));
    assert_eq!(summary.previous_entry_id.as_deref(), Some("m-1"));
}

#[tokio::test(start_paused = true)]
async fn overtime_falls_back_to_the_record_alone() {
    let h = harness(long_day());
    h.upstream.rate_limit(Operation::Report, 3, None);

    let outcome = h.processor.process("m-2", None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(field(&h.upstream, "m-2", "Label"), Value::Text("REG".into()));
}

#[tokio::test(start_paused = true)]
async fn dry_runs_write_nothing() {
    let h = harness(three_days());
    let formulas = formulas();
    let dictionary = Default::default();
    let pass = PassContext {
        formulas: &formulas,
        dictionary: &dictionary,
        event: None,
        dry_run: true,
    };

    let outcome = h.processor.run("a-1", Some("alice"), &pass).await;
    assert!(outcome.updated);
    assert_eq!(outcome.changes["Hours"].after, Value::Number(4.0));

    let missing = h.processor.run("nope", Some("alice"), &pass).await;
    assert_eq!(missing.status, RunStatus::Error);
    assert_eq!(missing.subject_id.as_deref(), Some("alice"));

    assert!(h.upstream.patches().is_empty());
    assert!(h.upstream.ledger().is_empty());
    assert_eq!(field(&h.upstream, "a-1", "Hours"), Value::Null);
}
