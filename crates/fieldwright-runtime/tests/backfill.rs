mod support;

use chrono::NaiveDate;
use fieldwright_runtime::{
    Backfill, BackfillError, BackfillRequest, Operation, RunStatus, UpstreamError,
};
use support::{harness, three_days};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn request(from: &str, to: &str, dry_run: bool) -> BackfillRequest {
    BackfillRequest {
        from: date(from),
        to: date(to),
        subject_filter: None,
        dry_run,
    }
}

fn backfill(h: &support::Harness) -> Backfill {
    Backfill::new(h.processor.clone(), h.cancel.clone())
}

#[tokio::test(start_paused = true)]
async fn one_result_per_day_with_matching_totals() {
    let h = harness(three_days());
    let result = backfill(&h)
        .run(&request("2024-01-01", "2024-01-03", false))
        .await
        .unwrap();

    let dates: Vec<String> = result.day_results.iter().map(|d| d.date.to_string()).collect();
    assert_eq!(dates, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
    for day in &result.day_results {
        assert_eq!((day.scanned, day.updated, day.errors), (2, 2, 0));
    }
    assert_eq!(result.scanned, result.day_results.iter().map(|d| d.scanned).sum::<usize>());
    assert_eq!(result.updated, result.day_results.iter().map(|d| d.updated).sum::<usize>());
    assert_eq!((result.scanned, result.updated), (6, 6));
    assert!(!result.dry_run);

    let ids: Vec<&str> = result.outcomes.iter().map(|o| o.record_id.as_str()).collect();
    assert_eq!(ids, vec!["a-1", "b-1", "a-2", "b-2", "a-3", "b-3"]);
    assert_eq!(h.upstream.patches().len(), 6);
    assert_eq!(h.upstream.ledger().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn dry_run_matches_a_live_run_without_writing() {
    let dry = harness(three_days());
    let live = harness(three_days());
    let req = request("2024-01-01", "2024-01-03", true);

    let planned = backfill(&dry).run(&req).await.unwrap();
    let applied = backfill(&live)
        .run(&BackfillRequest {
            dry_run: false,
            ..req.clone()
        })
        .await
        .unwrap();

    assert!(planned.dry_run);
    assert_eq!(planned.day_results, applied.day_results);
    for (p, a) in planned.outcomes.iter().zip(&applied.outcomes) {
        assert_eq!(p.record_id, a.record_id);
        assert_eq!(p.updated, a.updated);
        assert_eq!(p.changes, a.changes);
    }

    assert!(dry.upstream.patches().is_empty());
    assert!(dry.upstream.ledger().is_empty());
    assert_eq!(dry.upstream.snapshot(), three_days());
    assert_eq!(live.upstream.patches().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn subject_filter_limits_the_scan() {
    let h = harness(three_days());
    let result = backfill(&h)
        .run(&BackfillRequest {
            subject_filter: Some(vec!["bob".into()]),
            ..request("2024-01-01", "2024-01-03", false)
        })
        .await
        .unwrap();
    assert_eq!(result.scanned, 3);
    assert!(
        result
            .outcomes
            .iter()
            .all(|o| o.subject_id.as_deref() == Some("bob"))
    );
}

#[tokio::test(start_paused = true)]
async fn a_failing_record_does_not_stop_the_run() {
    let h = harness(three_days());
    h.upstream
        .fail_next(Operation::Record, UpstreamError::Transport("reset".into()));

    let result = backfill(&h)
        .run(&request("2024-01-01", "2024-01-03", false))
        .await
        .unwrap();
    assert_eq!((result.scanned, result.updated), (6, 5));
    assert_eq!(result.day_results[0].errors, 1);
    assert_eq!(result.outcomes[0].status, RunStatus::Error);
    assert_eq!(
        h.upstream
            .ledger()
            .iter()
            .filter(|e| e.status == RunStatus::Error)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limited_pages_are_retried() {
    let h = harness(three_days());
    h.upstream.rate_limit(Operation::Report, 3, None);

    let result = backfill(&h)
        .run(&request("2024-01-01", "2024-01-01", false))
        .await
        .unwrap();
    assert_eq!(result.scanned, 2);
}

#[tokio::test(start_paused = true)]
async fn a_page_that_keeps_failing_ends_the_run() {
    let h = harness(three_days());
    h.upstream.rate_limit(Operation::Report, 9, None);

    let err = backfill(&h)
        .run(&request("2024-01-01", "2024-01-03", false))
        .await
        .unwrap_err();
    match err {
        BackfillError::Page { day, page, source } => {
            assert_eq!(day, date("2024-01-01"));
            assert_eq!(page, 1);
            assert!(source.is_rate_limited());
        }
        other => panic!("unexpected {other}"),
    }
    assert!(h.upstream.patches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversize_and_inverted_ranges_are_rejected_up_front() {
    let h = harness(three_days());
    let err = backfill(&h)
        .run(&request("2024-01-01", "2025-01-01", false))
        .await
        .unwrap_err();
    assert_eq!(err, BackfillError::RangeTooLarge { days: 367, max: 366 });

    let err = backfill(&h)
        .run(&request("2024-01-03", "2024-01-01", false))
        .await
        .unwrap_err();
    assert!(matches!(err, BackfillError::InvertedRange { .. }));
    assert_eq!(h.upstream.calls(Operation::Formulas), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_run() {
    let h = harness(three_days());
    h.cancel.cancel();
    let err = backfill(&h)
        .run(&request("2024-01-01", "2024-01-03", false))
        .await
        .unwrap_err();
    assert_eq!(err, BackfillError::Cancelled);
    assert!(h.upstream.patches().is_empty());
}
