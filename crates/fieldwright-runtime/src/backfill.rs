//! Historical replay of the formula set over a date range.
//!
//! The range is split into UTC calendar days. Each day is read page by page
//! from the upstream report, and every record on a page goes through the
//! same [`RecordProcessor`] path as a live event. A failing record is
//! reported and skipped; a failing page ends the run.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::error::{BackfillError, UpstreamError};
use crate::pipeline::{PassContext, RecordOutcome, RecordProcessor};
use crate::scheduler::retry_rate_limited;
use crate::upstream::{ReportQuery, RunStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    pub from: NaiveDate,
    /// Inclusive.
    pub to: NaiveDate,
    #[serde(default)]
    pub subject_filter: Option<Vec<String>>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayResult {
    pub date: NaiveDate,
    pub scanned: usize,
    pub updated: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResult {
    pub scanned: usize,
    pub updated: usize,
    pub dry_run: bool,
    pub day_results: Vec<DayResult>,
    pub outcomes: Vec<RecordOutcome>,
}

/// One UTC calendar day: midnight to the last millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Number of days in `[from, to]`, rejecting inverted or oversize ranges.
pub fn validate_range(from: NaiveDate, to: NaiveDate, max_days: u32) -> Result<i64, BackfillError> {
    if to < from {
        return Err(BackfillError::InvertedRange { from, to });
    }
    let days = (to - from).num_days() + 1;
    if days > i64::from(max_days) {
        return Err(BackfillError::RangeTooLarge {
            days,
            max: max_days,
        });
    }
    Ok(days)
}

pub fn day_windows(from: NaiveDate, to: NaiveDate) -> Vec<DayWindow> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|date| {
            let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
            DayWindow {
                date,
                start,
                end: start + Duration::days(1) - Duration::milliseconds(1),
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Backfill {
    processor: RecordProcessor,
    cancel: CancellationToken,
}

impl Backfill {
    pub fn new(processor: RecordProcessor, cancel: CancellationToken) -> Self {
        Self { processor, cancel }
    }

    pub async fn run(&self, request: &BackfillRequest) -> Result<BackfillResult, BackfillError> {
        let config = self.processor.config();
        let days = validate_range(request.from, request.to, config.max_range_days)?;
        info!(
            from = %request.from,
            to = %request.to,
            days,
            dry_run = request.dry_run,
            "backfill started"
        );

        let formulas = self
            .processor
            .load_formulas()
            .await
            .map_err(|source| self.load_error("formulas", source))?;
        let dictionary = self
            .processor
            .load_dictionary()
            .await
            .map_err(|source| self.load_error("dictionary", source))?;
        let pass = PassContext {
            formulas: &formulas,
            dictionary: &dictionary,
            event: None,
            dry_run: request.dry_run,
        };

        let mut result = BackfillResult {
            scanned: 0,
            updated: 0,
            dry_run: request.dry_run,
            day_results: Vec::with_capacity(days as usize),
            outcomes: Vec::new(),
        };
        for window in day_windows(request.from, request.to) {
            let span = info_span!("backfill_day", date = %window.date);
            let day = self
                .run_day(window, request, &pass, &mut result.outcomes)
                .instrument(span)
                .await?;
            result.scanned += day.scanned;
            result.updated += day.updated;
            result.day_results.push(day);
        }

        info!(
            scanned = result.scanned,
            updated = result.updated,
            "backfill finished"
        );
        Ok(result)
    }

    fn load_error(&self, what: &'static str, source: UpstreamError) -> BackfillError {
        if source == UpstreamError::Cancelled {
            BackfillError::Cancelled
        } else {
            BackfillError::Load { what, source }
        }
    }

    async fn run_day(
        &self,
        window: DayWindow,
        request: &BackfillRequest,
        pass: &PassContext<'_>,
        outcomes: &mut Vec<RecordOutcome>,
    ) -> Result<DayResult, BackfillError> {
        let config = self.processor.config();
        let mut day = DayResult {
            date: window.date,
            scanned: 0,
            updated: 0,
            errors: 0,
        };

        let mut page = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(BackfillError::Cancelled);
            }
            let query = ReportQuery {
                date_range_start: window.start,
                date_range_end: window.end,
                subject_ids: request.subject_filter.clone(),
                page,
                page_size: config.page_size,
            };
            let rows = retry_rate_limited(
                config.page_retries,
                config.retry_delay(),
                &self.cancel,
                || self.processor.fetch_report(query.clone()),
            )
            .await
            .map_err(|source| match source {
                UpstreamError::Cancelled => BackfillError::Cancelled,
                source => BackfillError::Page {
                    day: window.date,
                    page,
                    source,
                },
            })?;

            for record in &rows {
                if self.cancel.is_cancelled() {
                    return Err(BackfillError::Cancelled);
                }
                let outcome = self
                    .processor
                    .run(&record.id, Some(&record.user_id), pass)
                    .await;
                day.scanned += 1;
                if outcome.updated {
                    day.updated += 1;
                }
                if outcome.status == RunStatus::Error {
                    day.errors += 1;
                }
                outcomes.push(outcome);
            }

            if rows.len() < config.page_size as usize {
                break;
            }
            page += 1;
        }

        info!(
            scanned = day.scanned,
            updated = day.updated,
            errors = day.errors,
            pages = page,
            "day finished"
        );
        Ok(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn windows_are_utc_days() {
        let w = day_windows(date("2024-01-01"), date("2024-01-03"));
        assert_eq!(
            w.iter().map(|d| d.date.to_string()).collect::<Vec<_>>(),
            vec!["2024-01-01", "2024-01-02", "2024-01-03"]
        );
        assert_eq!(w[0].start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(w[0].end.to_rfc3339(), "2024-01-01T23:59:59.999+00:00");
        assert_eq!(day_windows(date("2024-01-01"), date("2024-01-01")).len(), 1);
    }

    #[test]
    fn range_limits() {
        assert_eq!(validate_range(date("2024-01-01"), date("2024-12-31"), 366), Ok(366));
        assert_eq!(
            validate_range(date("2024-01-01"), date("2025-01-01"), 366),
            Err(BackfillError::RangeTooLarge { days: 367, max: 366 })
        );
        assert!(matches!(
            validate_range(date("2024-01-02"), date("2024-01-01"), 366),
            Err(BackfillError::InvertedRange { .. })
        ));
    }
}
