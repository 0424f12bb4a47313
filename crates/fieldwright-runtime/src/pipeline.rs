//! Single-record processing: fetch, evaluate, verify, patch, audit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use fieldwright_common::{
    Diagnostic, DictionaryMap, FieldChange, FormulaDefinition, RecordSnapshot,
};
use fieldwright_eval::engine::concurrent_modification;
use fieldwright_eval::{EvaluationInput, FormulaEngine, OvertimeSummary};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::BackfillConfig;
use crate::error::UpstreamError;
use crate::hashing::field_state_hash;
use crate::scheduler::{Scheduler, retry_rate_limited};
use crate::upstream::{FieldPatch, ReportQuery, RunEntry, RunStatus, Upstream};

/// What one pass applies, shared by every record in it.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub formulas: &'a [FormulaDefinition],
    pub dictionary: &'a DictionaryMap,
    pub event: Option<&'a str>,
    /// Compute everything, write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub correlation_id: Uuid,
    pub status: RunStatus,
    /// The record had accepted updates that were (or, in a dry run, would
    /// have been) written.
    pub updated: bool,
    #[serde(default)]
    pub changes: BTreeMap<String, FieldChange>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RecordOutcome {
    fn new(record_id: &str, subject_id: Option<&str>, correlation_id: Uuid) -> Self {
        Self {
            record_id: record_id.to_string(),
            subject_id: subject_id.map(str::to_string),
            correlation_id,
            status: RunStatus::Success,
            updated: false,
            changes: BTreeMap::new(),
            diagnostics: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    fn ledger_entry(&self) -> RunEntry {
        RunEntry {
            record_id: self.record_id.clone(),
            subject_id: self.subject_id.clone(),
            status: self.status,
            duration_ms: self.duration_ms,
            diff: self.changes.clone(),
            correlation_id: self.correlation_id,
            error: self.error.clone(),
        }
    }
}

/// Runs the evaluation pipeline for one record at a time. Every upstream
/// call goes through the shared [`Scheduler`].
#[derive(Debug, Clone)]
pub struct RecordProcessor {
    engine: Arc<FormulaEngine>,
    upstream: Upstream,
    scheduler: Scheduler,
    config: BackfillConfig,
}

impl RecordProcessor {
    pub fn new(
        engine: FormulaEngine,
        upstream: Upstream,
        scheduler: Scheduler,
        config: BackfillConfig,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            upstream,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn cancel(&self) -> &CancellationToken {
        self.scheduler.cancellation_token()
    }

    /* ─────────────── upstream reads ─────────────── */

    pub async fn load_formulas(&self) -> Result<Vec<FormulaDefinition>, UpstreamError> {
        let repo = self.upstream.formulas.clone();
        self.scheduler
            .schedule(move || {
                let repo = repo.clone();
                async move { repo.formulas().await }
            })
            .await
    }

    pub async fn load_dictionary(&self) -> Result<DictionaryMap, UpstreamError> {
        let repo = self.upstream.dictionary.clone();
        self.scheduler
            .schedule(move || {
                let repo = repo.clone();
                async move { repo.dictionary().await }
            })
            .await
    }

    pub async fn fetch_record(&self, record_id: &str) -> Result<RecordSnapshot, UpstreamError> {
        let records = self.upstream.records.clone();
        let id = record_id.to_string();
        self.scheduler
            .schedule(move || {
                let records = records.clone();
                let id = id.clone();
                async move { records.record(&id).await }
            })
            .await
    }

    pub async fn fetch_report(&self, query: ReportQuery) -> Result<Vec<RecordSnapshot>, UpstreamError> {
        let records = self.upstream.records.clone();
        self.scheduler
            .schedule(move || {
                let records = records.clone();
                let query = query.clone();
                async move { records.report(&query).await }
            })
            .await
    }

    /// Same-subject records from `lookback_hours` before the record's start
    /// up to the end of its local day.
    async fn fetch_window(
        &self,
        record: &RecordSnapshot,
        day: &OvertimeSummary,
    ) -> Result<Vec<RecordSnapshot>, UpstreamError> {
        let Some(start) = record.start() else {
            return Ok(Vec::new());
        };
        let from = start.with_timezone(&Utc)
            - ChronoDuration::hours(i64::from(self.config.lookback_hours));
        let mut window = Vec::new();
        let mut page = 1;
        loop {
            let query = ReportQuery {
                date_range_start: from.min(day.day_start_utc),
                date_range_end: day.day_end_utc,
                subject_ids: Some(vec![record.user_id.clone()]),
                page,
                page_size: self.config.page_size,
            };
            let rows = self.fetch_report(query).await?;
            let short = rows.len() < self.config.page_size as usize;
            window.extend(rows);
            if short {
                return Ok(window);
            }
            page += 1;
        }
    }

    /// Summary over the record's window. A failed window lookup degrades to
    /// the record on its own.
    pub async fn overtime_summary(&self, record: &RecordSnapshot) -> Option<OvertimeSummary> {
        let calculator = self.engine.overtime();
        let single = calculator.single(record)?;
        match self.fetch_window(record, &single).await {
            Ok(window) => calculator.summarize(record, &window, None),
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "overtime window lookup failed, using the record alone");
                Some(single)
            }
        }
    }

    /* ─────────────── upstream writes ─────────────── */

    async fn patch(&self, record_id: &str, fields: Vec<FieldPatch>) -> Result<(), UpstreamError> {
        let sink = self.upstream.patches.clone();
        let id = record_id.to_string();
        let fields = Arc::new(fields);
        retry_rate_limited(
            self.config.patch_retries,
            self.config.retry_delay(),
            self.cancel(),
            || {
                let sink = sink.clone();
                let id = id.clone();
                let fields = fields.clone();
                self.scheduler.schedule(move || {
                    let sink = sink.clone();
                    let id = id.clone();
                    let fields = fields.clone();
                    async move { sink.patch(&id, &fields).await }
                })
            },
        )
        .await
    }

    /// Ledger failures are logged, never propagated: the patch they describe
    /// has already happened.
    async fn append_ledger(&self, entry: RunEntry) {
        let ledger = self.upstream.ledger.clone();
        let record_id = entry.record_id.clone();
        let entry = Arc::new(entry);
        let res = self
            .scheduler
            .schedule(move || {
                let ledger = ledger.clone();
                let entry = entry.clone();
                async move { ledger.append(&entry).await }
            })
            .await;
        if let Err(e) = res {
            warn!(%record_id, error = %e, "failed to write run ledger entry");
        }
    }

    /* ─────────────── processing ─────────────── */

    /// Webhook-style entry point: load the formula set, process one record,
    /// and surface upstream failures to the caller.
    pub async fn process(
        &self,
        record_id: &str,
        event: Option<&str>,
    ) -> Result<RecordOutcome, UpstreamError> {
        let formulas = self.load_formulas().await?;
        let dictionary = self.load_dictionary().await?;
        let pass = PassContext {
            formulas: &formulas,
            dictionary: &dictionary,
            event,
            dry_run: false,
        };
        let correlation_id = Uuid::new_v4();
        let started = Instant::now();
        match self.process_inner(record_id, &pass, correlation_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let outcome = self.failure(record_id, None, correlation_id, started, &e);
                self.append_ledger(outcome.ledger_entry()).await;
                Err(e)
            }
        }
    }

    /// Batch entry point: never fails. Upstream errors become an error
    /// outcome (and, outside a dry run, an error ledger entry).
    pub async fn run(
        &self,
        record_id: &str,
        subject_id: Option<&str>,
        pass: &PassContext<'_>,
    ) -> RecordOutcome {
        let correlation_id = Uuid::new_v4();
        let started = Instant::now();
        match self.process_inner(record_id, pass, correlation_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let outcome = self.failure(record_id, subject_id, correlation_id, started, &e);
                if !pass.dry_run {
                    self.append_ledger(outcome.ledger_entry()).await;
                }
                outcome
            }
        }
    }

    fn failure(
        &self,
        record_id: &str,
        subject_id: Option<&str>,
        correlation_id: Uuid,
        started: Instant,
        err: &UpstreamError,
    ) -> RecordOutcome {
        warn!(%record_id, %correlation_id, error = %err, "record failed");
        let mut outcome = RecordOutcome::new(record_id, subject_id, correlation_id);
        outcome.status = RunStatus::Error;
        outcome.error = Some(err.to_string());
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn process_inner(
        &self,
        record_id: &str,
        pass: &PassContext<'_>,
        correlation_id: Uuid,
    ) -> Result<RecordOutcome, UpstreamError> {
        let span = info_span!("record", %record_id, %correlation_id, dry_run = pass.dry_run);
        async move {
            let started = Instant::now();
            let record = self.fetch_record(record_id).await?;
            let read_hash = field_state_hash(&record);
            let summary = self.overtime_summary(&record).await;

            let mut input = EvaluationInput::new(&record);
            if let Some(summary) = &summary {
                input = input.with_overtime(summary);
            }
            let mut result =
                self.engine
                    .evaluate(pass.formulas, input, pass.dictionary, pass.event);

            let mut outcome = RecordOutcome::new(record_id, Some(record.user_id.as_str()), correlation_id);
            debug!(
                updates = result.updates.len(),
                diagnostics = result.diagnostics.len(),
                "evaluated"
            );

            if result.has_updates() && !pass.dry_run {
                let live = self.fetch_record(record_id).await?;
                if field_state_hash(&live) != read_hash {
                    warn!("record changed during evaluation, discarding updates");
                    result.discard_updates();
                    result.push_diagnostic(concurrent_modification(record_id));
                    outcome.status = RunStatus::Skipped;
                } else {
                    let patch = result.updates.iter().map(FieldPatch::from).collect();
                    self.patch(record_id, patch).await?;
                    info!(fields = result.updates.len(), "patched");
                }
            }

            outcome.updated = result.has_updates();
            outcome.changes = result.changes;
            outcome.diagnostics = result.diagnostics;
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            if !pass.dry_run {
                self.append_ledger(outcome.ledger_entry()).await;
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
