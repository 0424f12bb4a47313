//! In-process upstream backed by plain collections.
//!
//! Implements every collaborator trait, applies patches to its own records,
//! and can be scripted to fail with rate limits or to simulate a concurrent
//! writer. Used by the test suites and by the CLI's offline mode.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fieldwright_common::{DictionaryMap, FormulaDefinition, RecordSnapshot, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::upstream::{
    DictionaryRepository, FieldPatch, FormulaRepository, PatchSink, RecordSource, ReportQuery,
    RunEntry, RunLedger,
};

/// Serializable content of a [`MemoryUpstream`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub records: Vec<RecordSnapshot>,
    pub formulas: Vec<FormulaDefinition>,
    pub dictionary: DictionaryMap,
}

impl Snapshot {
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::from)
    }
}

/// Operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Formulas,
    Dictionary,
    Record,
    Report,
    Patch,
    Ledger,
}

#[derive(Default)]
struct State {
    snapshot: Snapshot,
    patches: Vec<(String, Vec<FieldPatch>)>,
    ledger: Vec<RunEntry>,
    calls: BTreeMap<Operation, usize>,
    failures: BTreeMap<Operation, VecDeque<UpstreamError>>,
    /// Field writes applied right after the next read of a record.
    pending_edits: BTreeMap<String, Vec<(String, Value)>>,
}

#[derive(Default)]
pub struct MemoryUpstream {
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryUpstream")
            .field("records", &state.snapshot.records.len())
            .field("formulas", &state.snapshot.formulas.len())
            .finish_non_exhaustive()
    }
}

impl MemoryUpstream {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(State {
                snapshot,
                ..Default::default()
            }),
        }
    }

    pub fn shared(snapshot: Snapshot) -> Arc<Self> {
        Arc::new(Self::new(snapshot))
    }

    /// Current content, including applied patches.
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().snapshot.clone()
    }

    pub fn record_by_id(&self, id: &str) -> Option<RecordSnapshot> {
        self.state
            .lock()
            .snapshot
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Every patch received, in order.
    pub fn patches(&self) -> Vec<(String, Vec<FieldPatch>)> {
        self.state.lock().patches.clone()
    }

    pub fn ledger(&self) -> Vec<RunEntry> {
        self.state.lock().ledger.clone()
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Fail the next `times` calls of `op` with a rate-limit signal.
    pub fn rate_limit(&self, op: Operation, times: usize, retry_after: Option<Duration>) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat_n(
            UpstreamError::rate_limited(retry_after),
            times,
        ));
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: Operation, err: UpstreamError) {
        self.state.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Simulate another writer: right after the next read of `record_id`,
    /// set `field_id` to `value`.
    pub fn edit_after_next_read(&self, record_id: &str, field_id: &str, value: Value) {
        self.state
            .lock()
            .pending_edits
            .entry(record_id.to_string())
            .or_default()
            .push((field_id.to_string(), value));
    }

    /// Count the call and pop a scripted failure, if any.
    fn enter(&self, op: Operation) -> Result<(), UpstreamError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn set_field(record: &mut RecordSnapshot, field_id: &str, value: Value) {
    if let Some(f) = record
        .custom_fields
        .iter_mut()
        .find(|f| f.field_id == field_id)
    {
        f.value = value;
    }
}

#[async_trait]
impl FormulaRepository for MemoryUpstream {
    async fn formulas(&self) -> Result<Vec<FormulaDefinition>, UpstreamError> {
        self.enter(Operation::Formulas)?;
        Ok(self.state.lock().snapshot.formulas.clone())
    }
}

#[async_trait]
impl DictionaryRepository for MemoryUpstream {
    async fn dictionary(&self) -> Result<DictionaryMap, UpstreamError> {
        self.enter(Operation::Dictionary)?;
        Ok(self.state.lock().snapshot.dictionary.clone())
    }
}

#[async_trait]
impl RecordSource for MemoryUpstream {
    async fn record(&self, record_id: &str) -> Result<RecordSnapshot, UpstreamError> {
        self.enter(Operation::Record)?;
        let mut state = self.state.lock();
        let edits = state.pending_edits.remove(record_id).unwrap_or_default();
        let record = state
            .snapshot
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| UpstreamError::NotFound(record_id.to_string()))?;
        let read = record.clone();
        for (field_id, value) in edits {
            set_field(record, &field_id, value);
        }
        Ok(read)
    }

    /// Records whose start falls in the range, ordered by start instant then
    /// id, one page at a time.
    async fn report(&self, query: &ReportQuery) -> Result<Vec<RecordSnapshot>, UpstreamError> {
        self.enter(Operation::Report)?;
        let state = self.state.lock();
        let mut rows: Vec<(chrono::DateTime<Utc>, &RecordSnapshot)> = state
            .snapshot
            .records
            .iter()
            .filter(|r| {
                query
                    .subject_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&r.user_id))
            })
            .filter_map(|r| Some((r.start()?.with_timezone(&Utc), r)))
            .filter(|(start, _)| *start >= query.date_range_start && *start <= query.date_range_end)
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let size = query.page_size.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * size;
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(size)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[async_trait]
impl PatchSink for MemoryUpstream {
    async fn patch(&self, record_id: &str, fields: &[FieldPatch]) -> Result<(), UpstreamError> {
        self.enter(Operation::Patch)?;
        let mut state = self.state.lock();
        let record = state
            .snapshot
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| UpstreamError::NotFound(record_id.to_string()))?;
        for p in fields {
            set_field(record, &p.field_id, p.value.clone());
        }
        state.patches.push((record_id.to_string(), fields.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl RunLedger for MemoryUpstream {
    async fn append(&self, entry: &RunEntry) -> Result<(), UpstreamError> {
        self.enter(Operation::Ledger)?;
        self.state.lock().ledger.push(entry.clone());
        Ok(())
    }
}
