//! Collaborator interfaces to the external system.
//!
//! The core never talks to the network directly. Everything it reads or
//! writes goes through these traits, and every call is routed through the
//! [`Scheduler`](crate::scheduler::Scheduler) by the callers in this crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldwright_common::{
    DictionaryMap, FieldChange, FieldUpdate, FormulaDefinition, RecordSnapshot, Value,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UpstreamError;

/// One page of the historical report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub date_range_start: DateTime<Utc>,
    pub date_range_end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_ids: Option<Vec<String>>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

/// A single field write sent back upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
    pub field_id: String,
    pub value: Value,
}

impl From<&FieldUpdate> for FieldPatch {
    fn from(u: &FieldUpdate) -> Self {
        Self {
            field_id: u.field_id.clone(),
            value: u.value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Skipped,
    Error,
}

/// Audit entry for one processed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub diff: BTreeMap<String, FieldChange>,
    pub correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait FormulaRepository: Send + Sync {
    /// Formulas of the scope this repository was built for, in any order.
    async fn formulas(&self) -> Result<Vec<FormulaDefinition>, UpstreamError>;
}

#[async_trait]
pub trait DictionaryRepository: Send + Sync {
    async fn dictionary(&self) -> Result<DictionaryMap, UpstreamError>;
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// The live state of one record.
    async fn record(&self, record_id: &str) -> Result<RecordSnapshot, UpstreamError>;

    async fn report(&self, query: &ReportQuery) -> Result<Vec<RecordSnapshot>, UpstreamError>;
}

#[async_trait]
pub trait PatchSink: Send + Sync {
    async fn patch(&self, record_id: &str, fields: &[FieldPatch]) -> Result<(), UpstreamError>;
}

#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn append(&self, entry: &RunEntry) -> Result<(), UpstreamError>;
}

/// Every collaborator the runtime needs, shared.
#[derive(Clone)]
pub struct Upstream {
    pub formulas: Arc<dyn FormulaRepository>,
    pub dictionary: Arc<dyn DictionaryRepository>,
    pub records: Arc<dyn RecordSource>,
    pub patches: Arc<dyn PatchSink>,
    pub ledger: Arc<dyn RunLedger>,
}

impl Upstream {
    /// Use one object for every role.
    pub fn from_shared<U>(upstream: Arc<U>) -> Self
    where
        U: FormulaRepository + DictionaryRepository + RecordSource + PatchSink + RunLedger + 'static,
    {
        Self {
            formulas: upstream.clone(),
            dictionary: upstream.clone(),
            records: upstream.clone(),
            patches: upstream.clone(),
            ledger: upstream,
        }
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream").finish_non_exhaustive()
    }
}
