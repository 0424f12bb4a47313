use std::time::Duration;

use chrono::NaiveDate;

/// Failure talking to the upstream system, or to the scheduler in front of
/// it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream asked us to slow down, optionally saying for how long.
    #[error("rate limited by upstream{}", retry_after.map(|d| format!(" (retry after {} ms)", d.as_millis())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("record '{0}' not found")]
    NotFound(String),

    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The scheduler shut down before the request ran.
    #[error("request cancelled")]
    Cancelled,
}

impl UpstreamError {
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackfillError {
    #[error("range end {to} is before range start {from}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("range of {days} days exceeds the upstream limit of {max} days")]
    RangeTooLarge { days: i64, max: u32 },

    /// A report page still failed after its retries.
    #[error("report page {page} for {day} failed: {source}")]
    Page {
        day: NaiveDate,
        page: u32,
        #[source]
        source: UpstreamError,
    },

    /// Formulas or dictionary could not be loaded.
    #[error("failed to load {what}: {source}")]
    Load {
        what: &'static str,
        #[source]
        source: UpstreamError,
    },

    #[error("backfill cancelled")]
    Cancelled,
}
