//! Request records and the sinks that receive them.
//!
//! The request tracer produces exactly one [`RequestRecord`] per request and
//! hands it to a [`RecordSink`]. The sink routes it by [`Severity`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log channel of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 2xx outcome.
    Success,
    /// Anything else.
    Error,
}

impl Severity {
    /// Derives the channel from a response status.
    ///
    /// ```
    /// use strata_telemetry::Severity;
    ///
    /// assert_eq!(Severity::from_status(204), Severity::Success);
    /// assert_eq!(Severity::from_status(302), Severity::Error);
    /// assert_eq!(Severity::from_status(429), Severity::Error);
    /// ```
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A point-in-time fragment recorded while the chain was running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    /// Caller supplied label.
    pub label: String,
    /// Unit that was running when the fragment was taken.
    pub origin: String,
    /// Milliseconds since the trace started.
    pub elapsed_ms: u64,
    /// Snapshot value.
    pub value: Value,
}

/// The completed trace of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Client supplied or generated key identifying the request.
    pub idempotence_key: String,
    /// Request method.
    pub method: String,
    /// Concrete request path.
    pub path: String,
    /// Matched route pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Final response status.
    pub status: u16,
    /// When the trace started.
    pub start_time: DateTime<Utc>,
    /// When the trace was last updated by an attachment or a watch.
    pub current_time: DateTime<Utc>,
    /// When the record was finalised.
    pub finish_time: DateTime<Utc>,
    /// Wall time from the request's first touch to the completion hook,
    /// including any idle or delayed segments.
    pub lifetime_ms: u64,
    /// Time from trace start to finalisation.
    pub duration_ms: u64,
    /// Error message for failed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final state of attached components, keyed by component id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, Value>,
    /// Immediate fragments, in recording order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watches: Vec<WatchRecord>,
}

impl RequestRecord {
    /// The channel this record belongs to.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        Severity::from_status(self.status)
    }
}

/// Destination for completed request records.
pub trait RecordSink: Send + Sync {
    /// Receives one record. Called exactly once per traced request.
    fn emit(&self, record: RequestRecord);
}

/// Writes each record as one `tracing` event on target `strata::request`:
/// `info` for successes, `error` for failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn emit(&self, record: RequestRecord) {
        let body = serde_json::to_string(&record).unwrap_or_default();
        match record.severity() {
            Severity::Success => tracing::info!(
                target: "strata::request",
                idempotence_key = %record.idempotence_key,
                http.status_code = record.status,
                lifetime_ms = record.lifetime_ms,
                duration_ms = record.duration_ms,
                record = %body,
                "request completed"
            ),
            Severity::Error => tracing::error!(
                target: "strata::request",
                idempotence_key = %record.idempotence_key,
                http.status_code = record.status,
                lifetime_ms = record.lifetime_ms,
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or_default(),
                record = %body,
                "request failed"
            ),
        }
    }
}

/// Keeps records in memory, for tests and introspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<RequestRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in emission order.
    #[must_use]
    pub fn records(&self) -> Vec<RequestRecord> {
        self.records.lock().clone()
    }

    /// Records on the given channel.
    #[must_use]
    pub fn by_severity(&self, severity: Severity) -> Vec<RequestRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.severity() == severity)
            .cloned()
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drops all stored records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: RequestRecord) {
        self.records.lock().push(record);
    }
}
