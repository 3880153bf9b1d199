//! Append-only action log for the withdrawal workflow.
//!
//! Every state transition a withdrawal request goes through is recorded
//! here. Records are only ever appended, never mutated in place; the
//! surrounding application persists them via the export/import pair on the
//! workflow and can additionally stream them through an [`AuditLogger`].

use crate::identity::Address;
use crate::txlayer::TxRef;
use crate::withdrawal::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of withdrawal lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A withdrawal request was created.
    WithdrawalRequested,
    /// A request below the multi-sig threshold was approved by its own
    /// requester at creation.
    WithdrawalAutoApproved,
    /// A pending request was approved by a second owner-class principal.
    WithdrawalApproved,
    /// A request was rejected.
    WithdrawalRejected,
    /// An approved request was executed and a transaction submitted.
    WithdrawalExecuted,
}

/// One record in the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Unique record id (`evt_` + UUIDv7, time-ordered).
    pub id: String,

    /// The transition that occurred.
    pub kind: ActionKind,

    /// When it occurred.
    pub timestamp: DateTime<Utc>,

    /// The principal that caused the transition.
    pub actor: Address,

    /// The withdrawal request this record belongs to.
    pub request: RequestId,

    /// Additional context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Transaction reference, for executed withdrawals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,
}

impl ActionRecord {
    /// Create a new record stamped at `timestamp`.
    pub fn new(
        kind: ActionKind,
        timestamp: DateTime<Utc>,
        actor: Address,
        request: RequestId,
    ) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::now_v7().simple()),
            kind,
            timestamp,
            actor,
            request,
            details: None,
            tx_ref: None,
        }
    }

    /// Add details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Add a transaction reference.
    pub fn with_tx_ref(mut self, tx_ref: TxRef) -> Self {
        self.tx_ref = Some(tx_ref);
        self
    }
}

/// Append-only sequence of [`ActionRecord`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously exported records, preserving order.
    pub fn from_records(records: Vec<ActionRecord>) -> Self {
        Self { records }
    }

    /// Append a record.
    pub fn record(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    /// Iterate over records in append order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records in append order.
    pub fn export(&self) -> Vec<ActionRecord> {
        self.records.clone()
    }
}

/// Trait for audit sinks.
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    /// Consume one action record.
    fn log(&self, record: &ActionRecord);
}

/// A logger that writes records to stdout as JSON lines.
///
/// Suitable for containerized environments where logs are scraped by an
/// external agent.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for StdoutLogger {
    fn log(&self, record: &ActionRecord) {
        if let Ok(json) = serde_json::to_string(record) {
            println!("{}", json);
        } else {
            eprintln!("Failed to serialize action record: {:?}", record);
        }
    }
}

/// A logger that does nothing (for testing or when auditing is disabled).
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _record: &ActionRecord) {}
}
