//! Owner withdrawal workflow with optional two-party approval.
//!
//! For SDK-only deployments without an on-chain vault, this models the
//! same owner-unrestricted-withdrawal property client-side. Withdrawals at
//! or above a configured value threshold require a second owner-class
//! principal (the co-owner) to approve before execution; the requester can
//! never approve their own request — that is the entire point of the
//! two-party gate. Requests below the threshold are auto-approved by
//! their requester at creation.
//!
//! Every transition is appended to the workflow's [`ActionLog`] and the
//! whole state round-trips through [`WithdrawalWorkflow::export_state`] /
//! [`WithdrawalWorkflow::import_state`] for persistence.
//!
//! Methods take `&mut self`; exclusive access is the serialization
//! discipline. Callers sharing a workflow across tasks put it behind one
//! mutex.

use crate::audit::{ActionKind, ActionLog, ActionRecord, AuditLogger};
use crate::error::{Error, Result};
use crate::identity::Address;
use crate::time::{Clock, SystemClock};
use crate::txlayer::{TransactionLayer, TxRef};
use crate::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The required prefix for all withdrawal request IDs.
pub const REQUEST_ID_PREFIX: &str = "cus_wdr_";

/// A unique identifier for a withdrawal request (UUIDv7, time-ordered).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(String);

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !s.starts_with(REQUEST_ID_PREFIX) {
            return Err(serde::de::Error::custom(format!(
                "request ID must start with '{}'",
                REQUEST_ID_PREFIX
            )));
        }
        Ok(RequestId(s))
    }
}

impl RequestId {
    /// Generate a new time-ordered request ID.
    pub fn new() -> Self {
        Self(format!("{}{}", REQUEST_ID_PREFIX, Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is being withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalKind {
    Native,
    Token(Address),
}

/// Lifecycle of a withdrawal request.
///
/// `Pending → Approved → Executed`, with `Rejected` reachable from any
/// non-terminal state. `Executed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Executed,
    Rejected,
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// One withdrawal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: RequestId,
    pub kind: WithdrawalKind,
    pub amount: Amount,
    pub recipient: Address,
    pub requested_at: DateTime<Utc>,
    pub requested_by: Address,
    pub status: WithdrawalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,
}

/// Order-preserving snapshot of a workflow's requests and action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub requests: Vec<WithdrawalRequest>,
    pub log: Vec<ActionRecord>,
}

/// The request map, action log, and approval rules for one owner.
#[derive(Debug)]
pub struct WithdrawalWorkflow {
    owner: Address,
    co_owner: Option<Address>,
    /// Withdrawals at or above this value need the co-owner's approval.
    /// `None` (or no co-owner) disables two-party gating entirely.
    multisig_threshold: Option<Amount>,
    requests: HashMap<RequestId, WithdrawalRequest>,
    /// Insertion order, for order-preserving export.
    order: Vec<RequestId>,
    log: ActionLog,
    tx: Arc<dyn TransactionLayer>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditLogger>>,
}

impl WithdrawalWorkflow {
    /// Create a workflow for `owner`, executing through `tx`.
    pub fn new(owner: Address, tx: Arc<dyn TransactionLayer>) -> Self {
        Self {
            owner,
            co_owner: None,
            multisig_threshold: None,
            requests: HashMap::new(),
            order: Vec::new(),
            log: ActionLog::new(),
            tx,
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    /// Configure a co-owner for two-party approval.
    pub fn with_co_owner(mut self, co_owner: Address) -> Self {
        self.co_owner = Some(co_owner);
        self
    }

    /// Configure the value threshold above which two-party approval kicks in.
    pub fn with_multisig_threshold(mut self, threshold: Amount) -> Self {
        self.multisig_threshold = Some(threshold);
        self
    }

    /// Substitute the clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stream every action record through an audit sink as well.
    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn co_owner(&self) -> Option<&Address> {
        self.co_owner.as_ref()
    }

    fn is_owner_class(&self, principal: &Address) -> bool {
        *principal == self.owner || Some(*principal) == self.co_owner
    }

    fn log_action(&mut self, record: ActionRecord) {
        if let Some(audit) = &self.audit {
            audit.log(&record);
        }
        self.log.record(record);
    }

    /// Create a withdrawal request.
    ///
    /// With a co-owner and threshold configured and `amount >= threshold`,
    /// the request starts `Pending`; otherwise it is auto-approved by its
    /// requester.
    pub fn request_withdrawal(
        &mut self,
        kind: WithdrawalKind,
        amount: Amount,
        recipient: &Address,
        requester: &Address,
    ) -> Result<RequestId> {
        if !self.is_owner_class(requester) {
            return Err(Error::NotOwnerClass { caller: *requester });
        }
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let now = self.clock.now();
        let id = RequestId::new();
        let needs_second_approval = self.co_owner.is_some()
            && self
                .multisig_threshold
                .map_or(false, |threshold| amount >= threshold);

        let (status, approved_by) = if needs_second_approval {
            (WithdrawalStatus::Pending, None)
        } else {
            (WithdrawalStatus::Approved, Some(*requester))
        };

        let request = WithdrawalRequest {
            id: id.clone(),
            kind,
            amount,
            recipient: *recipient,
            requested_at: now,
            requested_by: *requester,
            status,
            approved_by,
            executed_at: None,
            tx_ref: None,
        };
        self.requests.insert(id.clone(), request);
        self.order.push(id.clone());

        self.log_action(
            ActionRecord::new(ActionKind::WithdrawalRequested, now, *requester, id.clone())
                .with_details(format!("{} to {}", amount, recipient)),
        );
        if !needs_second_approval {
            self.log_action(ActionRecord::new(
                ActionKind::WithdrawalAutoApproved,
                now,
                *requester,
                id.clone(),
            ));
        }

        info!(
            request = %id,
            amount = %amount,
            pending = needs_second_approval,
            "withdrawal requested"
        );
        Ok(id)
    }

    /// Approve a pending request. The approver must be owner-class and
    /// must not be the original requester.
    pub fn approve(&mut self, id: &RequestId, approver: &Address) -> Result<()> {
        let now = self.clock.now();
        let owner = self.owner;
        let co_owner = self.co_owner;

        let request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| Error::RequestNotFound {
                request: id.clone(),
            })?;
        if *approver != owner && Some(*approver) != co_owner {
            return Err(Error::NotOwnerClass { caller: *approver });
        }
        if request.status != WithdrawalStatus::Pending {
            return Err(Error::RequestNotPending {
                request: id.clone(),
                status: request.status,
            });
        }
        if *approver == request.requested_by {
            return Err(Error::SelfApproval {
                request: id.clone(),
                approver: *approver,
            });
        }

        request.status = WithdrawalStatus::Approved;
        request.approved_by = Some(*approver);

        self.log_action(ActionRecord::new(
            ActionKind::WithdrawalApproved,
            now,
            *approver,
            id.clone(),
        ));
        info!(request = %id, approver = %approver, "withdrawal approved");
        Ok(())
    }

    /// Reject any non-terminal request.
    pub fn reject(&mut self, id: &RequestId, rejecter: &Address) -> Result<()> {
        let now = self.clock.now();
        let owner = self.owner;
        let co_owner = self.co_owner;

        let request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| Error::RequestNotFound {
                request: id.clone(),
            })?;
        if *rejecter != owner && Some(*rejecter) != co_owner {
            return Err(Error::NotOwnerClass { caller: *rejecter });
        }
        match request.status {
            WithdrawalStatus::Pending | WithdrawalStatus::Approved => {}
            status @ (WithdrawalStatus::Executed | WithdrawalStatus::Rejected) => {
                return Err(Error::RequestAlreadyFinal {
                    request: id.clone(),
                    status,
                });
            }
        }

        request.status = WithdrawalStatus::Rejected;

        self.log_action(ActionRecord::new(
            ActionKind::WithdrawalRejected,
            now,
            *rejecter,
            id.clone(),
        ));
        info!(request = %id, rejecter = %rejecter, "withdrawal rejected");
        Ok(())
    }

    /// Execute an approved request: perform the transfer, then mark it
    /// `Executed` with the transaction reference.
    ///
    /// Executing a non-approved request is a programming error surfaced
    /// immediately, not a retryable condition. A transfer-layer failure
    /// propagates and leaves the request `Approved`.
    pub fn execute(&mut self, id: &RequestId) -> Result<TxRef> {
        let request = self.requests.get(id).ok_or_else(|| Error::RequestNotFound {
            request: id.clone(),
        })?;
        if request.status != WithdrawalStatus::Approved {
            return Err(Error::RequestNotApproved {
                request: id.clone(),
                status: request.status,
            });
        }
        let kind = request.kind;
        let amount = request.amount;
        let recipient = request.recipient;
        let actor = request.approved_by.unwrap_or(request.requested_by);

        let tx_ref = match kind {
            WithdrawalKind::Native => self.tx.submit_transfer(&recipient, amount, None)?,
            WithdrawalKind::Token(token) => {
                self.tx.submit_token_transfer(&token, &recipient, amount)?
            }
        };

        let now = self.clock.now();
        if let Some(request) = self.requests.get_mut(id) {
            request.status = WithdrawalStatus::Executed;
            request.executed_at = Some(now);
            request.tx_ref = Some(tx_ref.clone());
        }

        self.log_action(
            ActionRecord::new(ActionKind::WithdrawalExecuted, now, actor, id.clone())
                .with_tx_ref(tx_ref.clone()),
        );
        info!(request = %id, tx = %tx_ref, "withdrawal executed");
        Ok(tx_ref)
    }

    /// Look up one request.
    pub fn request(&self, id: &RequestId) -> Option<&WithdrawalRequest> {
        self.requests.get(id)
    }

    /// All requests in creation order.
    pub fn requests(&self) -> Vec<&WithdrawalRequest> {
        self.order
            .iter()
            .filter_map(|id| self.requests.get(id))
            .collect()
    }

    /// Requests still awaiting approval.
    pub fn pending_requests(&self) -> Vec<&WithdrawalRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.status == WithdrawalStatus::Pending)
            .collect()
    }

    /// The append-only action log.
    pub fn action_log(&self) -> &ActionLog {
        &self.log
    }

    /// Snapshot requests (in creation order) and the action log.
    pub fn export_state(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            requests: self
                .order
                .iter()
                .filter_map(|id| self.requests.get(id).cloned())
                .collect(),
            log: self.log.export(),
        }
    }

    /// Replace this workflow's requests and log with a previously
    /// exported snapshot. Approval rules (owner, co-owner, threshold) are
    /// configuration, not state, and are left untouched.
    pub fn import_state(&mut self, snapshot: WorkflowSnapshot) {
        self.order = snapshot.requests.iter().map(|r| r.id.clone()).collect();
        self.requests = snapshot
            .requests
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        self.log = ActionLog::from_records(snapshot.log);
    }
}
