//! Error types for Custodia.
//!
//! Errors are specific and actionable: a rejected agent send always names
//! the one check that failed and the numbers involved, so an operator can
//! tell "agent tried to exceed policy" apart from "agent wallet
//! underfunded" without digging through logs.

use crate::identity::Address;
use crate::ledger::DelegationId;
use crate::withdrawal::{RequestId, WithdrawalStatus};
use crate::Amount;
use thiserror::Error;

/// Result type alias for Custodia operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classes.
///
/// Every [`Error`] variant maps onto one of these. The kind is what callers
/// branch on; the variant carries the human-facing detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks the required role for this delegation or request.
    NotAuthorized,
    /// Operation not valid in the current lifecycle state.
    InvalidState,
    /// A per-transaction, daily, value, or rate cap was violated.
    LimitExceeded,
    /// Recipient is not on the delegation's whitelist.
    WhitelistViolation,
    /// Delegation balance cannot cover the requested amount.
    InsufficientBalance,
    /// A trust registry could not be reached. Absorbed into degraded
    /// verdicts by the resolver, never surfaced from `check_trust`.
    RegistryUnavailable,
    /// Rejected configuration, e.g. a per-tx limit above the daily limit.
    InvalidConfiguration,
    /// The external transaction layer reported a failure.
    Transfer,
}

impl ErrorKind {
    /// Machine-readable name (kebab-case).
    pub fn name(self) -> &'static str {
        match self {
            Self::NotAuthorized => "not-authorized",
            Self::InvalidState => "invalid-state",
            Self::LimitExceeded => "limit-exceeded",
            Self::WhitelistViolation => "whitelist-violation",
            Self::InsufficientBalance => "insufficient-balance",
            Self::RegistryUnavailable => "registry-unavailable",
            Self::InvalidConfiguration => "invalid-configuration",
            Self::Transfer => "transfer-failed",
        }
    }
}

/// Errors that can occur in Custodia operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Authorization
    // =========================================================================
    /// Caller is not the delegation's current agent.
    #[error("caller {caller} is not the agent of delegation {delegation}")]
    NotAgent {
        delegation: DelegationId,
        caller: Address,
    },

    /// Caller is not the delegation's owner.
    #[error("caller {caller} is not the owner of delegation {delegation}")]
    NotOwner {
        delegation: DelegationId,
        caller: Address,
    },

    /// Caller is neither the owner nor the configured co-owner.
    #[error("caller {caller} is not an owner-class principal")]
    NotOwnerClass { caller: Address },

    /// The requester of a withdrawal attempted to approve it themselves.
    #[error("self-approval forbidden: {approver} requested withdrawal {request}")]
    SelfApproval {
        request: RequestId,
        approver: Address,
    },

    // =========================================================================
    // Lifecycle state
    // =========================================================================
    /// Agent transfers are rejected while the delegation is paused.
    #[error("delegation {delegation} is paused")]
    DelegationPaused { delegation: DelegationId },

    /// The delegation's agent slot has been revoked; the record is terminal.
    #[error("delegation {delegation} is revoked")]
    DelegationRevoked { delegation: DelegationId },

    /// No delegation with this id exists.
    #[error("delegation {delegation} not found")]
    DelegationNotFound { delegation: DelegationId },

    /// An agent identity may hold at most one active delegation.
    #[error("agent {agent} already holds active delegation {existing}")]
    AgentAlreadyDelegated {
        agent: Address,
        existing: DelegationId,
    },

    /// The null identity cannot act as an agent.
    #[error("the null identity cannot be assigned as an agent")]
    NullAgent,

    /// No withdrawal request with this id exists.
    #[error("withdrawal request {request} not found")]
    RequestNotFound { request: RequestId },

    /// Approval requires a pending request.
    #[error("withdrawal request {request} is {status}, expected pending")]
    RequestNotPending {
        request: RequestId,
        status: WithdrawalStatus,
    },

    /// Execution requires an approved request.
    #[error("withdrawal request {request} is {status}, expected approved")]
    RequestNotApproved {
        request: RequestId,
        status: WithdrawalStatus,
    },

    /// Rejection requires a non-terminal request.
    #[error("withdrawal request {request} is already {status}")]
    RequestAlreadyFinal {
        request: RequestId,
        status: WithdrawalStatus,
    },

    // =========================================================================
    // Limits and balances
    // =========================================================================
    /// Send amount exceeds the per-transaction cap.
    #[error("amount {amount} exceeds per-transaction cap {limit}")]
    PerTxLimitExceeded { amount: Amount, limit: Amount },

    /// Send would push the rolling 24h window over the daily cap.
    #[error(
        "amount {requested} with {spent_today} already spent exceeds daily cap {limit}"
    )]
    DailyLimitExceeded {
        requested: Amount,
        spent_today: Amount,
        limit: Amount,
    },

    /// Value exceeds the guardrail policy's absolute cap.
    #[error("value {value} exceeds absolute cap {cap}")]
    ValueCapExceeded { value: Amount, cap: Amount },

    /// The hourly or daily send-count cap is already reached.
    #[error("{window} send cap of {cap} reached")]
    SendRateReached { window: &'static str, cap: u32 },

    /// Whitelist is enabled and the recipient is not on it.
    #[error("recipient {recipient} is not whitelisted for delegation {delegation}")]
    WhitelistViolation {
        delegation: DelegationId,
        recipient: Address,
    },

    /// Balance cannot cover the requested amount.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Amount,
        available: Amount,
    },

    // =========================================================================
    // Configuration
    // =========================================================================
    /// Zero-amount deposits and withdrawals are rejected.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The per-transaction limit must not exceed the daily limit.
    #[error("per-transaction limit {per_tx} exceeds daily limit {daily}")]
    LimitsInverted { per_tx: Amount, daily: Amount },

    /// Input could not be parsed as an address.
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    /// Input could not be parsed as a delegation or request id.
    #[error("invalid id '{input}': {reason}")]
    InvalidId { input: String, reason: String },

    // =========================================================================
    // External collaborators
    // =========================================================================
    /// A trust registry could not be reached or is not deployed.
    #[error("{registry} registry unavailable: {reason}")]
    RegistryUnavailable {
        registry: &'static str,
        reason: String,
    },

    /// The transaction layer failed to submit or confirm a transfer.
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// Exported state could not be serialized or parsed.
    #[error("state serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Map this error to its coarse kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAgent { .. }
            | Self::NotOwner { .. }
            | Self::NotOwnerClass { .. }
            | Self::SelfApproval { .. } => ErrorKind::NotAuthorized,

            Self::DelegationPaused { .. }
            | Self::DelegationRevoked { .. }
            | Self::DelegationNotFound { .. }
            | Self::AgentAlreadyDelegated { .. }
            | Self::RequestNotFound { .. }
            | Self::RequestNotPending { .. }
            | Self::RequestNotApproved { .. }
            | Self::RequestAlreadyFinal { .. } => ErrorKind::InvalidState,

            Self::PerTxLimitExceeded { .. }
            | Self::DailyLimitExceeded { .. }
            | Self::ValueCapExceeded { .. }
            | Self::SendRateReached { .. } => ErrorKind::LimitExceeded,

            Self::WhitelistViolation { .. } => ErrorKind::WhitelistViolation,

            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,

            Self::NullAgent
            | Self::ZeroAmount
            | Self::LimitsInverted { .. }
            | Self::InvalidAddress { .. }
            | Self::InvalidId { .. }
            | Self::Serialization(_) => ErrorKind::InvalidConfiguration,

            Self::RegistryUnavailable { .. } => ErrorKind::RegistryUnavailable,

            Self::TransferFailed { .. } => ErrorKind::Transfer,
        }
    }

    /// Machine-readable kind name (kebab-case).
    pub fn kind_name(&self) -> &'static str {
        self.kind().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping() {
        let err = Error::PerTxLimitExceeded {
            amount: 200,
            limit: 100,
        };
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
        assert_eq!(err.kind_name(), "limit-exceeded");

        let err = Error::NotOwnerClass {
            caller: Address::null(),
        };
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let err = Error::LimitsInverted {
            per_tx: 10,
            daily: 5,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn messages_carry_numbers() {
        let err = Error::DailyLimitExceeded {
            requested: 100,
            spent_today: 950,
            limit: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("950"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn kind_names_are_kebab_case() {
        let kinds = [
            ErrorKind::NotAuthorized,
            ErrorKind::InvalidState,
            ErrorKind::LimitExceeded,
            ErrorKind::WhitelistViolation,
            ErrorKind::InsufficientBalance,
            ErrorKind::RegistryUnavailable,
            ErrorKind::InvalidConfiguration,
            ErrorKind::Transfer,
        ];
        for kind in kinds {
            let name = kind.name();
            assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '-'));
        }
    }
}
