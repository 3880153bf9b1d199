//! # Custodia Core
//!
//! Owner-governed custody guardrails for autonomous agents.
//!
//! A human *owner* delegates a funded account to an autonomous *agent*
//! while retaining override authority. Custodia answers a different
//! question than an IAM system: not "who are you?" but "is this spend
//! within the bounds the owner delegated, and do we trust the
//! counterparty receiving it?"
//!
//! ## Key Concepts
//!
//! - **Delegation (vault)**: per-agent balance, rolling daily limit,
//!   per-transaction cap, recipient whitelist — enforced atomically by the
//!   [`ledger::VaultLedger`]. The agent is limited; the owner never is.
//! - **Killswitch**: the owner-only pause / revoke / emergency-drain
//!   family that overrides agent activity unconditionally.
//! - **Withdrawal workflow**: request → approve → execute with optional
//!   two-party gating above a value threshold
//!   ([`withdrawal::WithdrawalWorkflow`]).
//! - **Trust verdicts**: identity, reputation, and attestation facts about
//!   a counterparty folded into one explainable decision
//!   ([`trust::TrustResolver`]), memoized by a TTL cache.
//!
//! ## Example
//!
//! ```rust,ignore
//! use custodia_core::{Address, VaultLedger};
//! use std::sync::Arc;
//!
//! let ledger = VaultLedger::new(tx_layer);
//! let id = ledger.create(&owner, &agent, daily_limit, per_tx_limit, funding)?;
//!
//! // The agent spends inside the guardrails...
//! ledger.agent_send(&id, &agent, &shop, price, Some("api credits"))?;
//!
//! // ...and the owner can always pull everything back.
//! ledger.emergency_drain(&id, &owner, &[usdc])?;
//! ```

pub mod audit;
pub mod cache;
pub mod error;
pub mod guardrail;
pub mod identity;
pub mod ledger;
pub mod time;
pub mod trust;
pub mod txlayer;
pub mod window;
pub mod withdrawal;

// Re-exports for convenience
pub use audit::{ActionKind, ActionLog, ActionRecord, AuditLogger, NoOpLogger, StdoutLogger};
pub use cache::{CacheEntry, VerdictCache};
pub use error::{Error, ErrorKind, Result};
pub use guardrail::{evaluate, prune_older_than, SpendDecision, SpendPolicy};
pub use identity::{Address, ADDRESS_BYTES};
pub use ledger::{
    Delegation, DelegationId, DelegationState, DrainReport, VaultLedger, DELEGATION_ID_PREFIX,
};
pub use time::{Clock, ManualClock, SystemClock};
pub use trust::{
    IdentityRecord, IdentityRegistry, ReputationRecord, ReputationRegistry, TrustPolicy,
    TrustResolver, TrustVerdict, ValidationRecord, ValidationRegistry,
};
pub use txlayer::{Confirmation, TransactionLayer, TxRef};
pub use window::SpendWindow;
pub use withdrawal::{
    RequestId, WithdrawalKind, WithdrawalRequest, WithdrawalStatus, WithdrawalWorkflow,
    WorkflowSnapshot, REQUEST_ID_PREFIX,
};

/// Native-currency and token amounts, in base units.
pub type Amount = u128;

/// Length of the rolling spend window in seconds (24 hours).
///
/// The window rolls lazily: the first send observed at or past
/// `window_start + SPEND_WINDOW_SECS` zeroes the spent counter and opens a
/// new window at that instant.
pub const SPEND_WINDOW_SECS: i64 = 86_400;
