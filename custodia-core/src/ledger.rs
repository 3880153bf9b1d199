//! The vault ledger: per-delegation balances, limits, and the killswitch.
//!
//! A *delegation* is the custody relationship between one owner and one
//! agent. The agent can spend inside the configured limits; the owner can
//! always withdraw, pause, revoke, or drain, with no limit applied. That
//! asymmetry is the whole point: the guardrails bind the agent, never the
//! owner.
//!
//! ## States
//!
//! ```text
//!              pause()                    revoke_agent()
//!    Active ◀─────────▶ Paused ──────────────▶ Revoked (terminal)
//!       │    unpause()                            ▲
//!       └─────────────────────────────────────────┘
//! ```
//!
//! Revoked means the agent slot holds the null identity and the delegation
//! is force-paused. There is no un-revoke; the record persists with
//! whatever balance remains as an auditable trail, and a new delegation
//! must be created to re-engage an agent.
//!
//! ## Serialization
//!
//! On-chain this logic is linearized by the contract environment. This
//! off-chain port serializes per delegation: each record lives behind its
//! own mutex, held across the full read-check-mutate-transfer sequence, so
//! `agent_send` and `owner_withdraw` on the same delegation never
//! interleave while distinct delegations proceed concurrently. A rejected
//! operation therefore always observes post-mutation state.
//!
//! Lock order, where both are needed: agent index before delegation entry.

use crate::error::{Error, Result};
use crate::identity::Address;
use crate::time::{Clock, SystemClock};
use crate::txlayer::{TransactionLayer, TxRef};
use crate::window::SpendWindow;
use crate::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The required prefix for all delegation IDs.
pub const DELEGATION_ID_PREFIX: &str = "cus_dlg_";

/// A unique, stable identifier for a delegation.
///
/// Uses UUIDv7 (time-ordered), so IDs sort by creation time in audit
/// trails. IDs are assigned at creation and never reused.
///
/// **Validation**: IDs must start with `cus_dlg_`. This is enforced during
/// both construction (`from_string`) and deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DelegationId(String);

impl<'de> Deserialize<'de> for DelegationId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !s.starts_with(DELEGATION_ID_PREFIX) {
            return Err(serde::de::Error::custom(format!(
                "delegation ID must start with '{}'",
                DELEGATION_ID_PREFIX
            )));
        }
        Ok(DelegationId(s))
    }
}

impl DelegationId {
    /// Generate a new time-ordered delegation ID.
    pub fn new() -> Self {
        Self(format!("{}{}", DELEGATION_ID_PREFIX, Uuid::now_v7().simple()))
    }

    /// Create a delegation ID from a string.
    pub fn from_string(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !s.starts_with(DELEGATION_ID_PREFIX) {
            return Err(Error::InvalidId {
                input: s,
                reason: format!("delegation ID must start with '{}'", DELEGATION_ID_PREFIX),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DelegationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a delegation, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Active,
    Paused,
    Revoked,
}

/// One owner→agent custody record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: DelegationId,
    /// Fixed at creation. There is deliberately no setter: owner rotation
    /// would reopen ownership-hijack risk and must stay a non-feature.
    pub owner: Address,
    /// Null once revoked.
    pub agent: Address,
    pub paused: bool,
    pub balance: Amount,
    /// Per-token balances, independent of the native balance.
    pub token_balances: BTreeMap<Address, Amount>,
    pub daily_limit: Amount,
    pub per_tx_limit: Amount,
    pub window: SpendWindow,
    pub whitelist_enabled: bool,
    pub whitelist: BTreeSet<Address>,
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Current lifecycle state.
    pub fn state(&self) -> DelegationState {
        if self.agent.is_null() {
            DelegationState::Revoked
        } else if self.paused {
            DelegationState::Paused
        } else {
            DelegationState::Active
        }
    }
}

/// A successfully drained native balance.
#[derive(Debug, Clone)]
pub struct DrainedBalance {
    pub amount: Amount,
    pub tx_ref: TxRef,
}

/// A successfully drained token balance.
#[derive(Debug, Clone)]
pub struct DrainedToken {
    pub token: Address,
    pub amount: Amount,
    pub tx_ref: TxRef,
}

/// One asset that failed to drain. The balance is left in place so the
/// owner can retry.
#[derive(Debug, Clone)]
pub struct DrainFailure {
    pub asset: String,
    pub reason: String,
}

/// Outcome of an emergency drain. Failures are collected, never fatal:
/// one token's transfer failing must not block the native balance or the
/// other tokens.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub native: Option<DrainedBalance>,
    pub tokens: Vec<DrainedToken>,
    pub failures: Vec<DrainFailure>,
}

/// The authoritative balance/limit/whitelist record for all delegations.
#[derive(Debug)]
pub struct VaultLedger {
    delegations: RwLock<HashMap<DelegationId, Arc<Mutex<Delegation>>>>,
    /// Active delegation per agent identity; at most one.
    agent_index: Mutex<HashMap<Address, DelegationId>>,
    tx: Arc<dyn TransactionLayer>,
    clock: Arc<dyn Clock>,
}

impl VaultLedger {
    /// Create an empty ledger submitting transfers through `tx`.
    pub fn new(tx: Arc<dyn TransactionLayer>) -> Self {
        Self::with_clock(tx, Arc::new(SystemClock))
    }

    /// Create a ledger with an explicit clock (tests).
    pub fn with_clock(tx: Arc<dyn TransactionLayer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            delegations: RwLock::new(HashMap::new()),
            agent_index: Mutex::new(HashMap::new()),
            tx,
            clock,
        }
    }

    /// Create a delegation in `Active` state, optionally funded.
    ///
    /// Fails if the agent is null, already holds an active delegation, or
    /// the limits are inverted.
    pub fn create(
        &self,
        owner: &Address,
        agent: &Address,
        daily_limit: Amount,
        per_tx_limit: Amount,
        initial_funding: Amount,
    ) -> Result<DelegationId> {
        if agent.is_null() {
            return Err(Error::NullAgent);
        }
        if per_tx_limit > daily_limit {
            return Err(Error::LimitsInverted {
                per_tx: per_tx_limit,
                daily: daily_limit,
            });
        }

        let mut index = self.agent_index.lock().unwrap();
        if let Some(existing) = index.get(agent) {
            return Err(Error::AgentAlreadyDelegated {
                agent: *agent,
                existing: existing.clone(),
            });
        }

        let now = self.clock.now();
        let id = DelegationId::new();
        let delegation = Delegation {
            id: id.clone(),
            owner: *owner,
            agent: *agent,
            paused: false,
            balance: initial_funding,
            token_balances: BTreeMap::new(),
            daily_limit,
            per_tx_limit,
            window: SpendWindow::starting_at(now),
            whitelist_enabled: false,
            whitelist: BTreeSet::new(),
            created_at: now,
        };

        self.delegations
            .write()
            .unwrap()
            .insert(id.clone(), Arc::new(Mutex::new(delegation)));
        index.insert(*agent, id.clone());

        info!(delegation = %id, owner = %owner, agent = %agent, "delegation created");
        Ok(id)
    }

    fn handle(&self, id: &DelegationId) -> Result<Arc<Mutex<Delegation>>> {
        self.delegations
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DelegationNotFound {
                delegation: id.clone(),
            })
    }

    fn ensure_owner(delegation: &Delegation, caller: &Address) -> Result<()> {
        if *caller != delegation.owner {
            return Err(Error::NotOwner {
                delegation: delegation.id.clone(),
                caller: *caller,
            });
        }
        Ok(())
    }

    /// Deposit native currency. Deposits are never limited, even while
    /// paused or revoked.
    pub fn deposit(&self, id: &DelegationId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        delegation.balance = delegation.balance.saturating_add(amount);
        debug!(delegation = %id, amount = %amount, "native deposit");
        Ok(())
    }

    /// Deposit a token. Same unconditional semantics as [`Self::deposit`].
    pub fn deposit_token(&self, id: &DelegationId, token: &Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        let balance = delegation.token_balances.entry(*token).or_insert(0);
        *balance = balance.saturating_add(amount);
        debug!(delegation = %id, token = %token, amount = %amount, "token deposit");
        Ok(())
    }

    /// Agent-initiated send, checked against every guardrail.
    ///
    /// Checks run in a fixed order so the reported reason is
    /// deterministic: caller, pause state, window roll, whitelist, per-tx
    /// cap, daily cap, balance. Ledger state mutates *before* the outbound
    /// transfer is attempted; a transfer-layer failure propagates but is
    /// not retried here.
    pub fn agent_send(
        &self,
        id: &DelegationId,
        caller: &Address,
        to: &Address,
        amount: Amount,
        memo: Option<&str>,
    ) -> Result<TxRef> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();

        if delegation.agent.is_null() || *caller != delegation.agent {
            return Err(Error::NotAgent {
                delegation: id.clone(),
                caller: *caller,
            });
        }
        if delegation.paused {
            return Err(Error::DelegationPaused {
                delegation: id.clone(),
            });
        }

        let now = self.clock.now();
        if delegation.window.roll_if_elapsed(now) {
            debug!(delegation = %id, "spend window rolled");
        }

        if delegation.whitelist_enabled && !delegation.whitelist.contains(to) {
            return Err(Error::WhitelistViolation {
                delegation: id.clone(),
                recipient: *to,
            });
        }
        if amount > delegation.per_tx_limit {
            return Err(Error::PerTxLimitExceeded {
                amount,
                limit: delegation.per_tx_limit,
            });
        }
        if delegation.window.would_exceed(amount, delegation.daily_limit) {
            return Err(Error::DailyLimitExceeded {
                requested: amount,
                spent_today: delegation.window.spent_today,
                limit: delegation.daily_limit,
            });
        }
        if amount > delegation.balance {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: delegation.balance,
            });
        }

        delegation.balance -= amount;
        delegation.window.record(amount);

        let tx_ref = self.tx.submit_transfer(to, amount, memo)?;
        info!(
            delegation = %id,
            agent = %caller,
            recipient = %to,
            amount = %amount,
            tx = %tx_ref,
            "agent send accepted"
        );
        Ok(tx_ref)
    }

    /// Owner withdrawal. Unconstrained by limits, whitelist, or pause
    /// state — it succeeds whenever the balance suffices.
    pub fn owner_withdraw(
        &self,
        id: &DelegationId,
        caller: &Address,
        amount: Amount,
    ) -> Result<TxRef> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        if amount > delegation.balance {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: delegation.balance,
            });
        }
        delegation.balance -= amount;

        let owner = delegation.owner;
        let tx_ref = self.tx.submit_transfer(&owner, amount, None)?;
        info!(delegation = %id, amount = %amount, tx = %tx_ref, "owner withdrawal");
        Ok(tx_ref)
    }

    /// Withdraw the entire native balance to the owner.
    pub fn owner_withdraw_all(&self, id: &DelegationId, caller: &Address) -> Result<(Amount, TxRef)> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        let amount = delegation.balance;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        delegation.balance = 0;

        let owner = delegation.owner;
        let tx_ref = self.tx.submit_transfer(&owner, amount, None)?;
        info!(delegation = %id, amount = %amount, tx = %tx_ref, "owner withdrew all");
        Ok((amount, tx_ref))
    }

    /// Withdraw a token balance to the owner. Same unconstrained
    /// semantics as [`Self::owner_withdraw`].
    pub fn owner_withdraw_token(
        &self,
        id: &DelegationId,
        caller: &Address,
        token: &Address,
        amount: Amount,
    ) -> Result<TxRef> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        let available = delegation.token_balances.get(token).copied().unwrap_or(0);
        if amount > available {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        delegation.token_balances.insert(*token, available - amount);

        let owner = delegation.owner;
        let tx_ref = self.tx.submit_token_transfer(token, &owner, amount)?;
        info!(delegation = %id, token = %token, amount = %amount, tx = %tx_ref, "owner token withdrawal");
        Ok(tx_ref)
    }

    /// Pause agent sends. Idempotent: pausing an already-paused
    /// delegation is a no-op success.
    pub fn pause(&self, id: &DelegationId, caller: &Address) -> Result<()> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;
        if !delegation.paused {
            delegation.paused = true;
            info!(delegation = %id, "paused");
        }
        Ok(())
    }

    /// Resume agent sends. Fails on a revoked delegation: revocation is
    /// terminal.
    pub fn unpause(&self, id: &DelegationId, caller: &Address) -> Result<()> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;
        if delegation.agent.is_null() {
            return Err(Error::DelegationRevoked {
                delegation: id.clone(),
            });
        }
        if delegation.paused {
            delegation.paused = false;
            info!(delegation = %id, "unpaused");
        }
        Ok(())
    }

    /// Clear the agent slot and force-pause. Terminal for this
    /// delegation; the agent identity itself may be delegated again via a
    /// new `create`. Idempotent on an already-revoked delegation.
    pub fn revoke_agent(&self, id: &DelegationId, caller: &Address) -> Result<()> {
        let handle = self.handle(id)?;
        let mut index = self.agent_index.lock().unwrap();
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        if delegation.agent.is_null() {
            return Ok(());
        }
        index.remove(&delegation.agent);
        let revoked = delegation.agent;
        delegation.agent = Address::null();
        delegation.paused = true;
        info!(delegation = %id, agent = %revoked, "agent revoked");
        Ok(())
    }

    /// Force-pause and transfer the entire native balance plus each
    /// listed token balance to the owner.
    ///
    /// Continue-on-error: a failed asset keeps its balance (so the drain
    /// can be retried) and is reported in `failures`; the remaining
    /// assets still drain.
    pub fn emergency_drain(
        &self,
        id: &DelegationId,
        caller: &Address,
        tokens: &[Address],
    ) -> Result<DrainReport> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        delegation.paused = true;
        let owner = delegation.owner;
        let mut report = DrainReport::default();

        let native = delegation.balance;
        if native > 0 {
            delegation.balance = 0;
            match self.tx.submit_transfer(&owner, native, Some("emergency drain")) {
                Ok(tx_ref) => {
                    report.native = Some(DrainedBalance {
                        amount: native,
                        tx_ref,
                    });
                }
                Err(e) => {
                    delegation.balance = native;
                    warn!(delegation = %id, error = %e, "native drain failed");
                    report.failures.push(DrainFailure {
                        asset: "native".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for token in tokens {
            let amount = delegation.token_balances.get(token).copied().unwrap_or(0);
            if amount == 0 {
                continue;
            }
            delegation.token_balances.insert(*token, 0);
            match self.tx.submit_token_transfer(token, &owner, amount) {
                Ok(tx_ref) => {
                    report.tokens.push(DrainedToken {
                        token: *token,
                        amount,
                        tx_ref,
                    });
                }
                Err(e) => {
                    delegation.token_balances.insert(*token, amount);
                    warn!(delegation = %id, token = %token, error = %e, "token drain failed");
                    report.failures.push(DrainFailure {
                        asset: token.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            delegation = %id,
            failures = report.failures.len(),
            "emergency drain completed"
        );
        Ok(report)
    }

    /// Replace the agent identity. The new agent must not be null, and
    /// must not already hold an active delegation. Fails on a revoked
    /// delegation.
    pub fn set_agent(&self, id: &DelegationId, caller: &Address, new_agent: &Address) -> Result<()> {
        if new_agent.is_null() {
            return Err(Error::NullAgent);
        }
        let handle = self.handle(id)?;
        let mut index = self.agent_index.lock().unwrap();
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;

        if delegation.agent.is_null() {
            return Err(Error::DelegationRevoked {
                delegation: id.clone(),
            });
        }
        if *new_agent == delegation.agent {
            return Ok(());
        }
        if let Some(existing) = index.get(new_agent) {
            return Err(Error::AgentAlreadyDelegated {
                agent: *new_agent,
                existing: existing.clone(),
            });
        }

        index.remove(&delegation.agent);
        index.insert(*new_agent, id.clone());
        let previous = delegation.agent;
        delegation.agent = *new_agent;
        info!(delegation = %id, previous = %previous, agent = %new_agent, "agent replaced");
        Ok(())
    }

    /// Update both limits, re-validating `per_tx <= daily`.
    pub fn set_limits(
        &self,
        id: &DelegationId,
        caller: &Address,
        daily_limit: Amount,
        per_tx_limit: Amount,
    ) -> Result<()> {
        if per_tx_limit > daily_limit {
            return Err(Error::LimitsInverted {
                per_tx: per_tx_limit,
                daily: daily_limit,
            });
        }
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;
        delegation.daily_limit = daily_limit;
        delegation.per_tx_limit = per_tx_limit;
        info!(delegation = %id, daily = %daily_limit, per_tx = %per_tx_limit, "limits updated");
        Ok(())
    }

    /// Toggle whitelist enforcement.
    pub fn set_whitelist_enabled(
        &self,
        id: &DelegationId,
        caller: &Address,
        enabled: bool,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;
        delegation.whitelist_enabled = enabled;
        info!(delegation = %id, enabled, "whitelist toggled");
        Ok(())
    }

    /// Add or remove a recipient from the whitelist.
    pub fn set_whitelisted(
        &self,
        id: &DelegationId,
        caller: &Address,
        recipient: &Address,
        allowed: bool,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        let mut delegation = handle.lock().unwrap();
        Self::ensure_owner(&delegation, caller)?;
        if allowed {
            delegation.whitelist.insert(*recipient);
        } else {
            delegation.whitelist.remove(recipient);
        }
        debug!(delegation = %id, recipient = %recipient, allowed, "whitelist entry updated");
        Ok(())
    }

    /// Snapshot of one delegation's current record.
    pub fn delegation(&self, id: &DelegationId) -> Result<Delegation> {
        let handle = self.handle(id)?;
        let delegation = handle.lock().unwrap();
        Ok(delegation.clone())
    }

    /// Current lifecycle state.
    pub fn state(&self, id: &DelegationId) -> Result<DelegationState> {
        Ok(self.delegation(id)?.state())
    }

    /// Daily allowance left as of now. Read-only: an elapsed window
    /// reports the full limit without rolling it.
    pub fn remaining_today(&self, id: &DelegationId) -> Result<Amount> {
        let handle = self.handle(id)?;
        let delegation = handle.lock().unwrap();
        Ok(delegation
            .window
            .remaining(delegation.daily_limit, self.clock.now()))
    }

    /// Balance held for one token.
    pub fn token_balance(&self, id: &DelegationId, token: &Address) -> Result<Amount> {
        let handle = self.handle(id)?;
        let delegation = handle.lock().unwrap();
        Ok(delegation.token_balances.get(token).copied().unwrap_or(0))
    }

    /// The active delegation for an agent identity, if any.
    pub fn delegation_for_agent(&self, agent: &Address) -> Option<DelegationId> {
        self.agent_index.lock().unwrap().get(agent).cloned()
    }
}
