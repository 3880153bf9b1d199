//! Off-chain spend guardrails.
//!
//! For deployments with no on-chain vault, limits are enforced purely
//! client-side: the caller keeps a list of recent send timestamps and asks
//! [`evaluate`] before each payment. Evaluation is a pure function over the
//! policy, the timestamps, and the candidate send, so it is trivially
//! testable and carries no hidden state.
//!
//! Check order is fixed: deny list, allow list, hourly count, daily count,
//! absolute value cap, approval threshold. The recipient lists take
//! precedence over every cap — a deny-listed recipient is rejected even for
//! a zero-value send, and once an allow list is non-empty the posture is
//! default-deny.

use crate::identity::Address;
use crate::Amount;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Client-side spend limits.
///
/// Every field is optional; the default policy allows everything. A
/// non-empty `allowed_recipients` switches recipient checking to
/// default-deny.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpendPolicy {
    /// Maximum number of sends in any trailing hour. `None` = unlimited.
    pub max_sends_per_hour: Option<u32>,

    /// Maximum number of sends in any trailing 24 hours. `None` = unlimited.
    pub max_sends_per_day: Option<u32>,

    /// Absolute per-send value cap. `None` = uncapped.
    pub max_value: Option<Amount>,

    /// Sends above this value are allowed but flagged for human approval.
    /// `None` = never flag.
    pub approval_threshold: Option<Amount>,

    /// When non-empty, only these recipients may receive funds.
    pub allowed_recipients: HashSet<Address>,

    /// Recipients that are always rejected, regardless of the allow list.
    pub denied_recipients: HashSet<Address>,
}

/// Outcome of a guardrail evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendDecision {
    /// Whether the send may proceed at all.
    pub allowed: bool,
    /// Whether the send needs a human sign-off before proceeding.
    pub requires_approval: bool,
    /// Why the send was rejected or flagged. `None` for a clean pass.
    pub reason: Option<String>,
}

impl SpendDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            requires_approval: false,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_approval: false,
            reason: Some(reason.into()),
        }
    }

    fn flag(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            requires_approval: true,
            reason: Some(reason.into()),
        }
    }
}

/// Drop timestamps older than `window` from a caller-maintained send list.
///
/// Callers should prune before recording a new send so the list stays
/// bounded by the daily cap rather than growing forever.
pub fn prune_older_than(
    timestamps: &mut Vec<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) {
    timestamps.retain(|t| now.signed_duration_since(*t) < window);
}

fn count_within(recent: &[DateTime<Utc>], now: DateTime<Utc>, window: Duration) -> u32 {
    recent
        .iter()
        .filter(|t| {
            let age = now.signed_duration_since(**t);
            age >= Duration::zero() && age < window
        })
        .count() as u32
}

/// Evaluate a candidate send against the policy.
///
/// `recent_sends` is the caller's record of past send timestamps; entries
/// outside the relevant window are ignored, so callers may prune lazily.
pub fn evaluate(
    policy: &SpendPolicy,
    recent_sends: &[DateTime<Utc>],
    recipient: &Address,
    value: Amount,
    now: DateTime<Utc>,
) -> SpendDecision {
    if policy.denied_recipients.contains(recipient) {
        return SpendDecision::deny(format!("recipient {} is deny-listed", recipient));
    }

    if !policy.allowed_recipients.is_empty() && !policy.allowed_recipients.contains(recipient) {
        return SpendDecision::deny(format!(
            "recipient {} is not on the allow list",
            recipient
        ));
    }

    if let Some(cap) = policy.max_sends_per_hour {
        let sent = count_within(recent_sends, now, Duration::hours(1));
        if sent >= cap {
            return SpendDecision::deny(format!(
                "hourly send cap reached: {} of {} in the trailing hour",
                sent, cap
            ));
        }
    }

    if let Some(cap) = policy.max_sends_per_day {
        let sent = count_within(recent_sends, now, Duration::hours(24));
        if sent >= cap {
            return SpendDecision::deny(format!(
                "daily send cap reached: {} of {} in the trailing 24h",
                sent, cap
            ));
        }
    }

    if let Some(cap) = policy.max_value {
        if value > cap {
            return SpendDecision::deny(format!(
                "value {} exceeds absolute cap {}",
                value, cap
            ));
        }
    }

    if let Some(threshold) = policy.approval_threshold {
        if value > threshold {
            return SpendDecision::flag(format!(
                "value {} exceeds auto-approve threshold {}",
                value, threshold
            ));
        }
    }

    SpendDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from_bytes(bytes)
    }

    #[test]
    fn default_policy_allows_everything() {
        let decision = evaluate(&SpendPolicy::default(), &[], &addr(1), 1_000_000, Utc::now());
        assert_eq!(decision, SpendDecision::allow());
    }

    #[test]
    fn hourly_cap_counts_only_the_trailing_hour() {
        let policy = SpendPolicy {
            max_sends_per_hour: Some(2),
            ..Default::default()
        };
        let now = Utc::now();
        let recent = vec![
            now - Duration::minutes(10),
            now - Duration::minutes(50),
            now - Duration::minutes(90), // outside the hour
        ];

        let decision = evaluate(&policy, &recent, &addr(1), 1, now);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("hourly"));

        // With one inside the hour, the cap is not yet reached.
        let sparse = vec![now - Duration::minutes(50), now - Duration::minutes(90)];
        assert!(evaluate(&policy, &sparse, &addr(1), 1, now).allowed);
    }

    #[test]
    fn daily_cap_applies_after_hourly() {
        let policy = SpendPolicy {
            max_sends_per_hour: Some(10),
            max_sends_per_day: Some(3),
            ..Default::default()
        };
        let now = Utc::now();
        let recent = vec![
            now - Duration::hours(2),
            now - Duration::hours(5),
            now - Duration::hours(20),
        ];
        let decision = evaluate(&policy, &recent, &addr(1), 1, now);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("daily"));
    }

    #[test]
    fn value_cap_and_approval_threshold() {
        let policy = SpendPolicy {
            max_value: Some(1000),
            approval_threshold: Some(100),
            ..Default::default()
        };
        let now = Utc::now();

        assert!(!evaluate(&policy, &[], &addr(1), 1001, now).allowed);

        let flagged = evaluate(&policy, &[], &addr(1), 500, now);
        assert!(flagged.allowed);
        assert!(flagged.requires_approval);

        let clean = evaluate(&policy, &[], &addr(1), 100, now);
        assert!(clean.allowed);
        assert!(!clean.requires_approval);
    }

    #[test]
    fn deny_list_beats_allow_list() {
        let mut policy = SpendPolicy::default();
        policy.allowed_recipients.insert(addr(1));
        policy.denied_recipients.insert(addr(1));

        let decision = evaluate(&policy, &[], &addr(1), 1, Utc::now());
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("deny-listed"));
    }

    #[test]
    fn non_empty_allow_list_is_default_deny() {
        let mut policy = SpendPolicy::default();
        policy.allowed_recipients.insert(addr(1));

        assert!(evaluate(&policy, &[], &addr(1), 1, Utc::now()).allowed);
        assert!(!evaluate(&policy, &[], &addr(2), 1, Utc::now()).allowed);
    }

    #[test]
    fn prune_drops_stale_entries() {
        let now = Utc::now();
        let mut sends = vec![
            now - Duration::hours(30),
            now - Duration::hours(2),
            now - Duration::minutes(5),
        ];
        prune_older_than(&mut sends, now, Duration::hours(24));
        assert_eq!(sends.len(), 2);
    }
}
