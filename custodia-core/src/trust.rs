//! Counterparty trust verification.
//!
//! Before an agent pays an unknown recipient, the resolver gathers three
//! independent kinds of facts about them — identity, reputation, and
//! attestations — and folds them into a single [`TrustVerdict`] with a
//! human-readable reason trail.
//!
//! ## Degradation, not propagation
//!
//! Registry failures never surface as errors from [`TrustResolver::check_trust`].
//! An unreachable registry yields a well-defined empty result; a network
//! with no registries deployed yields a *trusted* verdict whose reason
//! says so. Fail-open is unusual for an access-control surface and is a
//! deliberate product decision here: trust checking must not brick payment
//! flows. The reason strings keep the degraded basis visible to operators.
//!
//! ## Reason completeness
//!
//! All configured requirement checks are evaluated, never short-circuited,
//! so the caller always receives the complete list of passing and failing
//! reasons. "Why was this allowed" is always answerable.

use crate::cache::{CacheEntry, VerdictCache};
use crate::error::Result;
use crate::identity::Address;
use crate::time::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Identity facts for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Whether the subject has a registered identity.
    pub exists: bool,
    /// Registry-specific reference (e.g. an identity token id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ref: Option<String>,
}

impl IdentityRecord {
    /// The well-defined "no identity found" result.
    pub fn empty() -> Self {
        Self {
            exists: false,
            token_ref: None,
        }
    }
}

/// Reputation facts for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Score in 0..=100.
    pub score: u8,
    /// Total recorded interactions.
    pub interactions: u64,
    /// When the registry last updated this subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReputationRecord {
    /// The well-defined "no reputation" result.
    pub fn empty() -> Self {
        Self {
            score: 0,
            interactions: 0,
            last_updated: None,
        }
    }
}

/// One typed attestation about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Attestation type (e.g. "kyc", "audit", "partner").
    pub kind: String,
    /// Whether the attestation is currently valid.
    pub valid: bool,
    /// Who issued it, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

/// The outcome of trust verification for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustVerdict {
    /// Who was checked.
    pub subject: Address,
    /// The decision.
    pub is_trusted: bool,
    /// Identity facts, when registries were consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRecord>,
    /// Reputation facts, when registries were consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation: Option<ReputationRecord>,
    /// Attestations, when registries were consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations: Option<Vec<ValidationRecord>>,
    /// Ordered justifications. Never empty.
    pub reasons: Vec<String>,
}

// =============================================================================
// Registries
// =============================================================================

/// Read-only identity registry endpoint.
#[async_trait]
pub trait IdentityRegistry: Send + Sync + fmt::Debug {
    async fn identity(&self, subject: &Address) -> Result<IdentityRecord>;
}

/// Read-only reputation registry endpoint.
#[async_trait]
pub trait ReputationRegistry: Send + Sync + fmt::Debug {
    async fn reputation(&self, subject: &Address) -> Result<ReputationRecord>;
}

/// Read-only validation registry endpoint.
#[async_trait]
pub trait ValidationRegistry: Send + Sync + fmt::Debug {
    async fn validations(&self, subject: &Address) -> Result<Vec<ValidationRecord>>;
}

// =============================================================================
// Policy
// =============================================================================

/// Trust requirements and cache sizing.
///
/// An explicit struct, not an open map: every recognized option is
/// enumerable here, with its default documented.
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    /// Require a registered identity. Default: `false`.
    pub require_identity: bool,

    /// Require at least this reputation score. Default: `None` (no floor).
    pub min_reputation_score: Option<u8>,

    /// Require at least one currently valid attestation. Default: `false`.
    pub require_validations: bool,

    /// Subjects trusted unconditionally, skipping registry calls.
    /// Default: empty.
    pub allowed: HashSet<Address>,

    /// Verdict cache lifetime. Default: 5 minutes.
    pub cache_ttl: Duration,

    /// Verdict cache capacity. Default: 256 entries.
    pub cache_capacity: usize,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            require_identity: false,
            min_reputation_score: None,
            require_validations: false,
            allowed: HashSet::new(),
            cache_ttl: Duration::minutes(5),
            cache_capacity: 256,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves counterparty trust from up to three registries, with caching.
///
/// Each registry slot is optional; a slot left unset models "not deployed
/// on this network". With no registries at all, verification degrades to a
/// documented permissive fallback.
#[derive(Debug)]
pub struct TrustResolver {
    policy: TrustPolicy,
    identity: Option<Arc<dyn IdentityRegistry>>,
    reputation: Option<Arc<dyn ReputationRegistry>>,
    validation: Option<Arc<dyn ValidationRegistry>>,
    cache: VerdictCache,
    clock: Arc<dyn Clock>,
}

impl TrustResolver {
    /// Create a resolver with no registries configured.
    pub fn new(policy: TrustPolicy) -> Self {
        let cache = VerdictCache::new(policy.cache_ttl, policy.cache_capacity);
        Self {
            policy,
            identity: None,
            reputation: None,
            validation: None,
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_identity_registry(mut self, registry: Arc<dyn IdentityRegistry>) -> Self {
        self.identity = Some(registry);
        self
    }

    pub fn with_reputation_registry(mut self, registry: Arc<dyn ReputationRegistry>) -> Self {
        self.reputation = Some(registry);
        self
    }

    pub fn with_validation_registry(mut self, registry: Arc<dyn ValidationRegistry>) -> Self {
        self.validation = Some(registry);
        self
    }

    /// Substitute the clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Identity facts for `subject`, degraded to empty when the registry
    /// is absent or unreachable.
    pub async fn resolve_identity(&self, subject: &Address) -> IdentityRecord {
        match &self.identity {
            None => IdentityRecord::empty(),
            Some(registry) => match registry.identity(subject).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "identity registry degraded to empty result");
                    IdentityRecord::empty()
                }
            },
        }
    }

    /// Reputation facts for `subject`, degraded to zero when the registry
    /// is absent or unreachable.
    pub async fn resolve_reputation(&self, subject: &Address) -> ReputationRecord {
        match &self.reputation {
            None => ReputationRecord::empty(),
            Some(registry) => match registry.reputation(subject).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "reputation registry degraded to empty result");
                    ReputationRecord::empty()
                }
            },
        }
    }

    /// Attestations for `subject`, degraded to none when the registry is
    /// absent or unreachable.
    pub async fn resolve_validations(&self, subject: &Address) -> Vec<ValidationRecord> {
        match &self.validation {
            None => Vec::new(),
            Some(registry) => match registry.validations(subject).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "validation registry degraded to empty result");
                    Vec::new()
                }
            },
        }
    }

    /// Verify `subject` against the configured requirements.
    ///
    /// Consults the cache first; on a miss, fetches all three registries
    /// concurrently, evaluates every requirement, and caches the verdict.
    pub async fn check_trust(&mut self, subject: &Address) -> TrustVerdict {
        let now = self.clock.now();

        if self.policy.allowed.contains(subject) {
            return TrustVerdict {
                subject: *subject,
                is_trusted: true,
                identity: None,
                reputation: None,
                validations: None,
                reasons: vec!["recipient explicitly allowed".to_string()],
            };
        }

        if let Some(cached) = self.cache.get(subject, now) {
            return cached;
        }

        if self.identity.is_none() && self.reputation.is_none() && self.validation.is_none() {
            return TrustVerdict {
                subject: *subject,
                is_trusted: true,
                identity: None,
                reputation: None,
                validations: None,
                reasons: vec![
                    "trust verification unavailable on this network - trusting by default"
                        .to_string(),
                ],
            };
        }

        let (identity, reputation, validations) = tokio::join!(
            self.resolve_identity(subject),
            self.resolve_reputation(subject),
            self.resolve_validations(subject),
        );

        let mut is_trusted = true;
        let mut reasons = Vec::new();

        // Every configured requirement is evaluated; nothing short-circuits.
        if self.policy.require_identity {
            if identity.exists {
                reasons.push("identity verified".to_string());
            } else {
                is_trusted = false;
                reasons.push("identity required but not found".to_string());
            }
        }

        if let Some(min) = self.policy.min_reputation_score {
            if reputation.score >= min {
                reasons.push(format!(
                    "reputation score {} meets minimum {}",
                    reputation.score, min
                ));
            } else {
                is_trusted = false;
                reasons.push(format!(
                    "reputation score {} below required minimum {}",
                    reputation.score, min
                ));
            }
        }

        if self.policy.require_validations {
            let valid_count = validations.iter().filter(|v| v.valid).count();
            if valid_count > 0 {
                reasons.push(format!("{} valid attestation(s) present", valid_count));
            } else {
                is_trusted = false;
                reasons.push("attestation required but none valid".to_string());
            }
        }

        if reasons.is_empty() {
            reasons.push("no trust requirements configured".to_string());
        }

        let verdict = TrustVerdict {
            subject: *subject,
            is_trusted,
            identity: Some(identity),
            reputation: Some(reputation),
            validations: Some(validations),
            reasons,
        };

        self.cache.set(verdict.clone(), now);
        verdict
    }

    /// Drop one subject's cached verdict. Call after any action that could
    /// change the subject's trust facts.
    pub fn invalidate(&mut self, subject: &Address) {
        self.cache.invalidate(subject);
    }

    /// Drop all cached verdicts.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Snapshot the cache for persistence.
    pub fn export_cache_state(&self) -> Vec<CacheEntry> {
        self.cache.export_state()
    }

    /// Restore a previously exported cache snapshot.
    pub fn import_cache_state(&mut self, entries: Vec<CacheEntry>) {
        self.cache.import_state(entries);
    }
}
