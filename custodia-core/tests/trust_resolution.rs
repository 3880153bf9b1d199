//! Trust pipeline: verdict policy, degradation, and cache behavior.

mod common;

use chrono::{Duration, Utc};
use common::{
    addr, ScriptedIdentityRegistry, ScriptedReputationRegistry, ScriptedValidationRegistry,
    UnreachableIdentityRegistry,
};
use custodia_core::{ManualClock, TrustPolicy, TrustResolver};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A low score fails the minimum, the reason names both numbers, and a
/// repeat call inside the TTL is served from cache without a registry hit.
#[tokio::test]
async fn low_reputation_fails_and_caches() {
    let reputation = Arc::new(ScriptedReputationRegistry::with_score(30));
    let policy = TrustPolicy {
        min_reputation_score: Some(50),
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy).with_reputation_registry(reputation.clone());

    let subject = addr(5);
    let verdict = resolver.check_trust(&subject).await;
    assert!(!verdict.is_trusted);
    assert!(verdict
        .reasons
        .iter()
        .any(|r| r.contains("30") && r.contains("50")));
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 1);

    let cached = resolver.check_trust(&subject).await;
    assert_eq!(cached, verdict);
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 1);
}

/// All configured requirements are evaluated; a failing verdict lists
/// every failure, never just the first.
#[tokio::test]
async fn all_requirements_evaluated_without_short_circuit() {
    let policy = TrustPolicy {
        require_identity: true,
        min_reputation_score: Some(50),
        require_validations: true,
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy)
        .with_identity_registry(Arc::new(ScriptedIdentityRegistry::missing()))
        .with_reputation_registry(Arc::new(ScriptedReputationRegistry::with_score(10)))
        .with_validation_registry(Arc::new(ScriptedValidationRegistry::none()));

    let verdict = resolver.check_trust(&addr(5)).await;
    assert!(!verdict.is_trusted);
    assert_eq!(verdict.reasons.len(), 3);
    assert!(verdict.reasons[0].contains("identity"));
    assert!(verdict.reasons[1].contains("reputation"));
    assert!(verdict.reasons[2].contains("attestation"));
}

/// Passing requirements affirm themselves in the reason list.
#[tokio::test]
async fn fully_passing_subject() {
    let policy = TrustPolicy {
        require_identity: true,
        min_reputation_score: Some(50),
        require_validations: true,
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy)
        .with_identity_registry(Arc::new(ScriptedIdentityRegistry::exists("id-7")))
        .with_reputation_registry(Arc::new(ScriptedReputationRegistry::with_score(92)))
        .with_validation_registry(Arc::new(ScriptedValidationRegistry::with_valid("audit")));

    let verdict = resolver.check_trust(&addr(5)).await;
    assert!(verdict.is_trusted);
    assert_eq!(verdict.reasons.len(), 3);
    assert_eq!(verdict.identity.as_ref().unwrap().token_ref.as_deref(), Some("id-7"));
    assert_eq!(verdict.reputation.as_ref().unwrap().score, 92);
    assert_eq!(verdict.validations.as_ref().unwrap().len(), 1);
}

/// An unreachable registry degrades to the empty result instead of
/// erroring; with identity required, that reads as "not found".
#[tokio::test]
async fn unreachable_registry_degrades() {
    let policy = TrustPolicy {
        require_identity: true,
        ..Default::default()
    };
    let mut resolver =
        TrustResolver::new(policy).with_identity_registry(Arc::new(UnreachableIdentityRegistry));

    let verdict = resolver.check_trust(&addr(5)).await;
    assert!(!verdict.is_trusted);
    assert!(verdict.reasons[0].contains("identity required but not found"));
    assert_eq!(verdict.identity.as_ref().unwrap().exists, false);
}

/// The allow list short-circuits before any registry is consulted.
#[tokio::test]
async fn allow_list_skips_registry_calls() {
    let reputation = Arc::new(ScriptedReputationRegistry::with_score(0));
    let mut policy = TrustPolicy {
        min_reputation_score: Some(50),
        ..Default::default()
    };
    policy.allowed.insert(addr(5));
    let mut resolver = TrustResolver::new(policy).with_reputation_registry(reputation.clone());

    let verdict = resolver.check_trust(&addr(5)).await;
    assert!(verdict.is_trusted);
    assert_eq!(verdict.reasons, vec!["recipient explicitly allowed"]);
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 0);
}

/// Invalidation forces a fresh resolution.
#[tokio::test]
async fn invalidate_busts_the_cache() {
    let reputation = Arc::new(ScriptedReputationRegistry::with_score(80));
    let policy = TrustPolicy {
        min_reputation_score: Some(50),
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy).with_reputation_registry(reputation.clone());

    let subject = addr(5);
    resolver.check_trust(&subject).await;
    resolver.invalidate(&subject);
    resolver.check_trust(&subject).await;
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 2);
}

/// A verdict is never served past its TTL.
#[tokio::test]
async fn ttl_expiry_forces_refetch() {
    let reputation = Arc::new(ScriptedReputationRegistry::with_score(80));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let policy = TrustPolicy {
        min_reputation_score: Some(50),
        cache_ttl: Duration::minutes(5),
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy)
        .with_reputation_registry(reputation.clone())
        .with_clock(clock.clone());

    let subject = addr(5);
    resolver.check_trust(&subject).await;
    clock.advance(Duration::minutes(4));
    resolver.check_trust(&subject).await;
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::minutes(2));
    resolver.check_trust(&subject).await;
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 2);
}

/// Cache state survives a process restart via export/import.
#[tokio::test]
async fn cache_export_import() {
    let reputation = Arc::new(ScriptedReputationRegistry::with_score(80));
    let policy = TrustPolicy {
        min_reputation_score: Some(50),
        ..Default::default()
    };
    let mut resolver = TrustResolver::new(policy.clone()).with_reputation_registry(reputation.clone());
    let subject = addr(5);
    let verdict = resolver.check_trust(&subject).await;

    let exported = resolver.export_cache_state();
    assert_eq!(exported.len(), 1);
    let json = serde_json::to_string(&exported).unwrap();
    let parsed: Vec<custodia_core::CacheEntry> = serde_json::from_str(&json).unwrap();

    let mut restored = TrustResolver::new(policy).with_reputation_registry(reputation.clone());
    restored.import_cache_state(parsed);
    let served = restored.check_trust(&subject).await;
    assert_eq!(served, verdict);
    // Still only the original registry call.
    assert_eq!(reputation.calls.load(Ordering::SeqCst), 1);
}
