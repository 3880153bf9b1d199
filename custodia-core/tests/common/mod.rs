//! Shared test doubles for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use custodia_core::{
    Address, Amount, Confirmation, Error, IdentityRecord, IdentityRegistry, ReputationRecord,
    ReputationRegistry, Result, TransactionLayer, TxRef, ValidationRecord, ValidationRegistry,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Build a deterministic address ending in `n`.
pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from_bytes(bytes)
}

/// One transfer the layer was asked to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCall {
    pub token: Option<Address>,
    pub to: Address,
    pub amount: Amount,
}

/// A transaction layer that records every call and can be told to fail
/// specific assets.
#[derive(Debug, Default)]
pub struct RecordingTxLayer {
    pub calls: Mutex<Vec<TransferCall>>,
    fail_native: Mutex<bool>,
    fail_tokens: Mutex<HashSet<Address>>,
    counter: AtomicU64,
}

impl RecordingTxLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_native(&self) {
        *self.fail_native.lock().unwrap() = true;
    }

    pub fn fail_token(&self, token: Address) {
        self.fail_tokens.lock().unwrap().insert(token);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_ref(&self) -> TxRef {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        TxRef::new(format!("0xtx{:04}", n))
    }
}

impl TransactionLayer for RecordingTxLayer {
    fn submit_transfer(&self, to: &Address, amount: Amount, _memo: Option<&str>) -> Result<TxRef> {
        if *self.fail_native.lock().unwrap() {
            return Err(Error::TransferFailed {
                reason: "native transfer rejected by node".to_string(),
            });
        }
        self.calls.lock().unwrap().push(TransferCall {
            token: None,
            to: *to,
            amount,
        });
        Ok(self.next_ref())
    }

    fn submit_token_transfer(&self, token: &Address, to: &Address, amount: Amount) -> Result<TxRef> {
        if self.fail_tokens.lock().unwrap().contains(token) {
            return Err(Error::TransferFailed {
                reason: format!("token {} transfer rejected by node", token),
            });
        }
        self.calls.lock().unwrap().push(TransferCall {
            token: Some(*token),
            to: *to,
            amount,
        });
        Ok(self.next_ref())
    }

    fn wait_for_confirmation(&self, _tx: &TxRef) -> Result<Confirmation> {
        Ok(Confirmation {
            success: true,
            block_ref: Some("0xblock".to_string()),
        })
    }
}

/// Identity registry returning a fixed record, counting calls.
#[derive(Debug)]
pub struct ScriptedIdentityRegistry {
    pub record: IdentityRecord,
    pub calls: AtomicUsize,
}

impl ScriptedIdentityRegistry {
    pub fn exists(token_ref: &str) -> Self {
        Self {
            record: IdentityRecord {
                exists: true,
                token_ref: Some(token_ref.to_string()),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            record: IdentityRecord::empty(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityRegistry for ScriptedIdentityRegistry {
    async fn identity(&self, _subject: &Address) -> Result<IdentityRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.record.clone())
    }
}

/// Reputation registry returning a fixed score, counting calls.
#[derive(Debug)]
pub struct ScriptedReputationRegistry {
    pub record: ReputationRecord,
    pub calls: AtomicUsize,
}

impl ScriptedReputationRegistry {
    pub fn with_score(score: u8) -> Self {
        Self {
            record: ReputationRecord {
                score,
                interactions: 42,
                last_updated: None,
            },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReputationRegistry for ScriptedReputationRegistry {
    async fn reputation(&self, _subject: &Address) -> Result<ReputationRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.record.clone())
    }
}

/// Validation registry returning fixed attestations, counting calls.
#[derive(Debug)]
pub struct ScriptedValidationRegistry {
    pub records: Vec<ValidationRecord>,
    pub calls: AtomicUsize,
}

impl ScriptedValidationRegistry {
    pub fn with_valid(kind: &str) -> Self {
        Self {
            records: vec![ValidationRecord {
                kind: kind.to_string(),
                valid: true,
                issued_by: None,
                issued_at: None,
            }],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn none() -> Self {
        Self {
            records: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ValidationRegistry for ScriptedValidationRegistry {
    async fn validations(&self, _subject: &Address) -> Result<Vec<ValidationRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

/// A registry that is deployed but unreachable.
#[derive(Debug, Default)]
pub struct UnreachableIdentityRegistry;

#[async_trait]
impl IdentityRegistry for UnreachableIdentityRegistry {
    async fn identity(&self, _subject: &Address) -> Result<IdentityRecord> {
        Err(Error::RegistryUnavailable {
            registry: "identity",
            reason: "connection refused".to_string(),
        })
    }
}
