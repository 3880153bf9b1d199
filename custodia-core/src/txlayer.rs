//! Outbound transaction boundary.
//!
//! The core never talks to a chain directly. Everything that broadcasts,
//! waits, or reads on-chain state lives behind [`TransactionLayer`], and the
//! core treats a failure there as a propagated error, never a retry target:
//! by the time the layer is invoked the ledger has already mutated, so a
//! blind retry would double-spend.

use crate::error::Result;
use crate::identity::Address;
use crate::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of waiting for a transaction to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Whether the transaction succeeded on-chain.
    pub success: bool,
    /// Block reference, when the layer can supply one.
    pub block_ref: Option<String>,
}

/// The external transaction layer the core submits transfers through.
///
/// Implementations wrap an actual blockchain client. The core calls these
/// synchronously from its own perspective; timeouts and cancellation are the
/// implementation's responsibility.
pub trait TransactionLayer: Send + Sync + fmt::Debug {
    /// Submit a native-currency transfer. Returns a reference to the
    /// submitted transaction.
    fn submit_transfer(
        &self,
        to: &Address,
        amount: Amount,
        memo: Option<&str>,
    ) -> Result<TxRef>;

    /// Submit a token transfer for the given token contract.
    fn submit_token_transfer(
        &self,
        token: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<TxRef>;

    /// Block until the referenced transaction is confirmed or fails.
    fn wait_for_confirmation(&self, tx: &TxRef) -> Result<Confirmation>;
}
