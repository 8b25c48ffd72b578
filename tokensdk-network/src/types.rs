//! Domain types exchanged between the token service and the adapter.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::validation::NativeValidationCode;

/// Logical storage area within a ledger partition.
pub type Namespace = String;

/// Off-ledger data attached to a proposal, keyed by entry name.
pub type TransientMap = BTreeMap<String, Vec<u8>>;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialized identity of a network participant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub Vec<u8>);

impl Identity {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Identity {
    fn from(raw: Vec<u8>) -> Self {
        Identity(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(&self.0))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Transaction identifier inputs.
///
/// A zero-valued `TxId` (empty nonce and creator) means "to be assigned":
/// the platform fills both fields the first time the identifier is computed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxId {
    pub nonce: Vec<u8>,
    pub creator: Vec<u8>,
}

impl TxId {
    pub fn new(nonce: Vec<u8>, creator: Vec<u8>) -> Self {
        Self { nonce, creator }
    }

    pub fn is_unassigned(&self) -> bool {
        self.nonce.is_empty() && self.creator.is_empty()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}]",
            STANDARD.encode(&self.nonce),
            STANDARD.encode(&self.creator)
        )
    }
}

/// Opaque, platform-specific transaction payload. Never inspected here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope(pub Vec<u8>);

impl Envelope {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A committed transaction as delivered by the ledger.
#[derive(Clone, Debug)]
pub struct ProcessedTransaction {
    /// Canonical transaction identifier.
    pub tx_id: String,
    /// Raw read-write set results, decoded by the channel vault.
    pub results: Vec<u8>,
    /// Ledger-native commit outcome.
    pub validation_code: NativeValidationCode,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

/// Token identifier: the transaction that created the output and its index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
    pub tx_id: String,
    pub index: u64,
}

impl TokenId {
    pub fn new(tx_id: impl Into<String>, index: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.tx_id, self.index)
    }
}

/// An unspent token output held in a vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentToken {
    pub id: TokenId,
    pub owner: Identity,
    pub token_type: String,
    /// Quantity in the token scheme's textual encoding (e.g. `0x0a`).
    pub quantity: String,
}

/// A listing of unspent tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTokens {
    pub tokens: Vec<UnspentToken>,
}

impl UnspentTokens {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
