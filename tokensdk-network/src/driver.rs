//! Interfaces the adapter consumes from the underlying ledger platform.
//!
//! A platform binding implements these traits and hands them to the
//! adapter bundled in a [`LedgerConnection`]. Nothing above the adapter
//! sees these types.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::finality::TxStatusChangeListener;
use crate::membership::IdentityScheme;
use crate::types::{
    Envelope, Identity, ProcessedTransaction, TokenId, TransientMap, TxId, UnspentToken,
    UnspentTokens,
};
use crate::validation::VaultStatus;

/// Boxed response of a read-only chaincode query.
pub type QueryResponse = Box<dyn Any + Send>;

/// Lazily evaluated sequence of unspent tokens.
pub type UnspentTokensIterator = Box<dyn Iterator<Item = Result<UnspentToken, PlatformError>> + Send>;

/// Stream of committed transactions in ledger order.
pub type TransactionStream = BoxStream<'static, Result<ProcessedTransaction, PlatformError>>;

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER & VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Transaction index of the ledger partition.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fails with [`PlatformError::NotFound`] if the ledger has no such transaction.
    async fn transaction_by_id(&self, tx_id: &str) -> Result<ProcessedTransaction, PlatformError>;
}

/// Read-write set of a single transaction.
///
/// Writes within a namespace are exposed in ledger-assigned order.
pub trait RwSet: Send + Sync {
    /// Namespaces touched by the transaction.
    fn namespaces(&self) -> Vec<String>;

    fn num_writes(&self, namespace: &str) -> usize;

    /// The `index`-th write in `namespace` as `(key, value)`.
    fn write_at(&self, namespace: &str, index: usize) -> Result<(String, Vec<u8>), PlatformError>;

    fn get_state(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, PlatformError>;

    fn set_state(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), PlatformError>;

    /// Serialized form, suitable for [`ChannelVault::rwset`].
    fn to_bytes(&self) -> Result<Vec<u8>, PlatformError>;

    /// Release any resources held by the set.
    fn done(&mut self);
}

/// Local store bound to the ledger partition.
#[async_trait]
pub trait ChannelVault: Send + Sync {
    async fn status(&self, tx_id: &str) -> Result<VaultStatus, PlatformError>;

    async fn last_tx_id(&self) -> Result<String, PlatformError>;

    async fn discard_tx(&self, tx_id: &str) -> Result<(), PlatformError>;

    /// Open the read-write set of transaction `tx_id`, seeded with `results`.
    async fn rwset(&self, tx_id: &str, results: &[u8]) -> Result<Box<dyn RwSet>, PlatformError>;

    /// Decode a read-only read-write set from raw transaction results.
    fn ephemeral_rwset(&self, results: &[u8]) -> Result<Box<dyn RwSet>, PlatformError>;

    async fn store_envelope(&self, tx_id: &str, envelope: &[u8]) -> Result<(), PlatformError>;

    async fn envelope_exists(&self, tx_id: &str) -> bool;

    async fn store_transient(&self, tx_id: &str, transient: TransientMap) -> Result<(), PlatformError>;

    async fn transient_exists(&self, tx_id: &str) -> bool;

    async fn load_transient(&self, tx_id: &str) -> Result<TransientMap, PlatformError>;
}

/// Per-namespace token store. Implementations synchronize internally.
pub trait TokenVault: Send + Sync {
    fn unspent_tokens_iterator(&self) -> Result<UnspentTokensIterator, PlatformError>;

    fn unspent_tokens_iterator_by(
        &self,
        owner_id: &str,
        token_type: &str,
    ) -> Result<UnspentTokensIterator, PlatformError>;

    fn list_unspent_tokens(&self) -> Result<UnspentTokens, PlatformError>;

    fn certification_exists(&self, id: &TokenId) -> bool;

    fn store_certifications(&self, certifications: HashMap<TokenId, Vec<u8>>) -> Result<(), PlatformError>;
}

/// Builds the token store bound to `(channel, namespace)`.
pub trait TokenVaultFactory: Send + Sync {
    fn new_token_vault(&self, channel: &str, namespace: &str) -> Arc<dyn TokenVault>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELIVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Replay of committed transactions.
pub trait Delivery: Send + Sync {
    /// Stream transactions in commit order starting at `starting_tx_id`
    /// (from the beginning of the partition when empty).
    ///
    /// The implementation must stop pulling from the network as soon as
    /// `cancel` fires or the stream is dropped.
    fn scan(&self, starting_tx_id: &str, cancel: CancellationToken) -> TransactionStream;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAINCODE INVOCATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A request against an on-chain program function.
#[derive(Clone, Debug, Default)]
pub struct ChaincodeRequest {
    pub network: String,
    pub channel: String,
    pub namespace: String,
    pub function: String,
    pub args: Vec<Vec<u8>>,
    pub transient: TransientMap,
    pub signer: Option<Identity>,
    pub tx_id: Option<TxId>,
}

impl ChaincodeRequest {
    pub fn new(namespace: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            function: function.into(),
            ..Self::default()
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_args(mut self, args: Vec<Vec<u8>>) -> Self {
        self.args = args;
        self
    }

    pub fn with_signer(mut self, signer: Identity) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attach an off-ledger entry; it is never persisted in the write set.
    pub fn with_transient_entry(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.transient.insert(key.into(), value);
        self
    }

    pub fn with_tx_id(mut self, tx_id: TxId) -> Self {
        self.tx_id = Some(tx_id);
        self
    }
}

/// Endorse and query facility of the platform.
#[async_trait]
pub trait Chaincode: Send + Sync {
    /// Collect endorsements for a state-changing request.
    async fn endorse(&self, request: ChaincodeRequest) -> Result<Envelope, PlatformError>;

    /// Evaluate a read-only request. The response is boxed; the adapter
    /// expects raw bytes.
    async fn query(&self, request: ChaincodeRequest) -> Result<QueryResponse, PlatformError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS, ORDERING, FINALITY
// ═══════════════════════════════════════════════════════════════════════════════

pub trait TransactionManager: Send + Sync {
    /// Derive the canonical identifier of `tx_id`, assigning nonce and
    /// creator first when they are empty.
    fn compute_tx_id(&self, tx_id: &mut TxId) -> String;

    fn new_envelope(&self) -> Envelope;
}

#[async_trait]
pub trait Ordering: Send + Sync {
    async fn broadcast(&self, envelope: &Envelope) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait Finality: Send + Sync {
    /// Resolve once `tx_id` is final locally.
    async fn is_final(&self, tx_id: &str) -> Result<(), PlatformError>;

    /// Resolve once `tx_id` is final for every party in `parties`.
    async fn is_final_for_parties(&self, tx_id: &str, parties: &[Identity]) -> Result<(), PlatformError>;
}

pub trait Committer: Send + Sync {
    fn subscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: Arc<dyn TxStatusChangeListener>,
    ) -> Result<(), PlatformError>;

    fn unsubscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: &Arc<dyn TxStatusChangeListener>,
    ) -> Result<(), PlatformError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBERSHIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Options applied when materializing an identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityOptions {
    /// Embed the enrollment ID extension (anonymous credentials only).
    pub eid_extension: bool,
    /// Auxiliary audit-trail bytes to embed.
    pub audit_info: Option<Vec<u8>>,
}

/// Produces the identity bytes of a registered credential.
pub trait IdentityMaterializer: Send + Sync {
    /// Returns the identity and its audit info (empty when none).
    fn identity(&self, options: &IdentityOptions) -> Result<(Identity, Vec<u8>), PlatformError>;
}

/// A credential registered in the local membership directory.
#[derive(Clone)]
pub struct IdentityInfo {
    pub id: String,
    pub enrollment_id: String,
    pub materializer: Arc<dyn IdentityMaterializer>,
}

impl std::fmt::Debug for IdentityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityInfo")
            .field("id", &self.id)
            .field("enrollment_id", &self.enrollment_id)
            .finish()
    }
}

/// Local membership directory.
pub trait LocalMembershipProvider: Send + Sync {
    fn default_identity(&self) -> Identity;

    fn anonymous_identity(&self) -> Identity;

    fn is_me(&self, identity: &Identity) -> bool;

    fn identity_info_by_label(&self, scheme: IdentityScheme, label: &str) -> Option<IdentityInfo>;

    fn identity_info_by_identity(&self, scheme: IdentityScheme, identity: &Identity) -> Option<IdentityInfo>;

    fn register_idemix(&self, id: &str, path: &str, msp_id: &str) -> Result<(), PlatformError>;

    fn register_x509(&self, id: &str, path: &str, msp_id: &str) -> Result<(), PlatformError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONNECTION BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the adapter needs from a live ledger connection.
///
/// The connection's lifecycle belongs to the caller; the adapter only
/// borrows its services.
#[derive(Clone)]
pub struct LedgerConnection {
    pub ledger: Arc<dyn Ledger>,
    pub vault: Arc<dyn ChannelVault>,
    pub token_vaults: Arc<dyn TokenVaultFactory>,
    pub delivery: Arc<dyn Delivery>,
    pub chaincode: Arc<dyn Chaincode>,
    pub transactions: Arc<dyn TransactionManager>,
    pub ordering: Arc<dyn Ordering>,
    pub finality: Arc<dyn Finality>,
    pub committer: Arc<dyn Committer>,
    pub membership: Arc<dyn LocalMembershipProvider>,
}
