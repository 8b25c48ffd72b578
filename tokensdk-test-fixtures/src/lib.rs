//! In-memory ledger platform for exercising the network adapter.
//!
//! [`InMemoryLedger`] implements every platform trait the adapter consumes.
//! Transactions are appended with [`InMemoryLedger::commit`]; their results
//! are [`JsonRwSet`] records, so the scanner and the vault decode them the
//! same way a real binding would decode its own wire format.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use once_cell::sync::OnceCell;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use tokensdk_network::driver::{
    Chaincode, ChaincodeRequest, ChannelVault, Committer, Delivery, Finality, Ledger,
    LocalMembershipProvider, Ordering, QueryResponse, RwSet, TransactionManager,
    TransactionStream,
};
use tokensdk_network::invocation::{
    ARE_TOKENS_SPENT_FUNCTION, QUERY_PUBLIC_PARAMS_FUNCTION, QUERY_TOKENS_FUNCTION,
};
use tokensdk_network::types::ProcessedTransaction;
use tokensdk_network::{
    Envelope, Identity, LedgerConnection, Network, NetworkConfig, NativeValidationCode,
    PlatformError, TokenId, TransientMap, TxId, TxStatusChangeListener, TxStatusListeners,
    ValidationCode, VaultStatus,
};

pub mod membership;
pub mod rwset;
pub mod tokens;

pub use membership::{audit_info_for, InMemoryMembership};
pub use rwset::{JsonRwSet, KvWrite};
pub use tokens::{CountingTokenVaultFactory, InMemoryTokenVault};

pub const TEST_NETWORK: &str = "default";
pub const TEST_CHANNEL: &str = "testchannel";
pub const TEST_NAMESPACE: &str = "zkat";

/// Length of nonces assigned by [`InMemoryLedger::compute_tx_id`].
pub const NONCE_LEN: usize = 24;

static TRACING: OnceCell<()> = OnceCell::new();

/// Install a test subscriber once per process.
///
/// Honours `RUST_LOG`, defaulting to debug output for the adapter.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tokensdk_network=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Canonical identifier derived from transaction inputs.
pub fn tx_id_digest(nonce: &[u8], creator: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator);
    hex::encode(hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// A single-partition ledger held in memory.
pub struct InMemoryLedger {
    transactions: Mutex<Vec<ProcessedTransaction>>,
    statuses: Mutex<HashMap<String, VaultStatus>>,
    envelopes: Mutex<HashMap<String, Vec<u8>>>,
    transients: Mutex<HashMap<String, TransientMap>>,
    broadcasts: Mutex<Vec<Envelope>>,

    delivery_delay: Duration,
    delivery_open: bool,
    delivered: Arc<AtomicUsize>,
    last_cancel: Mutex<Option<CancellationToken>>,

    public_params: Mutex<Vec<u8>>,
    ledger_tokens: Mutex<HashMap<TokenId, Vec<u8>>>,
    spent: Mutex<HashSet<String>>,
    non_bytes_responses: AtomicBool,
    fail_endorsement: AtomicBool,
    endorsements: Mutex<Vec<ChaincodeRequest>>,
    queries: Mutex<Vec<ChaincodeRequest>>,

    listeners: TxStatusListeners,
    commits: watch::Sender<u64>,

    token_vaults: Arc<CountingTokenVaultFactory>,
    membership: Arc<InMemoryMembership>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let (commits, _) = watch::channel(0);
        Self {
            transactions: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            envelopes: Mutex::new(HashMap::new()),
            transients: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(Vec::new()),
            delivery_delay: Duration::from_millis(10),
            delivery_open: false,
            delivered: Arc::new(AtomicUsize::new(0)),
            last_cancel: Mutex::new(None),
            public_params: Mutex::new(Vec::new()),
            ledger_tokens: Mutex::new(HashMap::new()),
            spent: Mutex::new(HashSet::new()),
            non_bytes_responses: AtomicBool::new(false),
            fail_endorsement: AtomicBool::new(false),
            endorsements: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            listeners: TxStatusListeners::new(),
            commits,
            token_vaults: Arc::new(CountingTokenVaultFactory::new()),
            membership: Arc::new(InMemoryMembership::new()),
        }
    }

    /// Time the delivery service takes to hand out each transaction.
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Keep delivery streams open after the last committed transaction,
    /// the way a live subscription waits for new blocks.
    pub fn with_open_delivery(mut self) -> Self {
        self.delivery_open = true;
        self
    }

    pub fn with_token_vaults(mut self, factory: CountingTokenVaultFactory) -> Self {
        self.token_vaults = Arc::new(factory);
        self
    }

    /// Bundle this ledger's services for the adapter.
    pub fn connection(self: &Arc<Self>) -> LedgerConnection {
        LedgerConnection {
            ledger: self.clone(),
            vault: self.clone(),
            token_vaults: self.token_vaults.clone(),
            delivery: self.clone(),
            chaincode: self.clone(),
            transactions: self.clone(),
            ordering: self.clone(),
            finality: self.clone(),
            committer: self.clone(),
            membership: self.membership.clone(),
        }
    }

    /// Adapter over this ledger with the test network and channel names.
    pub fn network(self: &Arc<Self>) -> Network {
        Network::new(NetworkConfig::new(TEST_NETWORK, TEST_CHANNEL), self.connection())
            .unwrap_or_else(|e| panic!("test network config rejected: {e}"))
    }

    pub fn token_vaults(&self) -> &Arc<CountingTokenVaultFactory> {
        &self.token_vaults
    }

    pub fn membership(&self) -> &Arc<InMemoryMembership> {
        &self.membership
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LEDGER CONTENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append a committed transaction and report its outcome to listeners.
    pub fn commit(&self, tx_id: &str, code: NativeValidationCode, rwset: &JsonRwSet) {
        self.transactions.lock().unwrap().push(ProcessedTransaction {
            tx_id: tx_id.to_string(),
            results: rwset.encode(),
            validation_code: code,
        });
        let status = if code.is_valid() {
            VaultStatus::Valid
        } else {
            VaultStatus::Invalid
        };
        self.statuses.lock().unwrap().insert(tx_id.to_string(), status);
        debug!(tx_id, %code, "committed");
        if let Err(err) = self.listeners.notify(tx_id, ValidationCode::from_native(code)) {
            warn!(tx_id, %err, "status notification dropped");
        }
        self.commits.send_modify(|n| *n += 1);
    }

    /// Record `tx_id` as known to the vault but not yet committed.
    pub fn mark_busy(&self, tx_id: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(tx_id.to_string(), VaultStatus::Busy);
    }

    pub fn set_public_params(&self, raw: &[u8]) {
        *self.public_params.lock().unwrap() = raw.to_vec();
    }

    /// Ledger representation returned by `queryTokens` for `id`.
    pub fn put_ledger_token(&self, id: TokenId, raw: &[u8]) {
        self.ledger_tokens.lock().unwrap().insert(id, raw.to_vec());
    }

    pub fn mark_spent(&self, id: &str) {
        self.spent.lock().unwrap().insert(id.to_string());
    }

    /// Answer queries with a string instead of raw bytes.
    pub fn respond_with_non_bytes(&self, enabled: bool) {
        self.non_bytes_responses.store(enabled, AtomicOrdering::SeqCst);
    }

    pub fn fail_endorsement(&self, enabled: bool) {
        self.fail_endorsement.store(enabled, AtomicOrdering::SeqCst);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transactions handed out by delivery streams so far.
    pub fn delivered(&self) -> usize {
        self.delivered.load(AtomicOrdering::SeqCst)
    }

    /// Cancellation token of the most recent delivery stream.
    pub fn last_cancel(&self) -> Option<CancellationToken> {
        self.last_cancel.lock().unwrap().clone()
    }

    pub fn endorsements(&self) -> Vec<ChaincodeRequest> {
        self.endorsements.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<ChaincodeRequest> {
        self.queries.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<Envelope> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn listener_count(&self, tx_id: &str) -> usize {
        self.listeners.listener_count(tx_id)
    }

    fn committed_code(&self, tx_id: &str) -> Option<NativeValidationCode> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.tx_id == tx_id)
            .map(|tx| tx.validation_code)
    }

    async fn wait_committed(&self, tx_id: &str) -> Result<(), PlatformError> {
        let mut commits = self.commits.subscribe();
        loop {
            if let Some(code) = self.committed_code(tx_id) {
                return if code.is_valid() {
                    Ok(())
                } else {
                    Err(PlatformError::Rejected(format!("transaction [{tx_id}] invalid with code {code}")))
                };
            }
            if commits.changed().await.is_err() {
                return Err(PlatformError::Unavailable("ledger closed".into()));
            }
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn transaction_by_id(&self, tx_id: &str) -> Result<ProcessedTransaction, PlatformError> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.tx_id == tx_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("transaction [{tx_id}]")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL VAULT
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl ChannelVault for InMemoryLedger {
    async fn status(&self, tx_id: &str) -> Result<VaultStatus, PlatformError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(tx_id)
            .copied()
            .unwrap_or(VaultStatus::Unknown))
    }

    async fn last_tx_id(&self) -> Result<String, PlatformError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .last()
            .map(|tx| tx.tx_id.clone())
            .unwrap_or_default())
    }

    async fn discard_tx(&self, tx_id: &str) -> Result<(), PlatformError> {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get(tx_id) {
            Some(VaultStatus::Valid) => Err(PlatformError::Rejected(format!(
                "transaction [{tx_id}] is already committed"
            ))),
            _ => {
                statuses.insert(tx_id.to_string(), VaultStatus::Invalid);
                Ok(())
            }
        }
    }

    async fn rwset(&self, _tx_id: &str, results: &[u8]) -> Result<Box<dyn RwSet>, PlatformError> {
        Ok(Box::new(JsonRwSet::from_bytes(results)?))
    }

    fn ephemeral_rwset(&self, results: &[u8]) -> Result<Box<dyn RwSet>, PlatformError> {
        Ok(Box::new(JsonRwSet::from_bytes(results)?))
    }

    async fn store_envelope(&self, tx_id: &str, envelope: &[u8]) -> Result<(), PlatformError> {
        self.envelopes
            .lock()
            .unwrap()
            .insert(tx_id.to_string(), envelope.to_vec());
        Ok(())
    }

    async fn envelope_exists(&self, tx_id: &str) -> bool {
        self.envelopes.lock().unwrap().contains_key(tx_id)
    }

    async fn store_transient(&self, tx_id: &str, transient: TransientMap) -> Result<(), PlatformError> {
        self.transients
            .lock()
            .unwrap()
            .insert(tx_id.to_string(), transient);
        Ok(())
    }

    async fn transient_exists(&self, tx_id: &str) -> bool {
        self.transients.lock().unwrap().contains_key(tx_id)
    }

    async fn load_transient(&self, tx_id: &str) -> Result<TransientMap, PlatformError> {
        self.transients
            .lock()
            .unwrap()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("transient of [{tx_id}]")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELIVERY
// ═══════════════════════════════════════════════════════════════════════════════

impl Delivery for InMemoryLedger {
    fn scan(&self, starting_tx_id: &str, cancel: CancellationToken) -> TransactionStream {
        let pending: VecDeque<ProcessedTransaction> = {
            let transactions = self.transactions.lock().unwrap();
            let start = transactions
                .iter()
                .position(|tx| tx.tx_id == starting_tx_id)
                .unwrap_or(0);
            transactions[start..].iter().cloned().collect()
        };
        *self.last_cancel.lock().unwrap() = Some(cancel.clone());

        let delay = self.delivery_delay;
        let open = self.delivery_open;
        let delivered = Arc::clone(&self.delivered);

        futures::stream::unfold((pending, cancel), move |(mut pending, cancel)| {
            let delivered = Arc::clone(&delivered);
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    _ = tokio::time::sleep(delay) => match pending.pop_front() {
                        Some(tx) => {
                            delivered.fetch_add(1, AtomicOrdering::SeqCst);
                            Some((Ok(tx), (pending, cancel)))
                        }
                        None if open => {
                            cancel.cancelled().await;
                            None
                        }
                        None => None,
                    },
                }
            }
        })
        .boxed()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAINCODE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl Chaincode for InMemoryLedger {
    async fn endorse(&self, request: ChaincodeRequest) -> Result<Envelope, PlatformError> {
        let tx_id = request.tx_id.clone().unwrap_or_default();
        self.endorsements.lock().unwrap().push(request.clone());
        if self.fail_endorsement.load(AtomicOrdering::SeqCst) {
            return Err(PlatformError::Endorsement(format!(
                "policy not satisfied for [{}]",
                request.function
            )));
        }
        Ok(Envelope(
            format!("{}:{}:{}", request.namespace, request.function, tx_id).into_bytes(),
        ))
    }

    async fn query(&self, request: ChaincodeRequest) -> Result<QueryResponse, PlatformError> {
        self.queries.lock().unwrap().push(request.clone());
        if self.non_bytes_responses.load(AtomicOrdering::SeqCst) {
            return Ok(Box::new(String::from("not raw bytes")));
        }

        let arg = request.args.first().map(Vec::as_slice).unwrap_or_default();
        let raw = match request.function.as_str() {
            QUERY_PUBLIC_PARAMS_FUNCTION => self.public_params.lock().unwrap().clone(),
            QUERY_TOKENS_FUNCTION => {
                let ids: Vec<TokenId> = serde_json::from_slice(arg)
                    .map_err(|e| PlatformError::Rejected(format!("bad token ids: {e}")))?;
                let tokens = self.ledger_tokens.lock().unwrap();
                let encoded = ids
                    .iter()
                    .map(|id| {
                        tokens
                            .get(id)
                            .map(|raw| STANDARD.encode(raw))
                            .ok_or_else(|| PlatformError::NotFound(format!("token {id}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_vec(&encoded).map_err(|e| PlatformError::Other(e.to_string()))?
            }
            ARE_TOKENS_SPENT_FUNCTION => {
                let ids: Vec<String> = serde_json::from_slice(arg)
                    .map_err(|e| PlatformError::Rejected(format!("bad token ids: {e}")))?;
                let spent = self.spent.lock().unwrap();
                let flags: Vec<bool> = ids.iter().map(|id| spent.contains(id)).collect();
                serde_json::to_vec(&flags).map_err(|e| PlatformError::Other(e.to_string()))?
            }
            other => return Err(PlatformError::Rejected(format!("unknown function [{other}]"))),
        };
        Ok(Box::new(raw))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS, ORDERING, FINALITY
// ═══════════════════════════════════════════════════════════════════════════════

impl TransactionManager for InMemoryLedger {
    fn compute_tx_id(&self, tx_id: &mut TxId) -> String {
        if tx_id.is_unassigned() {
            let mut nonce = vec![0u8; NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut nonce);
            tx_id.nonce = nonce;
            tx_id.creator = self.membership.default_identity().0;
        }
        tx_id_digest(&tx_id.nonce, &tx_id.creator)
    }

    fn new_envelope(&self) -> Envelope {
        Envelope::default()
    }
}

#[async_trait]
impl Ordering for InMemoryLedger {
    async fn broadcast(&self, envelope: &Envelope) -> Result<(), PlatformError> {
        self.broadcasts.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

#[async_trait]
impl Finality for InMemoryLedger {
    async fn is_final(&self, tx_id: &str) -> Result<(), PlatformError> {
        self.wait_committed(tx_id).await
    }

    async fn is_final_for_parties(&self, tx_id: &str, _parties: &[Identity]) -> Result<(), PlatformError> {
        self.wait_committed(tx_id).await
    }
}

impl Committer for InMemoryLedger {
    fn subscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: Arc<dyn TxStatusChangeListener>,
    ) -> Result<(), PlatformError> {
        self.listeners.subscribe(tx_id, listener);
        Ok(())
    }

    fn unsubscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: &Arc<dyn TxStatusChangeListener>,
    ) -> Result<(), PlatformError> {
        self.listeners.unsubscribe(tx_id, listener);
        Ok(())
    }
}

/// Listener that records every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<(String, ValidationCode)>>,
}

impl RecordingListener {
    pub fn seen(&self) -> Vec<(String, ValidationCode)> {
        self.seen.lock().unwrap().clone()
    }
}

impl TxStatusChangeListener for RecordingListener {
    fn on_status_change(&self, tx_id: &str, status: ValidationCode) {
        self.seen.lock().unwrap().push((tx_id.to_string(), status));
    }
}

/// Let spawned dispatcher tasks run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compute_tx_id_assigns_once() {
        let ledger = InMemoryLedger::new();
        let mut tx_id = TxId::default();
        let first = ledger.compute_tx_id(&mut tx_id);
        assert_eq!(tx_id.nonce.len(), NONCE_LEN);
        assert_eq!(tx_id.creator, membership::DEFAULT_IDENTITY.to_vec());

        let again = ledger.compute_tx_id(&mut tx_id);
        assert_eq!(first, again);
        assert_eq!(first, tx_id_digest(&tx_id.nonce, &tx_id.creator));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_starts_at_given_transaction() {
        let ledger = InMemoryLedger::new();
        for i in 0..3 {
            ledger.commit(&format!("tx{i}"), NativeValidationCode::VALID, &JsonRwSet::new());
        }

        let ids: Vec<String> = ledger
            .scan("tx1", CancellationToken::new())
            .map(|tx| tx.unwrap().tx_id)
            .collect()
            .await;
        assert_eq!(ids, vec!["tx1".to_string(), "tx2".to_string()]);
        assert_eq!(ledger.delivered(), 2);
    }
}
