//! The network adapter entry point.

use std::sync::Arc;

use tracing::debug;

use crate::config::NetworkConfig;
use crate::driver::{LedgerConnection, RwSet};
use crate::error::{NetworkError, NetworkResult};
use crate::membership::{enrollment_id_from_audit_info, LocalMembership};
use crate::types::{Envelope, TransientMap};
use crate::validation::LedgerView;
use crate::vault::{NetworkVault, VaultCache};

/// Adapter between the token service and one ledger partition.
///
/// All ledger-touching operations of the token service go through here.
/// Operations are split across modules: invocation, scanning and finality
/// live next to their supporting types.
pub struct Network {
    config: NetworkConfig,
    connection: LedgerConnection,
    ledger: LedgerView,
    vaults: VaultCache,
}

impl Network {
    pub fn new(config: NetworkConfig, connection: LedgerConnection) -> NetworkResult<Self> {
        config.validate()?;
        let ledger = LedgerView::new(Arc::clone(&connection.ledger));
        let vaults = VaultCache::new(
            config.channel.clone(),
            Arc::clone(&connection.vault),
            Arc::clone(&connection.token_vaults),
        );
        debug!(network = %config.network, channel = %config.channel, "network adapter ready");
        Ok(Self {
            config,
            connection,
            ledger,
            vaults,
        })
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.config.network
    }

    /// Ledger partition name.
    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    pub(crate) fn connection(&self) -> &LedgerConnection {
        &self.connection
    }

    /// The vault of `namespace`, built on first use.
    pub async fn vault(&self, namespace: &str) -> Arc<NetworkVault> {
        self.vaults.get(namespace).await
    }

    pub fn vault_cache(&self) -> &VaultCache {
        &self.vaults
    }

    pub fn ledger(&self) -> &LedgerView {
        &self.ledger
    }

    pub fn local_membership(&self) -> LocalMembership {
        LocalMembership::new(Arc::clone(&self.connection.membership))
    }

    /// Enrollment ID carried by anonymous-credential audit info.
    pub fn enrollment_id(&self, audit_info: &[u8]) -> NetworkResult<String> {
        enrollment_id_from_audit_info(audit_info)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // PASSTHROUGHS
    // ═══════════════════════════════════════════════════════════════════════════════

    pub async fn rwset(&self, tx_id: &str, results: &[u8]) -> NetworkResult<Box<dyn RwSet>> {
        self.connection
            .vault
            .rwset(tx_id, results)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to get rwset of [{tx_id}]"), e))
    }

    pub async fn store_envelope(&self, tx_id: &str, envelope: &[u8]) -> NetworkResult<()> {
        self.connection
            .vault
            .store_envelope(tx_id, envelope)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to store envelope of [{tx_id}]"), e))
    }

    pub async fn envelope_exists(&self, tx_id: &str) -> bool {
        self.connection.vault.envelope_exists(tx_id).await
    }

    pub fn new_envelope(&self) -> Envelope {
        self.connection.transactions.new_envelope()
    }

    pub async fn broadcast(&self, envelope: &Envelope) -> NetworkResult<()> {
        self.connection
            .ordering
            .broadcast(envelope)
            .await
            .map_err(|e| NetworkError::platform("failed to broadcast envelope", e))
    }

    pub async fn store_transient(&self, tx_id: &str, transient: TransientMap) -> NetworkResult<()> {
        self.connection
            .vault
            .store_transient(tx_id, transient)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to store transient of [{tx_id}]"), e))
    }

    pub async fn transient_exists(&self, tx_id: &str) -> bool {
        self.connection.vault.transient_exists(tx_id).await
    }

    pub async fn transient(&self, tx_id: &str) -> NetworkResult<TransientMap> {
        self.connection
            .vault
            .load_transient(tx_id)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to load transient of [{tx_id}]"), e))
    }
}
