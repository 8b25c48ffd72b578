//! Per-namespace vaults and their cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::driver::{ChannelVault, TokenVault, TokenVaultFactory, UnspentTokensIterator};
use crate::error::{NetworkError, NetworkResult};
use crate::types::{TokenId, UnspentTokens};
use crate::validation::ValidationCode;

/// Vault handle bound to one namespace.
///
/// Combines the partition-wide channel vault (transaction status, discard)
/// with the namespace's token store (unspent tokens, certifications).
pub struct NetworkVault {
    namespace: String,
    channel_vault: Arc<dyn ChannelVault>,
    token_vault: Arc<dyn TokenVault>,
}

impl NetworkVault {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn status(&self, tx_id: &str) -> NetworkResult<ValidationCode> {
        let status = self
            .channel_vault
            .status(tx_id)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to get vault status of [{tx_id}]"), e))?;
        Ok(ValidationCode::from_vault_status(status))
    }

    pub async fn last_tx_id(&self) -> NetworkResult<String> {
        self.channel_vault
            .last_tx_id()
            .await
            .map_err(|e| NetworkError::platform("failed to get last transaction id", e))
    }

    /// Iterate over all unspent tokens.
    pub fn unspent_tokens_iterator(&self) -> NetworkResult<UnspentTokensIterator> {
        self.token_vault
            .unspent_tokens_iterator()
            .map_err(|e| NetworkError::platform("failed to iterate unspent tokens", e))
    }

    /// Iterate over unspent tokens owned by `owner_id` with type `token_type`.
    pub fn unspent_tokens_iterator_by(
        &self,
        owner_id: &str,
        token_type: &str,
    ) -> NetworkResult<UnspentTokensIterator> {
        self.token_vault
            .unspent_tokens_iterator_by(owner_id, token_type)
            .map_err(|e| {
                NetworkError::platform(
                    format!("failed to iterate unspent tokens of [{owner_id}:{token_type}]"),
                    e,
                )
            })
    }

    pub fn list_unspent_tokens(&self) -> NetworkResult<UnspentTokens> {
        self.token_vault
            .list_unspent_tokens()
            .map_err(|e| NetworkError::platform("failed to list unspent tokens", e))
    }

    pub fn certification_exists(&self, id: &TokenId) -> bool {
        self.token_vault.certification_exists(id)
    }

    pub fn store_certifications(&self, certifications: HashMap<TokenId, Vec<u8>>) -> NetworkResult<()> {
        self.token_vault
            .store_certifications(certifications)
            .map_err(|e| NetworkError::platform("failed to store certifications", e))
    }

    pub async fn discard_tx(&self, tx_id: &str) -> NetworkResult<()> {
        self.channel_vault
            .discard_tx(tx_id)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to discard [{tx_id}]"), e))
    }

    pub fn token_vault(&self) -> &Arc<dyn TokenVault> {
        &self.token_vault
    }
}

/// Lazily built, never evicted map from namespace to [`NetworkVault`].
///
/// Hits only take the shared lock. A miss takes the exclusive lock and
/// checks again before building, so each namespace is built exactly once.
pub struct VaultCache {
    channel: String,
    channel_vault: Arc<dyn ChannelVault>,
    factory: Arc<dyn TokenVaultFactory>,
    vaults: RwLock<HashMap<String, Arc<NetworkVault>>>,
}

impl VaultCache {
    pub fn new(
        channel: impl Into<String>,
        channel_vault: Arc<dyn ChannelVault>,
        factory: Arc<dyn TokenVaultFactory>,
    ) -> Self {
        Self {
            channel: channel.into(),
            channel_vault,
            factory,
            vaults: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, namespace: &str) -> Arc<NetworkVault> {
        if let Some(vault) = self.vaults.read().await.get(namespace) {
            return Arc::clone(vault);
        }

        let mut vaults = self.vaults.write().await;
        // A concurrent caller may have built it while we waited.
        if let Some(vault) = vaults.get(namespace) {
            return Arc::clone(vault);
        }

        debug!(channel = %self.channel, namespace, "building vault");
        let vault = Arc::new(NetworkVault {
            namespace: namespace.to_string(),
            channel_vault: Arc::clone(&self.channel_vault),
            token_vault: self.factory.new_token_vault(&self.channel, namespace),
        });
        vaults.insert(namespace.to_string(), Arc::clone(&vault));
        vault
    }

    /// Number of namespaces with a built vault.
    pub async fn len(&self) -> usize {
        self.vaults.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vaults.read().await.is_empty()
    }
}
