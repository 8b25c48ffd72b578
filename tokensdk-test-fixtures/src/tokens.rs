//! In-memory token stores and a factory that counts what it builds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokensdk_network::driver::{TokenVault, TokenVaultFactory, UnspentTokensIterator};
use tokensdk_network::{PlatformError, TokenId, UnspentToken, UnspentTokens};

/// Token store of one `(channel, namespace)` pair.
#[derive(Debug, Default)]
pub struct InMemoryTokenVault {
    pub channel: String,
    pub namespace: String,
    tokens: Mutex<Vec<UnspentToken>>,
    certifications: Mutex<HashMap<TokenId, Vec<u8>>>,
}

impl InMemoryTokenVault {
    pub fn new(channel: &str, namespace: &str, tokens: Vec<UnspentToken>) -> Self {
        Self {
            channel: channel.to_string(),
            namespace: namespace.to_string(),
            tokens: Mutex::new(tokens),
            certifications: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_token(&self, token: UnspentToken) {
        self.tokens.lock().unwrap().push(token);
    }

    fn snapshot(&self) -> Vec<UnspentToken> {
        self.tokens.lock().unwrap().clone()
    }
}

impl TokenVault for InMemoryTokenVault {
    fn unspent_tokens_iterator(&self) -> Result<UnspentTokensIterator, PlatformError> {
        Ok(Box::new(self.snapshot().into_iter().map(Ok)))
    }

    /// `owner_id` is matched against the owner identity bytes read as UTF-8.
    fn unspent_tokens_iterator_by(
        &self,
        owner_id: &str,
        token_type: &str,
    ) -> Result<UnspentTokensIterator, PlatformError> {
        let owner_id = owner_id.to_string();
        let token_type = token_type.to_string();
        Ok(Box::new(
            self.snapshot()
                .into_iter()
                .filter(move |t| {
                    String::from_utf8_lossy(t.owner.as_bytes()) == owner_id && t.token_type == token_type
                })
                .map(Ok),
        ))
    }

    fn list_unspent_tokens(&self) -> Result<UnspentTokens, PlatformError> {
        Ok(UnspentTokens {
            tokens: self.snapshot(),
        })
    }

    fn certification_exists(&self, id: &TokenId) -> bool {
        self.certifications.lock().unwrap().contains_key(id)
    }

    fn store_certifications(&self, certifications: HashMap<TokenId, Vec<u8>>) -> Result<(), PlatformError> {
        self.certifications.lock().unwrap().extend(certifications);
        Ok(())
    }
}

/// Builds [`InMemoryTokenVault`]s seeded with the same tokens and counts
/// how many were built.
#[derive(Debug, Default)]
pub struct CountingTokenVaultFactory {
    seed: Vec<UnspentToken>,
    built: AtomicUsize,
    vaults: Mutex<Vec<Arc<InMemoryTokenVault>>>,
}

impl CountingTokenVaultFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: Vec<UnspentToken>) -> Self {
        Self {
            seed: tokens,
            ..Self::default()
        }
    }

    /// Number of vaults built so far.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Every vault built for `namespace`, in construction order.
    pub fn built_for(&self, namespace: &str) -> Vec<Arc<InMemoryTokenVault>> {
        self.vaults
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.namespace == namespace)
            .cloned()
            .collect()
    }
}

impl TokenVaultFactory for CountingTokenVaultFactory {
    fn new_token_vault(&self, channel: &str, namespace: &str) -> Arc<dyn TokenVault> {
        self.built.fetch_add(1, Ordering::SeqCst);
        let vault = Arc::new(InMemoryTokenVault::new(channel, namespace, self.seed.clone()));
        self.vaults.lock().unwrap().push(Arc::clone(&vault));
        vault
    }
}
