//! Bounded scan of the transaction history for a transfer metadata key.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

use crate::driver::ChannelVault;
use crate::error::{NetworkError, NetworkResult};
use crate::keys::transfer_action_metadata_key;
use crate::network::Network;
use crate::types::ProcessedTransaction;

/// Deadline used when `now + timeout` does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl Network {
    /// Replay the ledger from `starting_tx_id` until a transaction writes
    /// the transfer metadata key derived from `key` in `namespace`, and
    /// return the written value.
    ///
    /// Fails with [`NetworkError::Timeout`] once `timeout` has elapsed
    /// since the scan started. The delivery subscription is cancelled on
    /// every exit path, so nothing keeps pulling transactions afterwards.
    pub async fn lookup_transfer_metadata_key(
        &self,
        namespace: &str,
        starting_tx_id: &str,
        key: &str,
        timeout: Duration,
    ) -> NetworkResult<Vec<u8>> {
        let metadata_key = transfer_action_metadata_key(key).map_err(|e| {
            NetworkError::InvalidKey(format!(
                "failed to generate transfer action metadata key from [{key}]: {e}"
            ))
        })?;

        let deadline = deadline_after(timeout);
        let cancel = CancellationToken::new();
        let _stop_delivery = cancel.clone().drop_guard();

        let vault = &self.connection().vault;
        let mut transactions = self.connection().delivery.scan(starting_tx_id, cancel.clone());

        loop {
            let next = match tokio::time::timeout_at(deadline, transactions.next()).await {
                Ok(next) => next,
                Err(_) => {
                    cancel.cancel();
                    debug!(key = %metadata_key.escape_debug(), ?timeout, "scan deadline reached");
                    return Err(NetworkError::Timeout {
                        key: key.to_string(),
                        timeout,
                    });
                }
            };

            let tx = match next {
                Some(tx) => tx.map_err(|e| NetworkError::platform("transaction delivery failed", e))?,
                None => {
                    return Err(NetworkError::NotFound(format!(
                        "delivery ended before transfer metadata key [{key}] was found"
                    )))
                }
            };

            if let Some(value) = find_write(vault.as_ref(), &tx, namespace, &metadata_key)? {
                cancel.cancel();
                if tracing::enabled!(Level::DEBUG) {
                    debug!(
                        key = %metadata_key.escape_debug(),
                        ?timeout,
                        value = %STANDARD.encode(&value),
                        "scanning for key found"
                    );
                }
                return Ok(value);
            }
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// First write of `metadata_key` in `namespace` within `tx`, if any.
///
/// Transactions that do not touch `namespace` are skipped without looking
/// at their keys.
fn find_write(
    vault: &dyn ChannelVault,
    tx: &ProcessedTransaction,
    namespace: &str,
    metadata_key: &str,
) -> NetworkResult<Option<Vec<u8>>> {
    debug!(tx_id = %tx.tx_id, "scanning");

    let rws = vault
        .ephemeral_rwset(&tx.results)
        .map_err(|e| NetworkError::platform(format!("failed to parse rwset of [{}]", tx.tx_id), e))?;

    if !rws.namespaces().iter().any(|ns| ns == namespace) {
        debug!(tx_id = %tx.tx_id, namespace, "transaction does not touch namespace");
        return Ok(None);
    }

    for i in 0..rws.num_writes(namespace) {
        let (k, v) = rws.write_at(namespace, i).map_err(|e| {
            NetworkError::platform(format!("failed to read write {i} of [{}]", tx.tx_id), e)
        })?;
        if k == metadata_key {
            return Ok(Some(v));
        }
    }

    debug!(tx_id = %tx.tx_id, "key not in transaction");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_saturates_on_huge_timeouts() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline_after(Duration::MAX), now + FAR_FUTURE);
    }
}
