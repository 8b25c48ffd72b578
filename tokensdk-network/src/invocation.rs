//! Request/response protocol against the token chaincode.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::driver::{ChaincodeRequest, QueryResponse};
use crate::error::{NetworkError, NetworkResult, PlatformError};
use crate::network::Network;
use crate::types::{Envelope, Identity, TokenId, TxId};

pub const INVOKE_FUNCTION: &str = "invoke";
pub const QUERY_PUBLIC_PARAMS_FUNCTION: &str = "queryPublicParams";
pub const QUERY_TOKENS_FUNCTION: &str = "queryTokens";
pub const ARE_TOKENS_SPENT_FUNCTION: &str = "areTokensSpent";

/// Transient entry carrying the serialized token request.
pub const TOKEN_REQUEST_KEY: &str = "token_request";

impl Network {
    /// Collect endorsements for a token request.
    ///
    /// The request travels as the transient `token_request` entry so it
    /// never lands in the write set. Endorsement failures are returned as
    /// they come; retrying is up to the platform.
    pub async fn request_approval(
        &self,
        namespace: &str,
        request_raw: &[u8],
        signer: &Identity,
        tx_id: &TxId,
    ) -> NetworkResult<Envelope> {
        debug!(namespace, %tx_id, "requesting approval");
        let request = ChaincodeRequest::new(namespace, INVOKE_FUNCTION)
            .with_network(self.name())
            .with_channel(self.channel())
            .with_signer(signer.clone())
            .with_transient_entry(TOKEN_REQUEST_KEY, request_raw.to_vec())
            .with_tx_id(tx_id.clone());

        self.connection()
            .chaincode
            .endorse(request)
            .await
            .map_err(|e| NetworkError::platform(format!("failed to endorse token request [{tx_id}]"), e))
    }

    /// Canonical identifier of `tx_id`.
    ///
    /// An unassigned `tx_id` gets its nonce and creator from the platform,
    /// written back into the caller's record.
    pub fn compute_tx_id(&self, tx_id: &mut TxId) -> String {
        debug!(%tx_id, "compute tx id");
        self.connection().transactions.compute_tx_id(tx_id)
    }

    /// Raw public parameters of the token scheme, as stored on chain.
    pub async fn fetch_public_parameters(&self, namespace: &str) -> NetworkResult<Vec<u8>> {
        let boxed = self
            .query(namespace, QUERY_PUBLIC_PARAMS_FUNCTION, Vec::new())
            .await
            .map_err(|e| NetworkError::platform("failed to query public parameters", e))?;
        unbox_bytes(boxed)
    }

    /// Fetch the ledger representation of each token in `ids`.
    ///
    /// Results are positional: entry `i` belongs to `ids[i]`.
    pub async fn query_tokens(&self, namespace: &str, ids: &[TokenId]) -> NetworkResult<Vec<Vec<u8>>> {
        let ids_raw = serde_json::to_vec(ids)
            .map_err(|e| NetworkError::InvalidArgument(format!("failed marshalling ids: {e}")))?;

        let boxed = self
            .query(namespace, QUERY_TOKENS_FUNCTION, vec![ids_raw])
            .await
            .map_err(|e| NetworkError::platform("failed to query the token chaincode for tokens", e))?;

        decode_tokens(&unbox_bytes(boxed)?, ids.len())
    }

    /// Spent flags for each token in `ids`, positionally.
    pub async fn are_tokens_spent(&self, namespace: &str, ids: &[String]) -> NetworkResult<Vec<bool>> {
        let ids_raw = serde_json::to_vec(ids)
            .map_err(|e| NetworkError::InvalidArgument(format!("failed marshalling ids: {e}")))?;

        let boxed = self
            .query(namespace, ARE_TOKENS_SPENT_FUNCTION, vec![ids_raw])
            .await
            .map_err(|e| {
                NetworkError::platform("failed to query the token chaincode for tokens spent", e)
            })?;

        decode_spent(&unbox_bytes(boxed)?, ids.len())
    }

    async fn query(
        &self,
        namespace: &str,
        function: &str,
        args: Vec<Vec<u8>>,
    ) -> Result<QueryResponse, PlatformError> {
        debug!(namespace, function, "query chaincode");
        let request = ChaincodeRequest::new(namespace, function)
            .with_network(self.name())
            .with_channel(self.channel())
            .with_args(args);
        self.connection().chaincode.query(request).await
    }
}

fn unbox_bytes(boxed: QueryResponse) -> NetworkResult<Vec<u8>> {
    boxed
        .downcast::<Vec<u8>>()
        .map(|raw| *raw)
        .map_err(|_| NetworkError::Protocol("unexpected response type, expected raw bytes".into()))
}

fn decode_tokens(raw: &[u8], expected: usize) -> NetworkResult<Vec<Vec<u8>>> {
    let encoded: Vec<String> = serde_json::from_slice(raw)?;
    check_len(encoded.len(), expected)?;
    encoded
        .iter()
        .map(|token| {
            STANDARD
                .decode(token)
                .map_err(|e| NetworkError::Protocol(format!("invalid token encoding: {e}")))
        })
        .collect()
}

fn decode_spent(raw: &[u8], expected: usize) -> NetworkResult<Vec<bool>> {
    let spent: Vec<bool> = serde_json::from_slice(raw)?;
    check_len(spent.len(), expected)?;
    Ok(spent)
}

fn check_len(got: usize, expected: usize) -> NetworkResult<()> {
    if got != expected {
        return Err(NetworkError::Protocol(format!(
            "expected {expected} results, got {got}"
        )));
    }
    Ok(())
}
