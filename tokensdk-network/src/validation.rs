//! Mapping of ledger-native commit outcomes to [`ValidationCode`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::driver::Ledger;
use crate::error::{NetworkError, NetworkResult, PlatformError};

/// Per-transaction commit outcome as recorded by the ledger.
///
/// The numbering follows the peer protocol: `0` is the only valid outcome,
/// everything else is some flavour of rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeValidationCode(pub i32);

impl NativeValidationCode {
    pub const VALID: Self = Self(0);
    pub const NIL_ENVELOPE: Self = Self(1);
    pub const BAD_PAYLOAD: Self = Self(2);
    pub const DUPLICATE_TXID: Self = Self(9);
    pub const ENDORSEMENT_POLICY_FAILURE: Self = Self(10);
    pub const MVCC_READ_CONFLICT: Self = Self(11);
    pub const PHANTOM_READ_CONFLICT: Self = Self(12);
    pub const NOT_VALIDATED: Self = Self(254);
    pub const INVALID_OTHER_REASON: Self = Self(255);

    pub fn is_valid(self) -> bool {
        self == Self::VALID
    }
}

impl fmt::Display for NativeValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a transaction as tracked by the local channel vault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultStatus {
    Valid,
    Invalid,
    /// Known to the vault but not yet committed.
    Busy,
    Unknown,
}

/// Domain-neutral transaction outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    Unknown,
    Valid,
    Invalid,
}

impl ValidationCode {
    /// Any recorded outcome other than the native valid code is `Invalid`.
    pub fn from_native(code: NativeValidationCode) -> Self {
        if code.is_valid() {
            ValidationCode::Valid
        } else {
            ValidationCode::Invalid
        }
    }

    /// Pending (`Busy`) transactions are not final yet and report `Unknown`.
    pub fn from_vault_status(status: VaultStatus) -> Self {
        match status {
            VaultStatus::Valid => ValidationCode::Valid,
            VaultStatus::Invalid => ValidationCode::Invalid,
            VaultStatus::Busy | VaultStatus::Unknown => ValidationCode::Unknown,
        }
    }
}

/// Read-only view over the ledger's transaction index.
#[derive(Clone)]
pub struct LedgerView {
    ledger: Arc<dyn Ledger>,
}

impl LedgerView {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Look up the committed outcome of `tx_id`.
    ///
    /// A transaction the ledger does not know fails with
    /// [`NetworkError::NotFound`]; it is never reported as `Unknown`.
    pub async fn status(&self, tx_id: &str) -> NetworkResult<ValidationCode> {
        let tx = self
            .ledger
            .transaction_by_id(tx_id)
            .await
            .map_err(|e| match e {
                PlatformError::NotFound(msg) => {
                    NetworkError::NotFound(format!("transaction [{tx_id}]: {msg}"))
                }
                other => NetworkError::platform(format!("failed to get transaction [{tx_id}]"), other),
            })?;

        info!(tx_id, code = %tx.validation_code, "ledger status");
        Ok(ValidationCode::from_native(tx.validation_code))
    }
}
