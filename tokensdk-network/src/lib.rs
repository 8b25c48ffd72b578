//! tokensdk-network
//!
//! Adapter between the privacy-preserving token service and a permissioned
//! ledger network. The token service talks to [`Network`] only; the
//! platform's own types stay behind the traits in [`driver`].
//!
//! The adapter:
//! - caches one vault per namespace ([`vault`]),
//! - resolves identities from the local membership directory ([`membership`]),
//! - endorses and queries the token chaincode ([`invocation`]),
//! - scans the ledger history for transfer metadata ([`scanner`]),
//! - maps commit outcomes and tracks finality ([`validation`], [`finality`]).
//!
//! # Usage
//!
//! ```ignore
//! use tokensdk_network::{Network, NetworkConfig};
//!
//! let network = Network::new(NetworkConfig::from_env()?, connection)?;
//! let vault = network.vault("zkat").await;
//! let pp = network.fetch_public_parameters("zkat").await?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod finality;
pub mod invocation;
pub mod keys;
pub mod membership;
pub mod network;
pub mod scanner;
pub mod types;
pub mod validation;
pub mod vault;

pub use config::NetworkConfig;
pub use driver::LedgerConnection;
pub use error::{NetworkError, NetworkResult, PlatformError};
pub use finality::{TxStatusChangeListener, TxStatusListeners};
pub use membership::{AnonymousIdentity, IdentityScheme, LocalMembership, LongTermIdentity};
pub use network::Network;
pub use types::{Envelope, Identity, Namespace, TokenId, TransientMap, TxId, UnspentToken, UnspentTokens};
pub use validation::{NativeValidationCode, ValidationCode, VaultStatus};
pub use vault::NetworkVault;
