//! Identity resolution against the local membership directory.
//!
//! Two credential schemes are recognized: anonymous credentials
//! (`idemix`) and certificate-based long-term credentials (`bccsp`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::debug;

use crate::driver::{IdentityOptions, LocalMembershipProvider};
use crate::error::{NetworkError, NetworkResult};
use crate::types::Identity;

pub const IDEMIX_MSP: &str = "idemix";
pub const BCCSP_MSP: &str = "bccsp";

/// Index of the enrollment ID among the audit info attributes.
const ENROLLMENT_ID_ATTRIBUTE: usize = 2;

/// Credential scheme of a registered identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentityScheme {
    /// Anonymous credentials.
    Idemix,
    /// Certificate-based long-term credentials.
    Bccsp,
}

impl IdentityScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityScheme::Idemix => IDEMIX_MSP,
            IdentityScheme::Bccsp => BCCSP_MSP,
        }
    }
}

impl fmt::Display for IdentityScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityScheme {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            IDEMIX_MSP => Ok(IdentityScheme::Idemix),
            BCCSP_MSP => Ok(IdentityScheme::Bccsp),
            other => Err(NetworkError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Parsed `"<scheme>:<providerID>"` identity type string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityType {
    pub scheme: IdentityScheme,
    pub msp_id: String,
}

impl FromStr for IdentityType {
    type Err = NetworkError;

    /// A missing `:` separator is an invalid argument; an unknown scheme
    /// segment is an unsupported scheme.
    fn from_str(typ: &str) -> Result<Self, Self::Err> {
        let (scheme, msp_id) = typ
            .split_once(':')
            .ok_or_else(|| NetworkError::InvalidArgument(format!("invalid identity type '{typ}'")))?;
        // Only the segment up to the next separator names the provider.
        let msp_id = msp_id.split(':').next().unwrap_or_default();
        Ok(Self {
            scheme: scheme.parse()?,
            msp_id: msp_id.to_string(),
        })
    }
}

/// Deferred materialization of an anonymous identity.
pub type GetIdentityFn = Arc<dyn Fn() -> NetworkResult<(Identity, Vec<u8>)> + Send + Sync>;

/// Result of resolving an anonymous credential by label.
#[derive(Clone)]
pub struct AnonymousIdentity {
    pub id: String,
    pub enrollment_id: String,
    /// Derives the identity bytes when invoked. Nothing is derived at
    /// resolution time.
    pub get: GetIdentityFn,
}

impl fmt::Debug for AnonymousIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymousIdentity")
            .field("id", &self.id)
            .field("enrollment_id", &self.enrollment_id)
            .finish()
    }
}

/// Result of resolving a long-term credential by label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongTermIdentity {
    pub id: String,
    pub enrollment_id: String,
    pub identity: Identity,
}

/// Identity resolver over the platform's membership directory.
#[derive(Clone)]
pub struct LocalMembership {
    provider: Arc<dyn LocalMembershipProvider>,
}

impl LocalMembership {
    pub fn new(provider: Arc<dyn LocalMembershipProvider>) -> Self {
        Self { provider }
    }

    pub fn default_identity(&self) -> Identity {
        self.provider.default_identity()
    }

    pub fn anonymous_identity(&self) -> Identity {
        self.provider.anonymous_identity()
    }

    pub fn is_me(&self, identity: &Identity) -> bool {
        self.provider.is_me(identity)
    }

    /// Resolve the anonymous credential registered under `label`.
    ///
    /// `audit_info` is embedded into the materialized identity when non-empty.
    pub fn anonymous_identity_by_label(
        &self,
        label: &str,
        audit_info: &[u8],
    ) -> NetworkResult<AnonymousIdentity> {
        let info = self
            .provider
            .identity_info_by_label(IdentityScheme::Idemix, label)
            .ok_or_else(|| NetworkError::NotFound(format!("anonymous identity [{label}]")))?;

        let options = IdentityOptions {
            eid_extension: true,
            audit_info: (!audit_info.is_empty()).then(|| audit_info.to_vec()),
        };
        let materializer = Arc::clone(&info.materializer);
        let label = label.to_string();
        let get: GetIdentityFn = Arc::new(move || {
            materializer
                .identity(&options)
                .map_err(|e| NetworkError::platform(format!("failed to get identity [{label}]"), e))
        });

        Ok(AnonymousIdentity {
            id: info.id,
            enrollment_id: info.enrollment_id,
            get,
        })
    }

    /// Resolve the long-term credential registered under `label`.
    pub fn long_term_identity(&self, label: &str) -> NetworkResult<LongTermIdentity> {
        let info = self
            .provider
            .identity_info_by_label(IdentityScheme::Bccsp, label)
            .ok_or_else(|| NetworkError::NotFound(format!("long-term identity [{label}]")))?;

        let (identity, _) = info.materializer.identity(&IdentityOptions::default()).map_err(|e| {
            debug!(label, error = %e, "failed to materialize long-term identity");
            NetworkError::NotFound(format!("failed to get identity [{label}]"))
        })?;

        Ok(LongTermIdentity {
            id: info.id,
            enrollment_id: info.enrollment_id,
            identity,
        })
    }

    /// Map a long-term identity back to its label.
    pub fn long_term_identifier(&self, identity: &Identity) -> NetworkResult<String> {
        self.provider
            .identity_info_by_identity(IdentityScheme::Bccsp, identity)
            .map(|info| info.id)
            .ok_or_else(|| NetworkError::NotFound(format!("long-term identifier for [{identity}]")))
    }

    /// Register a credential provider under `id`, loading it from `path`.
    ///
    /// `typ` is `"<scheme>:<providerID>"`.
    pub fn register_identity(&self, id: &str, typ: &str, path: &str) -> NetworkResult<()> {
        let identity_type: IdentityType = typ.parse()?;
        debug!(id, scheme = %identity_type.scheme, msp_id = %identity_type.msp_id, path, "registering identity");

        let result = match identity_type.scheme {
            IdentityScheme::Idemix => self.provider.register_idemix(id, path, &identity_type.msp_id),
            IdentityScheme::Bccsp => self.provider.register_x509(id, path, &identity_type.msp_id),
        };
        result.map_err(|e| NetworkError::platform(format!("failed registering identity [{id}]"), e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIT INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Audit record of an anonymous credential.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuditInfo {
    #[serde(default)]
    attributes: Vec<String>,
}

/// Extract the enrollment ID from serialized anonymous-credential audit info.
pub fn enrollment_id_from_audit_info(raw: &[u8]) -> NetworkResult<String> {
    let info: AuditInfo = serde_json::from_slice(raw).map_err(|e| {
        NetworkError::InvalidArgument(format!("failed unmarshalling audit info: {e}"))
    })?;

    let encoded = info.attributes.get(ENROLLMENT_ID_ATTRIBUTE).ok_or_else(|| {
        NetworkError::InvalidArgument(format!(
            "audit info carries {} attributes, enrollment id missing",
            info.attributes.len()
        ))
    })?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| NetworkError::InvalidArgument(format!("invalid enrollment id encoding: {e}")))?;

    String::from_utf8(decoded)
        .map_err(|e| NetworkError::InvalidArgument(format!("enrollment id is not utf-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_type_parsing() {
        let parsed: IdentityType = "idemix:MSP1".parse().unwrap();
        assert_eq!(parsed.scheme, IdentityScheme::Idemix);
        assert_eq!(parsed.msp_id, "MSP1");

        let parsed: IdentityType = "bccsp:Org1MSP:extra".parse().unwrap();
        assert_eq!(parsed.scheme, IdentityScheme::Bccsp);
        assert_eq!(parsed.msp_id, "Org1MSP");
    }

    #[test]
    fn test_identity_type_errors_are_distinct() {
        let err = "bogus".parse::<IdentityType>().unwrap_err();
        assert!(matches!(err, NetworkError::InvalidArgument(_)));

        let err = "unknown:MSP1".parse::<IdentityType>().unwrap_err();
        assert!(matches!(err, NetworkError::UnsupportedScheme(ref s) if s == "unknown"));
    }

    #[test]
    fn test_enrollment_id_from_audit_info() {
        let raw = serde_json::json!({
            "EidNymAuditData": null,
            "Attributes": [
                STANDARD.encode("ou"),
                STANDARD.encode("role"),
                STANDARD.encode("alice"),
                STANDARD.encode("revocation"),
            ],
        });
        let raw = serde_json::to_vec(&raw).unwrap();
        assert_eq!(enrollment_id_from_audit_info(&raw).unwrap(), "alice");
    }

    #[test]
    fn test_enrollment_id_rejects_garbage() {
        assert!(matches!(
            enrollment_id_from_audit_info(b"not json"),
            Err(NetworkError::InvalidArgument(_))
        ));
        let short = serde_json::to_vec(&serde_json::json!({ "Attributes": [] })).unwrap();
        assert!(matches!(
            enrollment_id_from_audit_info(&short),
            Err(NetworkError::InvalidArgument(_))
        ));
    }
}
