//! In-memory membership directory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tokensdk_network::driver::{
    IdentityInfo, IdentityMaterializer, IdentityOptions, LocalMembershipProvider,
};
use tokensdk_network::{Identity, IdentityScheme, PlatformError};

pub const DEFAULT_IDENTITY: &[u8] = b"default-identity";
pub const ANONYMOUS_IDENTITY: &[u8] = b"anonymous-identity";

/// Suffix appended to anonymous identity bytes when the enrollment ID
/// extension is requested.
pub const EID_SUFFIX: &[u8] = b"+eid";

#[derive(Clone, Debug)]
struct Registration {
    id: String,
    scheme: IdentityScheme,
    msp_id: String,
    path: String,
}

impl Registration {
    fn enrollment_id(&self) -> String {
        format!("{}@{}", self.id, self.msp_id)
    }

    fn identity(&self) -> Identity {
        Identity(format!("{}:{}:{}", self.scheme, self.msp_id, self.id).into_bytes())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AuditInfoRecord {
    attributes: Vec<String>,
}

/// Serialized audit info whose third attribute carries `enrollment_id`.
pub fn audit_info_for(enrollment_id: &str) -> Vec<u8> {
    let record = AuditInfoRecord {
        attributes: vec![
            STANDARD.encode("ou"),
            STANDARD.encode("role"),
            STANDARD.encode(enrollment_id),
            STANDARD.encode("revocation-handle"),
        ],
    };
    serde_json::to_vec(&record).unwrap_or_default()
}

/// Directory of registered credentials.
///
/// Counts materializations so tests can check that resolution alone does
/// not derive identity bytes.
#[derive(Default)]
pub struct InMemoryMembership {
    registrations: Mutex<Vec<Registration>>,
    materializations: Arc<AtomicUsize>,
    fail_materialization: Arc<AtomicBool>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Make every subsequent materialization fail.
    pub fn fail_materialization(&self, fail: bool) {
        self.fail_materialization.store(fail, Ordering::SeqCst);
    }

    /// `(scheme, msp_id, path)` recorded for `id`.
    pub fn registration(&self, id: &str) -> Option<(IdentityScheme, String, String)> {
        self.registrations
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .map(|r| (r.scheme, r.msp_id.clone(), r.path.clone()))
    }

    fn register(&self, scheme: IdentityScheme, id: &str, path: &str, msp_id: &str) -> Result<(), PlatformError> {
        if path.is_empty() {
            return Err(PlatformError::Rejected(format!("no credential path for [{id}]")));
        }
        let mut registrations = self.registrations.lock().unwrap();
        registrations.retain(|r| !(r.id == id && r.scheme == scheme));
        registrations.push(Registration {
            id: id.to_string(),
            scheme,
            msp_id: msp_id.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    fn info(&self, registration: &Registration) -> IdentityInfo {
        IdentityInfo {
            id: registration.id.clone(),
            enrollment_id: registration.enrollment_id(),
            materializer: Arc::new(Materializer {
                registration: registration.clone(),
                counter: Arc::clone(&self.materializations),
                fail: Arc::clone(&self.fail_materialization),
            }),
        }
    }
}

impl LocalMembershipProvider for InMemoryMembership {
    fn default_identity(&self) -> Identity {
        Identity(DEFAULT_IDENTITY.to_vec())
    }

    fn anonymous_identity(&self) -> Identity {
        Identity(ANONYMOUS_IDENTITY.to_vec())
    }

    fn is_me(&self, identity: &Identity) -> bool {
        identity.as_bytes() == DEFAULT_IDENTITY
            || identity.as_bytes() == ANONYMOUS_IDENTITY
            || self
                .registrations
                .lock()
                .unwrap()
                .iter()
                .any(|r| &r.identity() == identity)
    }

    fn identity_info_by_label(&self, scheme: IdentityScheme, label: &str) -> Option<IdentityInfo> {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .find(|r| r.scheme == scheme && r.id == label)
            .map(|r| self.info(r))
    }

    fn identity_info_by_identity(&self, scheme: IdentityScheme, identity: &Identity) -> Option<IdentityInfo> {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .find(|r| r.scheme == scheme && &r.identity() == identity)
            .map(|r| self.info(r))
    }

    fn register_idemix(&self, id: &str, path: &str, msp_id: &str) -> Result<(), PlatformError> {
        self.register(IdentityScheme::Idemix, id, path, msp_id)
    }

    fn register_x509(&self, id: &str, path: &str, msp_id: &str) -> Result<(), PlatformError> {
        self.register(IdentityScheme::Bccsp, id, path, msp_id)
    }
}

struct Materializer {
    registration: Registration,
    counter: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl IdentityMaterializer for Materializer {
    fn identity(&self, options: &IdentityOptions) -> Result<(Identity, Vec<u8>), PlatformError> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable(format!(
                "credential [{}] cannot be loaded",
                self.registration.id
            )));
        }

        let mut identity = self.registration.identity();
        if options.eid_extension {
            identity.0.extend_from_slice(EID_SUFFIX);
        }

        let audit_info = match (&options.audit_info, self.registration.scheme) {
            (Some(audit_info), _) => audit_info.clone(),
            (None, IdentityScheme::Idemix) => audit_info_for(&self.registration.enrollment_id()),
            (None, IdentityScheme::Bccsp) => Vec::new(),
        };
        Ok((identity, audit_info))
    }
}
