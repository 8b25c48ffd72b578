//! Transaction status notifications and finality waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{NetworkError, NetworkResult, PlatformError};
use crate::network::Network;
use crate::types::Identity;
use crate::validation::ValidationCode;

/// Receives status changes of the transactions it is subscribed to.
pub trait TxStatusChangeListener: Send + Sync {
    fn on_status_change(&self, tx_id: &str, status: ValidationCode);
}

type Listeners = Vec<Arc<dyn TxStatusChangeListener>>;

struct StatusEvent {
    tx_id: String,
    status: ValidationCode,
    listeners: Listeners,
}

fn same_listener(a: &Arc<dyn TxStatusChangeListener>, b: &Arc<dyn TxStatusChangeListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Committer-side registry of status listeners.
///
/// Subscribing the same `(tx_id, listener)` pair twice keeps one entry and
/// unsubscribing an absent pair is a no-op. [`notify`](Self::notify) hands
/// the event to a single dispatcher task, so listeners run after `notify`
/// returns and in the order the changes were reported.
///
/// The dispatcher is spawned on the current tokio runtime by the first
/// `notify` that has listeners to reach.
pub struct TxStatusListeners {
    listeners: Mutex<HashMap<String, Listeners>>,
    dispatcher: OnceCell<mpsc::UnboundedSender<StatusEvent>>,
}

impl TxStatusListeners {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            dispatcher: OnceCell::new(),
        }
    }

    pub fn subscribe(&self, tx_id: &str, listener: Arc<dyn TxStatusChangeListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = listeners.entry(tx_id.to_string()).or_default();
        if !entry.iter().any(|l| same_listener(l, &listener)) {
            entry.push(listener);
        }
    }

    pub fn unsubscribe(&self, tx_id: &str, listener: &Arc<dyn TxStatusChangeListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = listeners.get_mut(tx_id) {
            entry.retain(|l| !same_listener(l, listener));
            if entry.is_empty() {
                listeners.remove(tx_id);
            }
        }
    }

    /// Report a status change of `tx_id` to its current listeners.
    ///
    /// Fails when listeners are registered but no tokio runtime is available
    /// to run the dispatcher.
    pub fn notify(&self, tx_id: &str, status: ValidationCode) -> NetworkResult<()> {
        // Enqueue under the lock: lock order is delivery order.
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(snapshot) = listeners.get(tx_id).filter(|l| !l.is_empty()) else {
            return Ok(());
        };
        let event = StatusEvent {
            tx_id: tx_id.to_string(),
            status,
            listeners: snapshot.clone(),
        };
        self.dispatcher()?.send(event).map_err(|_| {
            warn!(tx_id, "status dispatcher stopped, dropping notification");
            NetworkError::platform(
                format!("failed to notify status of [{tx_id}]"),
                PlatformError::Unavailable("status dispatcher stopped".into()),
            )
        })
    }

    fn dispatcher(&self) -> NetworkResult<&mpsc::UnboundedSender<StatusEvent>> {
        self.dispatcher.get_or_try_init(|| {
            let handle = Handle::try_current().map_err(|e| {
                NetworkError::platform(
                    "failed to start status dispatcher",
                    PlatformError::Unavailable(e.to_string()),
                )
            })?;
            let (events, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
            handle.spawn(async move {
                while let Some(event) = rx.recv().await {
                    for listener in &event.listeners {
                        listener.on_status_change(&event.tx_id, event.status);
                    }
                }
            });
            debug!("status dispatcher started");
            Ok(events)
        })
    }

    pub fn listener_count(&self, tx_id: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tx_id)
            .map_or(0, Vec::len)
    }
}

impl Default for TxStatusListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn subscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: Arc<dyn TxStatusChangeListener>,
    ) -> NetworkResult<()> {
        self.connection()
            .committer
            .subscribe_tx_status_changes(tx_id, listener)
            .map_err(|e| NetworkError::platform(format!("failed to subscribe to [{tx_id}]"), e))
    }

    pub fn unsubscribe_tx_status_changes(
        &self,
        tx_id: &str,
        listener: &Arc<dyn TxStatusChangeListener>,
    ) -> NetworkResult<()> {
        self.connection()
            .committer
            .unsubscribe_tx_status_changes(tx_id, listener)
            .map_err(|e| NetworkError::platform(format!("failed to unsubscribe from [{tx_id}]"), e))
    }

    /// Wait until `tx_id` is final locally, or until `cancel` fires.
    pub async fn is_final(&self, tx_id: &str, cancel: &CancellationToken) -> NetworkResult<()> {
        debug!(tx_id, "waiting for finality");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NetworkError::Cancelled(format!("finality wait for [{tx_id}]"))),
            res = self.connection().finality.is_final(tx_id) => {
                res.map_err(|e| NetworkError::platform(format!("failed checking finality of [{tx_id}]"), e))
            }
        }
    }

    /// Wait until `tx_id` is final for every party in `parties`, or until
    /// `cancel` fires.
    pub async fn is_final_for_parties(
        &self,
        tx_id: &str,
        parties: &[Identity],
        cancel: &CancellationToken,
    ) -> NetworkResult<()> {
        debug!(tx_id, parties = parties.len(), "waiting for finality at remote parties");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NetworkError::Cancelled(format!("finality wait for [{tx_id}] at parties"))),
            res = self.connection().finality.is_final_for_parties(tx_id, parties) => {
                res.map_err(|e| NetworkError::platform(format!("failed checking finality of [{tx_id}] at parties"), e))
            }
        }
    }
}
