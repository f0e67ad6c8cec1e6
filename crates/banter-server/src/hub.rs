//! Session broadcast hub.
//!
//! Every connected WebSocket client observes the same shared session. The hub
//! holds one bounded sender per observer and fans session events out to all of
//! them; the session controller never talks to sockets directly.

use crate::api_ws::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Per-observer outbound buffer. 256 events covers normal operation; beyond
/// that the client is too slow and events are dropped for that observer only.
const OBSERVER_BUFFER: usize = 256;

/// Fan-out registry of connected observers.
#[derive(Clone, Default)]
pub struct Hub {
    observers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer and returns its id plus the receiving end of
    /// its outbound buffer.
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        self.observers.write().await.insert(id, tx);
        tracing::debug!(observer = %id, "observer registered");
        (id, rx)
    }

    /// Removes an observer. Safe to call for an id that is already gone.
    pub async fn unregister(&self, id: Uuid) {
        if self.observers.write().await.remove(&id).is_some() {
            tracing::debug!(observer = %id, "observer unregistered");
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Serializes an event once and delivers it to every live observer.
    ///
    /// A full buffer drops the event for that observer with a warning; a
    /// closed channel removes the observer (its socket task is gone but the
    /// disconnect cleanup has not run yet).
    pub async fn broadcast(&self, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize server event: {e}");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let observers = self.observers.read().await;
            for (id, sender) in observers.iter() {
                match sender.try_send(json.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            observer = %id,
                            "dropping event for slow observer"
                        );
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers.write().await;
            for id in dead {
                observers.remove(&id);
            }
        }
    }

    /// Delivers an event to one observer only (init payloads, direct replies).
    pub async fn send(&self, id: Uuid, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize server event: {e}");
                return;
            }
        };
        let observers = self.observers.read().await;
        if let Some(sender) = observers.get(&id) {
            if let Err(e) = sender.try_send(json) {
                tracing::warn!(observer = %id, "dropping direct event: {e}");
            }
        }
    }
}
