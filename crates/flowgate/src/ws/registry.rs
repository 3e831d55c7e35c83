//! Session registry: live client connections and their configuration.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::mpsc;

use flowgate_protocol::{OutboundFrame, ServerEvent, SessionConfig};

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// A sender for frames to a specific client.
pub type FrameSender = mpsc::Sender<OutboundFrame>;

/// Identifies one physical connection behind a client id.
pub type ConnectionId = u64;

/// Outcome of a best-effort [`SessionRegistry::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the session's socket.
    Delivered,
    /// The session is gone; the frame was discarded.
    Dropped,
}

impl Delivery {
    pub fn is_delivered(self) -> bool {
        self == Delivery::Delivered
    }
}

/// What `admit` hands back to the connection task.
pub struct Admission {
    pub conn_id: ConnectionId,
    /// Frames to write to the socket, in order.
    pub frames: mpsc::Receiver<OutboundFrame>,
}

struct SessionEntry {
    conn_id: ConnectionId,
    sender: FrameSender,
    config: SessionConfig,
}

/// Registry of client sessions keyed by client id.
///
/// Holds the only shared mutable state of the gateway. Each map operation is
/// atomic; per-session ordering comes from the connection task.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    next_conn_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a session with the default configuration.
    ///
    /// A session already registered under `client_id` is replaced; its
    /// outbound queue closes, which ends that connection's writer.
    pub fn admit(&self, client_id: &str) -> Admission {
        let (sender, frames) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.sessions.insert(
            client_id.to_string(),
            SessionEntry {
                conn_id,
                sender,
                config: SessionConfig::default(),
            },
        );

        if let Some(previous) = previous {
            info!(
                "Client {} reconnected; replacing connection {} with {}",
                client_id, previous.conn_id, conn_id
            );
        } else {
            info!("Admitted client {} (connection {})", client_id, conn_id);
        }

        Admission { conn_id, frames }
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn evict(&self, client_id: &str) {
        if self.sessions.remove(client_id).is_some() {
            info!("Evicted client {}", client_id);
        }
    }

    /// Remove a session only if it still belongs to `conn_id`.
    pub fn release(&self, client_id: &str, conn_id: ConnectionId) {
        let removed = self
            .sessions
            .remove_if(client_id, |_, entry| entry.conn_id == conn_id);
        if removed.is_some() {
            info!("Released client {} (connection {})", client_id, conn_id);
        } else {
            debug!(
                "Connection {} of client {} already superseded",
                conn_id, client_id
            );
        }
    }

    /// Queue a frame for a session's socket.
    ///
    /// Never fails: a frame for an unknown or closed session is dropped.
    pub async fn send(&self, client_id: &str, frame: impl Into<OutboundFrame>) -> Delivery {
        // Clone the sender so no map guard is held across the await.
        let sender = match self.sessions.get(client_id) {
            Some(entry) => entry.sender.clone(),
            None => {
                debug!("Dropping frame for unknown client {}", client_id);
                return Delivery::Dropped;
            }
        };

        let frame = frame.into();
        let tag = frame.tag();
        match sender.send(frame).await {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                debug!("Dropping {} frame for closed client {}", tag, client_id);
                Delivery::Dropped
            }
        }
    }

    /// Shorthand for sending an `error` frame.
    pub async fn send_error(&self, client_id: &str, message: impl Into<String>) -> Delivery {
        self.send(client_id, ServerEvent::error(message)).await
    }

    /// Replace a session's configuration. Returns `false` for unknown ids.
    pub fn set_config(&self, client_id: &str, config: SessionConfig) -> bool {
        match self.sessions.get_mut(client_id) {
            Some(mut entry) => {
                entry.config = config;
                true
            }
            None => false,
        }
    }

    /// A session's configuration, or the default for unknown ids.
    pub fn config(&self, client_id: &str) -> SessionConfig {
        self.sessions
            .get(client_id)
            .map(|entry| entry.config.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.contains_key(client_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_send_and_receive() {
        let registry = SessionRegistry::new();
        let mut admission = registry.admit("c1");
        assert!(registry.contains("c1"));
        assert_eq!(registry.len(), 1);

        let delivery = registry.send("c1", ServerEvent::Pong {}).await;
        assert_eq!(delivery, Delivery::Delivered);

        let frame = admission.frames.recv().await.unwrap();
        assert_eq!(frame.event, ServerEvent::Pong {});
    }

    #[tokio::test]
    async fn test_send_to_unknown_is_dropped() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.send("ghost", ServerEvent::Pong {}).await,
            Delivery::Dropped
        );
    }

    #[tokio::test]
    async fn test_send_after_receiver_gone_is_dropped() {
        let registry = SessionRegistry::new();
        let admission = registry.admit("c1");
        drop(admission);

        let delivery = registry.send_error("c1", "boom").await;
        assert!(!delivery.is_delivered());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let registry = SessionRegistry::new();
        let _admission = registry.admit("c1");

        registry.evict("c1");
        registry.evict("c1");
        registry.evict("never-seen");

        assert!(registry.is_empty());
    }

    #[test]
    fn test_config_last_write_wins() {
        let registry = SessionRegistry::new();
        let _admission = registry.admit("c1");
        assert_eq!(registry.config("c1"), SessionConfig::default());

        let first = SessionConfig {
            permission_mode: "deny".to_string(),
            ..Default::default()
        };
        let second = SessionConfig {
            permission_mode: "confirm".to_string(),
            auto_start_process: false,
            session_id: Some("s".to_string()),
        };
        assert!(registry.set_config("c1", first));
        assert!(registry.set_config("c1", second.clone()));
        assert_eq!(registry.config("c1"), second);

        assert!(!registry.set_config("ghost", SessionConfig::default()));
        assert_eq!(registry.config("ghost"), SessionConfig::default());
    }

    #[test]
    fn test_eviction_forgets_config() {
        let registry = SessionRegistry::new();
        let _first = registry.admit("c1");
        registry.set_config(
            "c1",
            SessionConfig {
                permission_mode: "deny".to_string(),
                ..Default::default()
            },
        );
        registry.evict("c1");

        let _second = registry.admit("c1");
        assert_eq!(registry.config("c1"), SessionConfig::default());
    }

    #[tokio::test]
    async fn test_duplicate_id_replaces_and_release_respects_owner() {
        let registry = SessionRegistry::new();
        let mut old = registry.admit("dup");
        let mut new = registry.admit("dup");
        assert_ne!(old.conn_id, new.conn_id);
        assert_eq!(registry.len(), 1);

        // The replaced connection's queue is closed.
        assert!(old.frames.recv().await.is_none());

        // A stale release must not evict the replacement.
        registry.release("dup", old.conn_id);
        assert!(registry.contains("dup"));

        let _ = registry.send("dup", ServerEvent::Pong {}).await;
        assert!(new.frames.recv().await.is_some());

        registry.release("dup", new.conn_id);
        assert!(!registry.contains("dup"));
    }
}
