//! Channel fabric — multiplexes outbound events to connected clients.
//!
//! Adapters (the WebSocket handler, the CLI, messaging bridges) register an
//! outbound sender per connection under a session key. Turn events,
//! sub-agent announcements, and proactive pushes all flow through here to
//! every live connection of the owning session. Delivery of proactive items
//! is at-least-once; a per-process dedup set keeps one scheduled item from
//! firing into the same fabric twice.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use valet_domain::event::AgentEvent;

const OUTBOUND_BUFFER: usize = 64;

struct Connection {
    sender: mpsc::Sender<AgentEvent>,
}

#[derive(Default)]
pub struct ChannelFabric {
    /// session key → live connections.
    connections: Mutex<HashMap<String, Vec<Connection>>>,
    /// user id → session keys with at least one registration (live or not).
    user_sessions: Mutex<HashMap<String, HashSet<String>>>,
    /// Scheduled item ids already delivered by this process.
    delivered: Mutex<HashSet<Uuid>>,
}

impl ChannelFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for a session. The returned receiver is
    /// the connection's outbound event stream.
    pub fn register(&self, session_key: &str, user_id: &str) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.connections
            .lock()
            .entry(session_key.to_owned())
            .or_default()
            .push(Connection { sender: tx });
        self.user_sessions
            .lock()
            .entry(user_id.to_owned())
            .or_default()
            .insert(session_key.to_owned());
        rx
    }

    /// Send an event to every live connection of a session. Dead
    /// connections are dropped on the way. Returns how many connections
    /// accepted the event.
    pub fn send(&self, session_key: &str, event: &AgentEvent) -> usize {
        let mut connections = self.connections.lock();
        let Some(conns) = connections.get_mut(session_key) else {
            return 0;
        };
        let mut delivered = 0;
        conns.retain(|c| match c.sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_key, "outbound buffer full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if conns.is_empty() {
            connections.remove(session_key);
        }
        delivered
    }

    /// Push an event to every session of a user. Returns the number of
    /// connections reached.
    pub fn send_to_user(&self, user_id: &str, event: &AgentEvent) -> usize {
        let keys: Vec<String> = self
            .user_sessions
            .lock()
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        keys.iter().map(|key| self.send(key, event)).sum()
    }

    /// Deliver a fired scheduled item to its user, once per process.
    /// Returns false when the item was already delivered (dedup) — the
    /// at-least-once contract makes redelivery after a restart acceptable.
    pub fn deliver_item(&self, user_id: &str, item_id: Uuid, event: &AgentEvent) -> bool {
        if !self.delivered.lock().insert(item_id) {
            return false;
        }
        self.send_to_user(user_id, event);
        true
    }

    /// Session keys of a user with at least one live connection.
    pub fn live_sessions(&self, user_id: &str) -> Vec<String> {
        let connections = self.connections.lock();
        self.user_sessions
            .lock()
            .get(user_id)
            .map(|set| {
                set.iter()
                    .filter(|k| connections.contains_key(*k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(text: &str) -> AgentEvent {
        AgentEvent::Trigger {
            content: text.into(),
        }
    }

    #[tokio::test]
    async fn send_reaches_all_connections_of_a_session() {
        let fabric = ChannelFabric::new();
        let mut a = fabric.register("ws:alice", "alice");
        let mut b = fabric.register("ws:alice", "alice");

        let delivered = fabric.send("ws:alice", &trigger("hello"));
        assert_eq!(delivered, 2);
        assert!(matches!(a.recv().await, Some(AgentEvent::Trigger { .. })));
        assert!(matches!(b.recv().await, Some(AgentEvent::Trigger { .. })));
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let fabric = ChannelFabric::new();
        let rx = fabric.register("ws:alice", "alice");
        drop(rx);
        assert_eq!(fabric.send("ws:alice", &trigger("x")), 0);
        // Map entry cleaned up on the failed send.
        assert_eq!(fabric.send("ws:alice", &trigger("y")), 0);
    }

    #[tokio::test]
    async fn user_fanout_covers_all_sessions() {
        let fabric = ChannelFabric::new();
        let mut ws = fabric.register("ws:alice", "alice");
        let mut cli = fabric.register("cli:alice", "alice");

        let delivered = fabric.send_to_user("alice", &trigger("ping"));
        assert_eq!(delivered, 2);
        assert!(ws.recv().await.is_some());
        assert!(cli.recv().await.is_some());
    }

    #[tokio::test]
    async fn item_delivery_is_deduped() {
        let fabric = ChannelFabric::new();
        let mut rx = fabric.register("ws:alice", "alice");
        let item_id = Uuid::new_v4();

        assert!(fabric.deliver_item("alice", item_id, &trigger("water the plants")));
        assert!(!fabric.deliver_item("alice", item_id, &trigger("water the plants")));

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
