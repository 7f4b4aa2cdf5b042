//! Connection registry
//!
//! Maps a user to the outbound half of their live connection. The transport
//! layer owns the sockets; it registers a `ConnectionHandle` and drains the
//! paired receiver into the socket. Nothing here is persisted: a lost push
//! is recovered by re-sending state on reconnect.

use crate::protocol::ServerMessage;
use dashmap::DashMap;
use tokio::sync::mpsc;
use types::ids::{ConnectionId, UserId};

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Send a close frame and stop writing
    Close { reason: String },
}

/// Sending side of one connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    /// Queue a message. Returns false if the writer is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(Outbound::Message(msg)).is_ok()
    }

    pub fn close(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(Outbound::Close {
                reason: reason.into(),
            })
            .is_ok()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `user`, returning the connection it replaced
    pub fn register(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.insert(user, handle)
    }

    /// Remove the entry only if it still belongs to `connection`
    pub fn unregister(&self, user: &UserId, connection: ConnectionId) -> bool {
        self.connections
            .remove_if(user, |_, handle| handle.id == connection)
            .is_some()
    }

    pub fn get(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.connections.get(user).map(|h| h.clone())
    }

    pub fn is_connected(&self, user: &UserId) -> bool {
        self.connections.contains_key(user)
    }

    /// Push a message to `user`. Returns false if no live connection took it.
    pub fn send(&self, user: &UserId, msg: ServerMessage) -> bool {
        match self.get(user) {
            Some(handle) => handle.send(msg),
            None => {
                tracing::debug!(user = %user, "no live connection, message not delivered");
                false
            }
        }
    }

    /// Ask the user's connection to close and forget it
    pub fn close(&self, user: &UserId, reason: &str) -> bool {
        match self.connections.remove(user) {
            Some((_, handle)) => handle.close(reason),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
