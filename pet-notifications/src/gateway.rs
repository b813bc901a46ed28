//! Real-time fan-out gateway.
//!
//! Tracks live client connections and pushes frames to them. Each connection
//! has a bounded outbound channel drained by its transport task (see
//! [`crate::hub`]) and an optional domain user id taken from its bearer token.
//! A user may hold several connections at once; delivery to the user reaches
//! all of them. Delivery is best-effort: a frame for a connection whose
//! channel is full is dropped for that connection.
//!
//! The registry does not know about WebSockets, so it can be exercised
//! directly in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message name of the acknowledgement sent to a new connection.
pub const CONNECTED_EVENT: &str = "Connected";

/// Default number of frames buffered per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Identifier of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Frame pushed to a client: `{"event": <name>, "data": <value|null>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    /// Message name (the envelope's event name)
    pub event: String,
    /// Message payload (the envelope's data)
    pub data: Option<Value>,
}

impl Frame {
    /// Create a frame.
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A registered connection as returned to its transport task.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Connection ID
    pub id: ConnectionId,
    /// Domain user id, `None` for anonymous connections
    pub user_id: Option<String>,
    /// Frames to write to the client
    pub outbound: mpsc::Receiver<Frame>,
}

/// Read-only view of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Domain user id
    pub user_id: Option<String>,
    /// When the connection was registered
    pub connected_at: DateTime<Utc>,
}

/// Pushes event frames to live connections.
#[async_trait]
pub trait RealtimeGateway: Send + Sync {
    /// Push a frame to every live connection of one user.
    ///
    /// Returns the number of connections reached. A user with no live
    /// connection is not an error; the push is dropped.
    async fn deliver_to_user(&self, user_id: &str, event: &str, data: Option<&Value>) -> usize;

    /// Push a frame to every live connection. Returns the number reached.
    async fn deliver_to_all(&self, event: &str, data: Option<&Value>) -> usize;
}

struct ConnectionEntry {
    user_id: Option<String>,
    sender: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_user: HashMap<String, HashSet<ConnectionId>>,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    outbound_capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("outbound_capacity", &self.outbound_capacity)
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry buffering at most `capacity` frames per
    /// connection (minimum 1, the `Connected` acknowledgement).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            outbound_capacity: capacity.max(1),
        }
    }

    /// Register a new connection.
    ///
    /// The `Connected` acknowledgement carrying the connection id is queued
    /// on the new connection's channel before it becomes visible to
    /// deliveries, so it is always the first frame the client sees.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Domain user id from the bearer token, `None` when anonymous
    pub async fn on_connect(&self, user_id: Option<String>) -> ConnectionHandle {
        let id = ConnectionId::new();
        let (sender, outbound) = mpsc::channel(self.outbound_capacity);

        // Fresh channel with the receiver held locally, so this cannot fail.
        let _ = sender.try_send(Frame::new(
            CONNECTED_EVENT,
            Some(Value::String(id.to_string())),
        ));

        let mut state = self.state.write().await;
        state.connections.insert(
            id,
            ConnectionEntry {
                user_id: user_id.clone(),
                sender,
                connected_at: Utc::now(),
            },
        );
        if let Some(user) = &user_id {
            state.by_user.entry(user.clone()).or_default().insert(id);
        }
        let total = state.connections.len();
        drop(state);

        info!(
            connection_id = %id,
            user_id = user_id.as_deref().unwrap_or("anonymous"),
            connections = total,
            "Client connected"
        );

        ConnectionHandle {
            id,
            user_id,
            outbound,
        }
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub async fn on_disconnect(&self, id: ConnectionId) -> bool {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(entry) = state.connections.remove(&id) else {
            return false;
        };

        if let Some(user) = &entry.user_id {
            if let Some(ids) = state.by_user.get_mut(user) {
                ids.remove(&id);
                if ids.is_empty() {
                    state.by_user.remove(user);
                }
            }
        }
        let total = state.connections.len();
        drop(guard);

        info!(connection_id = %id, connections = total, "Client disconnected");
        true
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of live connections held by a user.
    pub async fn user_connection_count(&self, user_id: &str) -> usize {
        self.state
            .read()
            .await
            .by_user
            .get(user_id)
            .map_or(0, HashSet::len)
    }

    /// Look up a connection.
    pub async fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.state
            .read()
            .await
            .connections
            .get(&id)
            .map(|entry| ConnectionInfo {
                id,
                user_id: entry.user_id.clone(),
                connected_at: entry.connected_at,
            })
    }

    fn send_all(senders: Vec<(ConnectionId, mpsc::Sender<Frame>)>, frame: &Frame) -> usize {
        let mut reached = 0;
        for (id, sender) in senders {
            match sender.try_send(frame.clone()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = %id, event = %frame.event, "Outbound buffer full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, event = %frame.event, "Connection closed, frame dropped");
                }
            }
        }
        reached
    }
}

#[async_trait]
impl RealtimeGateway for ConnectionRegistry {
    async fn deliver_to_user(&self, user_id: &str, event: &str, data: Option<&Value>) -> usize {
        let senders: Vec<_> = {
            let state = self.state.read().await;
            state
                .by_user
                .get(user_id)
                .into_iter()
                .flatten()
                .filter_map(|id| state.connections.get(id).map(|entry| (*id, entry.sender.clone())))
                .collect()
        };

        if senders.is_empty() {
            debug!(event = %event, user_id = %user_id, "No live connection for user");
            return 0;
        }

        let reached = Self::send_all(senders, &Frame::new(event, data.cloned()));
        debug!(event = %event, user_id = %user_id, reached, "Delivered to user");
        reached
    }

    async fn deliver_to_all(&self, event: &str, data: Option<&Value>) -> usize {
        let senders: Vec<_> = self
            .state
            .read()
            .await
            .connections
            .iter()
            .map(|(id, entry)| (*id, entry.sender.clone()))
            .collect();

        let reached = Self::send_all(senders, &Frame::new(event, data.cloned()));
        debug!(event = %event, reached, "Delivered to all connections");
        reached
    }
}
