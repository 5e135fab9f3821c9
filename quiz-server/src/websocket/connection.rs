use quiz_types::{Identity, LobbyId, PlayerId, ServerMessage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

pub const DEFAULT_MAX_SESSIONS_PER_IDENTITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Option<Identity>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    /// Lobby broadcast groups this connection listens to.
    pub groups: HashSet<LobbyId>,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = Self {
            id,
            identity: None,
            connected_at: now,
            last_activity: now,
            groups: HashSet::new(),
            sender,
        };

        (connection, receiver)
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.identity.as_ref().map(|identity| identity.id)
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Tracks live sockets, the identity bound to each and the lobby groups
/// they listen to. An identity holds at most `max_sessions_per_identity`
/// authenticated connections; the oldest is evicted beyond that.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    identity_connections: RwLock<HashMap<PlayerId, VecDeque<ConnectionId>>>,
    max_sessions_per_identity: usize,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_session_limit(DEFAULT_MAX_SESSIONS_PER_IDENTITY)
    }

    pub fn with_session_limit(max_sessions_per_identity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            identity_connections: RwLock::new(HashMap::new()),
            max_sessions_per_identity: max_sessions_per_identity.max(1),
        }
    }

    pub async fn create_connection(
        &self,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (conn, receiver) = Connection::new(id);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        receiver
    }

    pub async fn remove_connection(&self, id: ConnectionId) {
        let player_id = {
            let mut connections = self.connections.write().await;
            connections.remove(&id).and_then(|conn| conn.player_id())
        };

        if let Some(player_id) = player_id {
            self.forget_identity_connection(player_id, id).await;
        }
    }

    async fn forget_identity_connection(&self, player_id: PlayerId, id: ConnectionId) {
        let mut identity_connections = self.identity_connections.write().await;
        if let Some(queue) = identity_connections.get_mut(&player_id) {
            queue.retain(|connection_id| *connection_id != id);
            if queue.is_empty() {
                identity_connections.remove(&player_id);
            }
        }
    }

    pub async fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    pub async fn identity_of(&self, id: ConnectionId) -> Option<Identity> {
        let connections = self.connections.read().await;
        connections.get(&id).and_then(|conn| conn.identity.clone())
    }

    /// Binds a verified identity to the connection. Returns the connections
    /// evicted to stay within the per-identity session cap; each was sent a
    /// `ForceDisconnect` before being dropped.
    pub async fn authenticate_connection(
        &self,
        id: ConnectionId,
        identity: Identity,
    ) -> Result<Vec<ConnectionId>, String> {
        let player_id = identity.id;
        let previous = {
            let mut connections = self.connections.write().await;
            let connection = connections
                .get_mut(&id)
                .ok_or_else(|| "Connection not found".to_string())?;
            let previous = connection.player_id();
            connection.identity = Some(identity);
            connection.update_activity();
            previous
        };

        if let Some(previous) = previous.filter(|previous| *previous != player_id) {
            self.forget_identity_connection(previous, id).await;
        }

        let evicted: Vec<ConnectionId> = {
            let mut identity_connections = self.identity_connections.write().await;
            let queue = identity_connections.entry(player_id).or_default();
            if !queue.contains(&id) {
                queue.push_back(id);
            }
            let excess = queue.len().saturating_sub(self.max_sessions_per_identity);
            queue.drain(..excess).collect()
        };

        if !evicted.is_empty() {
            let mut connections = self.connections.write().await;
            for connection_id in &evicted {
                if let Some(connection) = connections.remove(connection_id) {
                    tracing::info!(
                        "Evicting connection {} for player {}: session limit reached",
                        connection_id,
                        player_id
                    );
                    let _ = connection.send_message(ServerMessage::ForceDisconnect {
                        reason: "Signed in from another session".to_string(),
                    });
                }
            }
        }

        Ok(evicted)
    }

    pub async fn update_activity(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.update_activity();
        }
    }

    pub async fn join_group(&self, id: ConnectionId, lobby_id: &LobbyId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(connection) => connection.groups.insert(lobby_id.clone()),
            None => false,
        }
    }

    pub async fn leave_group(&self, id: ConnectionId, lobby_id: &LobbyId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(connection) => connection.groups.remove(lobby_id),
            None => false,
        }
    }

    /// Adds every live connection of a player to a lobby group.
    pub async fn join_group_for_identity(&self, player_id: PlayerId, lobby_id: &LobbyId) {
        let mut connections = self.connections.write().await;
        for connection in connections.values_mut() {
            if connection.player_id() == Some(player_id) {
                connection.groups.insert(lobby_id.clone());
            }
        }
    }

    pub async fn leave_group_for_identity(&self, player_id: PlayerId, lobby_id: &LobbyId) {
        let mut connections = self.connections.write().await;
        for connection in connections.values_mut() {
            if connection.player_id() == Some(player_id) {
                connection.groups.remove(lobby_id);
            }
        }
    }

    /// Drops a lobby group from every connection.
    pub async fn dissolve_group(&self, lobby_id: &LobbyId) {
        let mut connections = self.connections.write().await;
        for connection in connections.values_mut() {
            connection.groups.remove(lobby_id);
        }
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(&id) {
            connection.send_message(message)
        } else {
            Err("Connection not found".to_string())
        }
    }

    /// Sends to every connection of a player. Returns how many received it.
    pub async fn send_to_identity(&self, player_id: PlayerId, message: ServerMessage) -> usize {
        let connection_ids: Vec<ConnectionId> = {
            let identity_connections = self.identity_connections.read().await;
            identity_connections
                .get(&player_id)
                .map(|queue| queue.iter().copied().collect())
                .unwrap_or_default()
        };

        let connections = self.connections.read().await;
        connection_ids
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|connection| connection.send_message(message.clone()).is_ok())
            .count()
    }

    pub async fn send_to_group(&self, lobby_id: &LobbyId, message: ServerMessage) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if connection.groups.contains(lobby_id) {
                let _ = connection.send_message(message.clone());
            }
        }
    }

    pub async fn cleanup_inactive_connections(&self, timeout: Duration) {
        let inactive_connections: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|conn| conn.is_inactive(timeout))
                .map(|conn| conn.id)
                .collect()
        };

        for connection_id in inactive_connections {
            tracing::info!("Removing inactive connection: {}", connection_id);
            self.remove_connection(connection_id).await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn identity_connection_count(&self, player_id: PlayerId) -> usize {
        let identity_connections = self.identity_connections.read().await;
        identity_connections
            .get(&player_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn group_size(&self, lobby_id: &LobbyId) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.groups.contains(lobby_id))
            .count()
    }
}
