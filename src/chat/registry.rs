use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::chat::protocol::ServerEvent;
use crate::chat::rate_limit::RateLimiter;
use crate::config::ChatConfig;

/// Identifies one live socket. Never reused within a process.
pub type ConnId = u64;

/// Text frames queued for one socket.
pub type FrameReceiver = mpsc::Receiver<Arc<str>>;

#[derive(Debug)]
struct Connection {
    user_id: Uuid,
    sender: mpsc::Sender<Arc<str>>,
    rooms: HashSet<Uuid>,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnId, Connection>,
    /// user_id -> live connections (multi-device)
    users: HashMap<Uuid, HashSet<ConnId>>,
    /// conversation_id -> subscribed connections
    rooms: HashMap<Uuid, HashSet<ConnId>>,
    last_seen: HashMap<Uuid, DateTime<Utc>>,
}

/// Coarse presence of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl RegistryState {
    /// Push a frame to each target without blocking. Returns the connections
    /// whose queue is full or closed.
    fn fan_out<'a>(&self, targets: impl IntoIterator<Item = &'a ConnId>, frame: &Arc<str>) -> Vec<ConnId> {
        let mut dead = Vec::new();
        for id in targets {
            if let Some(conn) = self.connections.get(id) {
                if conn.sender.try_send(frame.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        dead
    }

    /// Unlink a connection everywhere. Returns the owner and the rooms it was
    /// in when this was the owner's last connection.
    fn remove(&mut self, id: ConnId) -> Option<(Uuid, HashSet<Uuid>)> {
        let conn = self.connections.remove(&id)?;

        for room in &conn.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }

        let now_offline = match self.users.get_mut(&conn.user_id) {
            Some(set) => {
                set.remove(&id);
                set.is_empty()
            }
            None => true,
        };

        if now_offline {
            self.users.remove(&conn.user_id);
            self.last_seen.insert(conn.user_id, Utc::now());
            Some((conn.user_id, conn.rooms))
        } else {
            None
        }
    }
}

/// Process-local registry of live connections, rooms, presence and the
/// per-user send limiter.
///
/// Constructed once at startup and shared behind an `Arc`; `drain` at
/// shutdown drops every outbound queue, which ends each session loop.
/// Fan-out never awaits a socket: frames are queued with `try_send`, and a
/// connection whose queue is full or closed is pruned.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
    buffer: usize,
    send_limiter: RateLimiter,
}

impl ConnectionRegistry {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
            buffer: config.outbound_buffer.max(1),
            send_limiter: RateLimiter::new(
                config.send_rate_limit,
                config.send_rate_window,
                config.rate_limit_idle,
                config.rate_limit_max_users,
            ),
        }
    }

    /// Register a live connection for `user_id` and mark the user online.
    /// The returned receiver yields every frame addressed to it.
    pub async fn connect(&self, user_id: Uuid) -> (ConnId, FrameReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);

        let mut state = self.state.write().await;
        state.connections.insert(
            id,
            Connection {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        state.users.entry(user_id).or_default().insert(id);
        let devices = state.users.get(&user_id).map_or(0, HashSet::len);
        drop(state);

        tracing::info!(conn = id, %user_id, devices, "Connection registered");
        (id, receiver)
    }

    /// Remove a connection from its user and every room it joined. When it
    /// was the user's last one, the user goes offline and the rooms hear it.
    pub async fn disconnect(&self, id: ConnId) {
        self.prune(vec![id]).await;
    }

    async fn prune(&self, dead: Vec<ConnId>) {
        if dead.is_empty() {
            return;
        }

        let mut state = self.state.write().await;
        let mut queue = dead;
        while let Some(id) = queue.pop() {
            let Some((user_id, rooms)) = state.remove(id) else {
                continue;
            };
            tracing::info!(conn = id, %user_id, "User went offline");

            let frame = ServerEvent::Presence {
                user_id,
                online: false,
                last_seen_at: state.last_seen.get(&user_id).copied(),
            }
            .to_frame(None);

            let targets: HashSet<ConnId> = rooms
                .iter()
                .filter_map(|room| state.rooms.get(room))
                .flatten()
                .copied()
                .collect();
            for failed in state.fan_out(&targets, &frame) {
                tracing::warn!(conn = failed, "Pruning unresponsive connection");
                queue.push(failed);
            }
        }
    }

    /// Subscribe a connection to a conversation's room. The caller checks
    /// membership first. Returns false for an unknown connection.
    pub async fn join_room(&self, id: ConnId, conversation_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        let Some(conn) = state.connections.get_mut(&id) else {
            return false;
        };
        if !conn.rooms.insert(conversation_id) {
            return true;
        }
        let user_id = conn.user_id;

        let room = state.rooms.entry(conversation_id).or_default();
        room.insert(id);
        let peers: Vec<ConnId> = room.iter().copied().filter(|&c| c != id).collect();

        let already_present = peers
            .iter()
            .any(|c| state.connections.get(c).is_some_and(|p| p.user_id == user_id));

        let dead = if already_present {
            Vec::new()
        } else {
            let frame = ServerEvent::Presence {
                user_id,
                online: true,
                last_seen_at: None,
            }
            .to_frame(None);
            state.fan_out(&peers, &frame)
        };
        drop(state);

        tracing::info!(conn = id, %user_id, %conversation_id, "Joined room");
        self.prune(dead).await;
        true
    }

    /// Unsubscribe every connection of `user_id` from a room, after the user
    /// stopped being a member. Returns how many connections left.
    pub async fn leave_room(&self, user_id: Uuid, conversation_id: Uuid) -> usize {
        let mut state = self.state.write().await;
        let conns: Vec<ConnId> = state
            .users
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut left = 0;
        for id in &conns {
            if let Some(conn) = state.connections.get_mut(id) {
                if conn.rooms.remove(&conversation_id) {
                    left += 1;
                }
            }
        }

        let now_empty = match state.rooms.get_mut(&conversation_id) {
            Some(room) => {
                room.retain(|c| !conns.contains(c));
                room.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.rooms.remove(&conversation_id);
        }
        drop(state);

        if left > 0 {
            tracing::info!(%user_id, %conversation_id, connections = left, "Left room");
        }
        left
    }

    /// Drop a room entirely, e.g. when its conversation was deleted.
    pub async fn close_room(&self, conversation_id: Uuid) {
        let mut state = self.state.write().await;
        let Some(conns) = state.rooms.remove(&conversation_id) else {
            return;
        };
        for id in &conns {
            if let Some(conn) = state.connections.get_mut(id) {
                conn.rooms.remove(&conversation_id);
            }
        }
        drop(state);

        tracing::info!(%conversation_id, connections = conns.len(), "Room closed");
    }

    pub async fn is_in_room(&self, id: ConnId, conversation_id: Uuid) -> bool {
        let state = self.state.read().await;
        state
            .connections
            .get(&id)
            .is_some_and(|c| c.rooms.contains(&conversation_id))
    }

    /// Queue a frame for one connection.
    pub async fn send_to_conn(&self, id: ConnId, event: &ServerEvent, req_id: Option<&str>) {
        let frame = event.to_frame(req_id);
        let dead = self.state.read().await.fan_out([&id], &frame);
        self.prune(dead).await;
    }

    /// Queue a frame for every live connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        let frame = event.to_frame(None);
        let dead = {
            let state = self.state.read().await;
            match state.users.get(&user_id) {
                Some(conns) => state.fan_out(conns, &frame),
                None => Vec::new(),
            }
        };
        self.prune(dead).await;
    }

    /// Queue a frame for every connection in a room, optionally skipping one.
    pub async fn send_to_room(&self, conversation_id: Uuid, event: &ServerEvent, exclude: Option<ConnId>) {
        let frame = event.to_frame(None);
        let dead = {
            let state = self.state.read().await;
            match state.rooms.get(&conversation_id) {
                Some(conns) => state.fan_out(conns.iter().filter(|&&c| Some(c) != exclude), &frame),
                None => Vec::new(),
            }
        };
        self.prune(dead).await;
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.state.read().await.users.contains_key(&user_id)
    }

    pub async fn presence(&self, user_id: Uuid) -> Presence {
        let state = self.state.read().await;
        Presence {
            is_online: state.users.contains_key(&user_id),
            last_seen_at: state.last_seen.get(&user_id).copied(),
        }
    }

    /// Sliding-window check for `send-message`.
    pub async fn check_rate_limit(&self, user_id: Uuid) -> bool {
        self.send_limiter.check(user_id).await
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Drop every connection. Session loops see their queue close and shut
    /// the socket.
    pub async fn drain(&self) {
        let mut state = self.state.write().await;
        let count = state.connections.len();
        let now = Utc::now();
        let users: Vec<Uuid> = state.users.keys().copied().collect();
        for user_id in users {
            state.last_seen.insert(user_id, now);
        }
        state.connections.clear();
        state.users.clear();
        state.rooms.clear();
        tracing::info!(count, "Connection registry drained");
    }
}
