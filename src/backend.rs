//! Host-side collaborators driven by the coordinator
//!
//! The proxy's queue-placement subsystem and its player messaging are
//! external; the coordinator only talks to them through these traits.

use crate::error::Result;
use crate::types::{Notice, PlayerHandle, PlayerId, ServerSnapshot};
use async_trait::async_trait;
use std::sync::Mutex;

/// Queue-placement subsystem of the host proxy
///
/// Calls are assumed safe to repeat.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Live servers in the subsystem's own order, with `joinable`
    /// evaluated for `player`
    async fn list_servers(&self, player: &PlayerHandle) -> Result<Vec<ServerSnapshot>>;

    /// Connect the player to a server directly
    async fn connect(&self, player: &PlayerHandle, server: &str) -> Result<()>;

    /// Put the player in the queue for a server
    async fn enqueue(&self, player: &PlayerHandle, server: &str) -> Result<()>;
}

/// Sends short notices to a player (action bar or chat)
#[async_trait]
pub trait PlayerNotifier: Send + Sync {
    async fn send_notice(&self, player: &PlayerHandle, notice: Notice) -> Result<()>;
}

/// A call recorded by [`MockQueueBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListServers(PlayerId),
    Connect(PlayerId, String),
    Enqueue(PlayerId, String),
}

/// Mock queue backend for testing
#[derive(Debug, Default)]
pub struct MockQueueBackend {
    servers: Mutex<Vec<ServerSnapshot>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MockQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(servers: Vec<ServerSnapshot>) -> Self {
        Self {
            servers: Mutex::new(servers),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the reported server list
    pub fn set_servers(&self, servers: Vec<ServerSnapshot>) {
        if let Ok(mut current) = self.servers.lock() {
            *current = servers;
        }
    }

    /// Get all recorded calls (for testing)
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Servers the player was connected to, in call order
    pub fn connects_for(&self, player_id: PlayerId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Connect(id, server) if id == player_id => Some(server),
                _ => None,
            })
            .collect()
    }

    /// Servers the player was queued for, in call order
    pub fn enqueues_for(&self, player_id: PlayerId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Enqueue(id, server) if id == player_id => Some(server),
                _ => None,
            })
            .collect()
    }

    pub fn list_count_for(&self, player_id: PlayerId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::ListServers(id) if *id == player_id))
            .count()
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl QueueBackend for MockQueueBackend {
    async fn list_servers(&self, player: &PlayerHandle) -> Result<Vec<ServerSnapshot>> {
        self.record(BackendCall::ListServers(player.id));
        Ok(self.servers.lock().map(|s| s.clone()).unwrap_or_default())
    }

    async fn connect(&self, player: &PlayerHandle, server: &str) -> Result<()> {
        self.record(BackendCall::Connect(player.id, server.to_string()));
        Ok(())
    }

    async fn enqueue(&self, player: &PlayerHandle, server: &str) -> Result<()> {
        self.record(BackendCall::Enqueue(player.id, server.to_string()));
        Ok(())
    }
}

/// Mock notifier that captures notices for testing
#[derive(Debug, Default)]
pub struct MockPlayerNotifier {
    notices: Mutex<Vec<(PlayerId, Notice)>>,
}

impl MockPlayerNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices sent to one player, in order
    pub fn notices_for(&self, player_id: PlayerId) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| {
                n.iter()
                    .filter(|(id, _)| *id == player_id)
                    .map(|(_, notice)| notice.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlayerNotifier for MockPlayerNotifier {
    async fn send_notice(&self, player: &PlayerHandle, notice: Notice) -> Result<()> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((player.id, notice));
        }
        Ok(())
    }
}
