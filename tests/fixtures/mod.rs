//! Test fixtures and recording collaborators for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use lobby_transit::backend::{BackendCall, PlayerNotifier, QueueBackend};
use lobby_transit::config::LobbySettings;
use lobby_transit::error::Result;
use lobby_transit::transit::{CoordinatorConfig, LobbySelector, RetryPolicy, TransitCoordinator};
use lobby_transit::types::{Notice, PlayerHandle, PlayerId, ServerSnapshot};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Queue backend that records every call with the (tokio) time it was made
#[derive(Debug, Default)]
pub struct RecordingQueueBackend {
    servers: Mutex<Vec<ServerSnapshot>>,
    calls: Mutex<Vec<(Instant, BackendCall)>>,
    fail_listing: AtomicBool,
    fail_connect: AtomicBool,
    enqueue_failures: AtomicUsize,
}

impl RecordingQueueBackend {
    pub fn new(servers: Vec<ServerSnapshot>) -> Self {
        Self {
            servers: Mutex::new(servers),
            ..Self::default()
        }
    }

    pub fn set_servers(&self, servers: Vec<ServerSnapshot>) {
        if let Ok(mut current) = self.servers.lock() {
            *current = servers;
        }
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` enqueue calls fail
    pub fn fail_next_enqueues(&self, count: usize) {
        self.enqueue_failures.store(count, Ordering::SeqCst);
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((Instant::now(), call));
        }
    }

    pub fn calls(&self) -> Vec<(Instant, BackendCall)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn connects_for(&self, player_id: PlayerId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|(_, call)| match call {
                BackendCall::Connect(id, server) if id == player_id => Some(server),
                _ => None,
            })
            .collect()
    }

    pub fn enqueues_for(&self, player_id: PlayerId) -> Vec<String> {
        self.enqueue_log_for(player_id)
            .into_iter()
            .map(|(_, server)| server)
            .collect()
    }

    /// Enqueue calls for one player with the time they were made
    pub fn enqueue_log_for(&self, player_id: PlayerId) -> Vec<(Instant, String)> {
        self.calls()
            .into_iter()
            .filter_map(|(at, call)| match call {
                BackendCall::Enqueue(id, server) if id == player_id => Some((at, server)),
                _ => None,
            })
            .collect()
    }

    pub fn list_count_for(&self, player_id: PlayerId) -> usize {
        self.calls()
            .iter()
            .filter(|(_, call)| matches!(call, BackendCall::ListServers(id) if *id == player_id))
            .count()
    }

    pub fn total_enqueues(&self) -> usize {
        self.calls()
            .iter()
            .filter(|(_, call)| matches!(call, BackendCall::Enqueue(..)))
            .count()
    }
}

#[async_trait]
impl QueueBackend for RecordingQueueBackend {
    async fn list_servers(&self, player: &PlayerHandle) -> Result<Vec<ServerSnapshot>> {
        self.record(BackendCall::ListServers(player.id));
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("queue subsystem unavailable"));
        }
        Ok(self.servers.lock().map(|s| s.clone()).unwrap_or_default())
    }

    async fn connect(&self, player: &PlayerHandle, server: &str) -> Result<()> {
        self.record(BackendCall::Connect(player.id, server.to_string()));
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connect to {} refused", server));
        }
        Ok(())
    }

    async fn enqueue(&self, player: &PlayerHandle, server: &str) -> Result<()> {
        self.record(BackendCall::Enqueue(player.id, server.to_string()));
        let failing = self
            .enqueue_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow::anyhow!("queue for {} temporarily unavailable", server));
        }
        Ok(())
    }
}

/// Notifier that captures notices for testing
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(PlayerId, Notice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

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

    pub fn count_for(&self, player_id: PlayerId, notice: &Notice) -> usize {
        self.notices_for(player_id)
            .iter()
            .filter(|n| *n == notice)
            .count()
    }
}

#[async_trait]
impl PlayerNotifier for RecordingNotifier {
    async fn send_notice(&self, player: &PlayerHandle, notice: Notice) -> Result<()> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((player.id, notice));
        }
        Ok(())
    }
}

/// lobby1 offline, lobby2 online and joinable, lobby3 full
pub fn standard_servers() -> Vec<ServerSnapshot> {
    vec![
        ServerSnapshot::new("survival", true, true),
        ServerSnapshot::new("survival2", true, true),
        ServerSnapshot::new("lobby1", false, true),
        ServerSnapshot::new("lobby2", true, true),
        ServerSnapshot::new("lobby3", true, false),
    ]
}

/// Every configured lobby offline
pub fn no_lobby_servers() -> Vec<ServerSnapshot> {
    vec![
        ServerSnapshot::new("survival", true, true),
        ServerSnapshot::new("lobby1", false, true),
        ServerSnapshot::new("lobby2", false, true),
        ServerSnapshot::new("lobby3", false, true),
    ]
}

pub fn test_player(name: &str) -> PlayerHandle {
    PlayerHandle::new(Uuid::new_v4(), name)
}

/// Coordinator over the default lobby set with recording collaborators
pub fn create_test_system(
    servers: Vec<ServerSnapshot>,
    config: CoordinatorConfig,
) -> (
    TransitCoordinator,
    Arc<RecordingQueueBackend>,
    Arc<RecordingNotifier>,
) {
    let backend = Arc::new(RecordingQueueBackend::new(servers));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = TransitCoordinator::new(
        LobbySelector::from_settings(&LobbySettings::default()),
        backend.clone(),
        notifier.clone(),
        config,
    );
    (coordinator, backend, notifier)
}

/// Fast timings for tests on a real clock
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        advance_delay: Duration::from_millis(200),
        retry: RetryPolicy::fixed(Duration::from_millis(50), 3),
    }
}
