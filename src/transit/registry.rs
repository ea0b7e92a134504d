//! Player registry
//!
//! Maps player ids to their transit record. The map itself sits behind a
//! `std::sync::RwLock` that is only held for lookups and inserts; each
//! record has its own async mutex so every update for one player is
//! applied in order, including the ones made by timer tasks and the
//! status listener.

use crate::error::{Result, TransitError};
use crate::transit::schedule::{ScheduledTask, TaskKind};
use crate::types::{PlayerHandle, PlayerId, PlayerTransitState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Shared, individually locked player record
pub type PlayerSlot = Arc<Mutex<PlayerRecord>>;

/// Transit state of one player plus the task pending for it
#[derive(Debug)]
pub struct PlayerRecord {
    pub state: PlayerTransitState,
    pending: Option<ScheduledTask>,
    departed: bool,
}

impl PlayerRecord {
    fn new(state: PlayerTransitState) -> Self {
        Self {
            state,
            pending: None,
            departed: false,
        }
    }

    /// Set the pending task, aborting whatever was pending before
    pub fn replace_pending(&mut self, task: ScheduledTask) {
        if let Some(previous) = self.pending.replace(task) {
            previous.cancel();
        }
    }

    /// Abort the pending task, returning whether there was one
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Called from inside a firing task. Clears the pending slot without
    /// aborting it when it is the task that fired; returns false when the
    /// task has been superseded.
    pub fn take_fired(&mut self, kind: TaskKind, episode: u64) -> bool {
        match &self.pending {
            Some(task) if task.matches(kind, episode) => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Detach the pending task without aborting it
    pub fn take_pending(&mut self) -> Option<ScheduledTask> {
        self.pending.take()
    }

    pub fn pending_kind(&self) -> Option<TaskKind> {
        self.pending.as_ref().map(|task| task.kind())
    }

    /// The record was removed from the registry (player disconnected)
    pub fn is_departed(&self) -> bool {
        self.departed
    }

    /// Current player handle
    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle::new(self.state.id, self.state.display_name.clone())
    }
}

/// Concurrent map of player id to record
#[derive(Clone, Default)]
pub struct PlayerRegistry {
    players: Arc<RwLock<HashMap<PlayerId, PlayerSlot>>>,
    next_session: Arc<AtomicU64>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the player's record, creating it if absent
    ///
    /// Two concurrent callers always receive the same slot.
    pub fn get_or_create(&self, player: &PlayerHandle) -> Result<PlayerSlot> {
        if let Some(slot) = self.get(player.id)? {
            return Ok(slot);
        }

        let mut players = self
            .players
            .write()
            .map_err(|_| TransitError::InternalError {
                message: "Failed to acquire player registry write lock".to_string(),
            })?;

        let slot = players.entry(player.id).or_insert_with(|| {
            let session = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(
                "Created transit record for player {} ({}), session {}",
                player.id, player.display_name, session
            );
            Arc::new(Mutex::new(PlayerRecord::new(PlayerTransitState::new(
                player, session,
            ))))
        });

        Ok(slot.clone())
    }

    /// Get the player's record without creating one
    pub fn get(&self, player_id: PlayerId) -> Result<Option<PlayerSlot>> {
        let players = self
            .players
            .read()
            .map_err(|_| TransitError::InternalError {
                message: "Failed to acquire player registry read lock".to_string(),
            })?;
        Ok(players.get(&player_id).cloned())
    }

    /// Remove the player's record and cancel its pending task
    ///
    /// Anyone still holding the slot will see it as departed.
    pub async fn remove(&self, player_id: PlayerId) -> Result<Option<PlayerTransitState>> {
        let slot = {
            let mut players = self
                .players
                .write()
                .map_err(|_| TransitError::InternalError {
                    message: "Failed to acquire player registry write lock".to_string(),
                })?;
            players.remove(&player_id)
        };

        let Some(slot) = slot else {
            return Ok(None);
        };

        let mut record = slot.lock().await;
        record.departed = true;
        if record.cancel_pending() {
            debug!("Cancelled pending task for departing player {}", player_id);
        }
        Ok(Some(record.state.clone()))
    }

    pub fn contains(&self, player_id: PlayerId) -> Result<bool> {
        Ok(self.get(player_id)?.is_some())
    }

    /// Number of tracked players
    pub fn len(&self) -> Result<usize> {
        let players = self
            .players
            .read()
            .map_err(|_| TransitError::InternalError {
                message: "Failed to acquire player registry read lock".to_string(),
            })?;
        Ok(players.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of the player's current state
    pub async fn snapshot(&self, player_id: PlayerId) -> Result<Option<PlayerTransitState>> {
        match self.get(player_id)? {
            Some(slot) => Ok(Some(slot.lock().await.state.clone())),
            None => Ok(None),
        }
    }

    fn slots(&self) -> Result<Vec<PlayerSlot>> {
        let players = self
            .players
            .read()
            .map_err(|_| TransitError::InternalError {
                message: "Failed to acquire player registry read lock".to_string(),
            })?;
        Ok(players.values().cloned().collect())
    }

    /// Abort every pending task, returning how many were cancelled
    pub async fn cancel_all_pending(&self) -> Result<usize> {
        let mut cancelled = 0;
        for slot in self.slots()? {
            if slot.lock().await.cancel_pending() {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}
