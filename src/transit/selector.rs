//! Lobby selection
//!
//! First-fit over the queue subsystem's server list: the first entry that
//! is a configured lobby, online, and joinable for the player wins. This
//! is deterministic but not load-balanced; `maxPlayers` is informational
//! and capacity is left to the subsystem's `joinable` flag.

use crate::backend::QueueBackend;
use crate::config::LobbySettings;
use crate::types::{
    LobbyServerDescriptor, PlayerHandle, PlayerTransitState, ServerSnapshot, TransitPhase,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Picks a lobby for a player from the configured lobby set
#[derive(Debug, Clone)]
pub struct LobbySelector {
    lobbies: Vec<LobbyServerDescriptor>,
    by_name: HashMap<String, usize>,
}

impl LobbySelector {
    pub fn new(lobbies: Vec<LobbyServerDescriptor>) -> Self {
        let by_name = lobbies
            .iter()
            .enumerate()
            .map(|(index, lobby)| (lobby.server_name.clone(), index))
            .collect();
        Self { lobbies, by_name }
    }

    pub fn from_settings(settings: &LobbySettings) -> Self {
        Self::new(settings.servers.clone())
    }

    /// Whether `server` is one of the configured lobbies
    pub fn is_lobby(&self, server: &str) -> bool {
        self.by_name.contains_key(server)
    }

    pub fn descriptor(&self, server: &str) -> Option<&LobbyServerDescriptor> {
        self.by_name.get(server).map(|&index| &self.lobbies[index])
    }

    pub fn descriptors(&self) -> &[LobbyServerDescriptor] {
        &self.lobbies
    }

    /// First candidate in `servers` order
    pub fn pick(&self, servers: &[ServerSnapshot]) -> Option<&LobbyServerDescriptor> {
        servers
            .iter()
            .filter(|server| server.online && server.joinable)
            .find_map(|server| self.descriptor(&server.name))
    }

    /// Ask the backend for live servers and pick a lobby for `player`
    ///
    /// On success the placement is committed to `state` in the same step:
    /// `desired_server` becomes `requested`, `placement_lobby` the chosen
    /// lobby and the phase `AwaitingLobbyPlacement`. The caller holds the
    /// record lock for the whole call. A listing failure counts as no lobby
    /// being available.
    pub async fn select_lobby(
        &self,
        backend: &dyn QueueBackend,
        player: &PlayerHandle,
        state: &mut PlayerTransitState,
        requested: &str,
    ) -> Option<LobbyServerDescriptor> {
        let servers = match backend.list_servers(player).await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(
                    "Failed to list servers for player {} ({}): {}",
                    player.id, player.display_name, e
                );
                return None;
            }
        };

        let Some(lobby) = self.pick(&servers).cloned() else {
            debug!(
                "No configured lobby is online and joinable for player {} among {} servers",
                player.id,
                servers.len()
            );
            return None;
        };

        state.desired_server = Some(requested.to_string());
        state.placement_lobby = Some(lobby.server_name.clone());
        state.transition(TransitPhase::AwaitingLobbyPlacement);

        info!(
            "Selected lobby {} for player {} ({}), desired server {}",
            lobby.server_name, player.id, player.display_name, requested
        );
        Some(lobby)
    }
}
