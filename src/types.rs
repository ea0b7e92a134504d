//! Common types used throughout the transit coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a proxy player
pub type PlayerId = Uuid;

/// Name of a backend server as known to the proxy
pub type ServerName = String;

/// Identity of a player as delivered by host proxy events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerHandle {
    pub id: PlayerId,
    pub display_name: String,
}

impl PlayerHandle {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// A configured lobby server
///
/// Field names follow the `configuration.servers` entries of the JSON config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyServerDescriptor {
    pub server_name: ServerName,
    pub max_players: u32,
}

impl LobbyServerDescriptor {
    pub fn new(server_name: impl Into<String>, max_players: u32) -> Self {
        Self {
            server_name: server_name.into(),
            max_players,
        }
    }
}

/// Live status of one server as reported by the queue subsystem
///
/// `joinable` is evaluated for the player the listing was requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub name: ServerName,
    pub online: bool,
    pub joinable: bool,
}

impl ServerSnapshot {
    pub fn new(name: impl Into<String>, online: bool, joinable: bool) -> Self {
        Self {
            name: name.into(),
            online,
            joinable,
        }
    }
}

/// Position of a player within a transit episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitPhase {
    /// No episode in progress
    Unrouted,
    /// Waiting for a lobby connect to land, or for a placement retry
    AwaitingLobbyPlacement,
    /// Parked on a lobby, advance timer pending
    AtLobby,
    /// Parked on a lobby, timer pending and status channel listening
    AwaitingSafeSignal,
    /// Advance to the desired server has been issued (episode done)
    Redirected,
    /// Placement retries exhausted (episode failed)
    Abandoned,
}

impl TransitPhase {
    /// Parked on a lobby and waiting to be advanced
    pub fn is_parked(&self) -> bool {
        matches!(self, TransitPhase::AtLobby | TransitPhase::AwaitingSafeSignal)
    }
}

impl std::fmt::Display for TransitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitPhase::Unrouted => write!(f, "Unrouted"),
            TransitPhase::AwaitingLobbyPlacement => write!(f, "AwaitingLobbyPlacement"),
            TransitPhase::AtLobby => write!(f, "AtLobby"),
            TransitPhase::AwaitingSafeSignal => write!(f, "AwaitingSafeSignal"),
            TransitPhase::Redirected => write!(f, "Redirected"),
            TransitPhase::Abandoned => write!(f, "Abandoned"),
        }
    }
}

/// Per-player transit bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerTransitState {
    pub id: PlayerId,
    pub display_name: String,
    /// Server the player is on, or was on most recently
    pub last_server: Option<ServerName>,
    /// Server the player originally asked for
    pub desired_server: Option<ServerName>,
    pub phase: TransitPhase,
    /// Lobby a connect has been issued to and not yet landed on
    pub placement_lobby: Option<ServerName>,
    /// Placement retries already scheduled in the current episode
    pub retry_attempt: u32,
    /// Incremented every time a new episode starts
    pub episode: u64,
    /// Registry-assigned id of this record; a re-created record gets a new one
    pub session: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerTransitState {
    pub fn new(player: &PlayerHandle, session: u64) -> Self {
        let now = Utc::now();
        Self {
            id: player.id,
            display_name: player.display_name.clone(),
            last_server: None,
            desired_server: None,
            phase: TransitPhase::Unrouted,
            placement_lobby: None,
            retry_attempt: 0,
            episode: 0,
            session,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new phase and stamp the update time
    pub fn transition(&mut self, phase: TransitPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Start a new episode, invalidating anything scheduled for the old one
    pub fn begin_episode(&mut self) -> u64 {
        self.episode += 1;
        self.retry_attempt = 0;
        self.placement_lobby = None;
        self.episode
    }
}

/// Outcome of a pre-routing request handed back to the host proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteDecision {
    /// Let the original request through
    Proceed,
    /// Cancel the original request; the coordinator handles routing
    Suppress,
}

/// What caused a parked player to be advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvanceTrigger {
    Timer,
    Signal,
}

impl AdvanceTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceTrigger::Timer => "timer",
            AdvanceTrigger::Signal => "signal",
        }
    }
}

impl std::fmt::Display for AdvanceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short player-facing message, shown on the action bar by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    RedirectingToLobby { lobby: ServerName },
    NoLobbyAvailable,
    WaitingForSync { target: ServerName },
    PlacementAbandoned,
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::RedirectingToLobby { .. } => "Redirecting to lobby server...".to_string(),
            Notice::NoLobbyAvailable => {
                "No available lobby servers. Please try again later.".to_string()
            }
            Notice::WaitingForSync { target } => {
                format!("Your data is still syncing, you will be sent to {} shortly.", target)
            }
            Notice::PlacementAbandoned => {
                "Could not find a lobby server. Please reconnect or contact staff.".to_string()
            }
        }
    }

    /// RGB colour the host should render the notice in
    pub fn color(&self) -> u32 {
        match self {
            Notice::RedirectingToLobby { .. } | Notice::WaitingForSync { .. } => 0x00FF00,
            Notice::NoLobbyAvailable | Notice::PlacementAbandoned => 0xFF0000,
        }
    }

    pub fn is_error(&self) -> bool {
        self.color() == 0xFF0000
    }
}
