//! Status channel wire format
//!
//! Messages on the `playerStatusUpdates` topic are `<player-uuid> <status>`:
//! exactly two tokens separated by ASCII whitespace. The `safe` token marks
//! a player whose data sync has finished; any other token is carried
//! through as [`PlayerStatus::Other`]. A colon-joined form is not accepted.

use crate::error::TransitError;
use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Topic the data-sync producer publishes on
pub const STATUS_TOPIC: &str = "playerStatusUpdates";

/// Token meaning the player's data is safe to move
pub const SAFE_TOKEN: &str = "safe";

/// Status reported for a player
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    Safe,
    Other(String),
}

impl PlayerStatus {
    pub fn from_token(token: &str) -> Self {
        if token == SAFE_TOKEN {
            PlayerStatus::Safe
        } else {
            PlayerStatus::Other(token.to_string())
        }
    }

    pub fn token(&self) -> &str {
        match self {
            PlayerStatus::Safe => SAFE_TOKEN,
            PlayerStatus::Other(token) => token,
        }
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// One decoded status message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub player_id: PlayerId,
    pub status: PlayerStatus,
}

/// Why a payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("empty status message")]
    Empty,

    #[error("status message has no status token")]
    MissingStatus,

    #[error("invalid player id: {value}")]
    InvalidPlayerId { value: String },

    #[error("unexpected trailing tokens after status")]
    TrailingTokens,
}

impl From<StatusParseError> for TransitError {
    fn from(error: StatusParseError) -> Self {
        TransitError::MalformedStatusMessage {
            reason: error.to_string(),
        }
    }
}

impl StatusEvent {
    pub fn new(player_id: PlayerId, status: PlayerStatus) -> Self {
        Self { player_id, status }
    }

    /// Decode a channel payload
    pub fn parse(payload: &str) -> Result<Self, StatusParseError> {
        let mut tokens = payload.split_whitespace();

        let id = tokens.next().ok_or(StatusParseError::Empty)?;
        let status = tokens.next().ok_or(StatusParseError::MissingStatus)?;
        if tokens.next().is_some() {
            return Err(StatusParseError::TrailingTokens);
        }

        let player_id = Uuid::parse_str(id).map_err(|_| StatusParseError::InvalidPlayerId {
            value: id.to_string(),
        })?;

        Ok(Self {
            player_id,
            status: PlayerStatus::from_token(status),
        })
    }

    /// Encode as a channel payload
    pub fn encode(&self) -> String {
        format!("{} {}", self.player_id, self.status.token())
    }
}
