//! Lobby set configuration

use crate::types::LobbyServerDescriptor;
use serde::{Deserialize, Serialize};

/// The `configuration` section: the authoritative lobby set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySettings {
    /// Server name and max players for lobby servers
    pub servers: Vec<LobbyServerDescriptor>,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            servers: (1..=3)
                .map(|i| LobbyServerDescriptor::new(format!("lobby{}", i), 100))
                .collect(),
        }
    }
}

impl LobbySettings {
    pub fn contains(&self, server_name: &str) -> bool {
        self.servers.iter().any(|s| s.server_name == server_name)
    }
}
