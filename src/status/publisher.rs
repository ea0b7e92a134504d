//! Status publisher
//!
//! Producer side of the status channel. The coordinator never publishes;
//! this exists for the data-sync job and the `status-publisher` tool.

use crate::config::RedisSettings;
use crate::error::{Result, TransitError};
use crate::status::connection::open_client;
use crate::status::message::{PlayerStatus, StatusEvent, STATUS_TOPIC};
use crate::types::PlayerId;
use redis::AsyncCommands;
use tracing::info;

/// Publishes player status messages
pub struct StatusPublisher {
    client: redis::Client,
}

impl StatusPublisher {
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        Ok(Self {
            client: open_client(settings)?,
        })
    }

    /// Publish `status` for `player_id`, returning how many subscribers
    /// received it
    pub async fn publish_status(&self, player_id: PlayerId, status: PlayerStatus) -> Result<u64> {
        self.publish_event(&StatusEvent::new(player_id, status)).await
    }

    pub async fn publish_event(&self, event: &StatusEvent) -> Result<u64> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransitError::StatusChannelFailed {
                message: format!("Failed to connect: {}", e),
            })?;

        let payload = event.encode();
        let receivers: u64 = connection
            .publish(STATUS_TOPIC, &payload)
            .await
            .map_err(|e| TransitError::StatusChannelFailed {
                message: format!("Failed to publish to {}: {}", STATUS_TOPIC, e),
            })?;

        info!(
            "Published status {} for player {} to {} subscribers",
            event.status, event.player_id, receivers
        );
        Ok(receivers)
    }
}
