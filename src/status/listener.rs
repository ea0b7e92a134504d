//! Status channel subscriber
//!
//! Runs as one supervised task: connect, subscribe to the status topic,
//! hand every decoded message to a [`StatusHandler`]. When the connection
//! fails or the stream ends it reconnects with capped exponential backoff
//! until cancelled. A bad payload is logged and dropped; it never ends
//! the loop.

use crate::config::RedisSettings;
use crate::error::{Result, TransitError};
use crate::metrics::MetricsCollector;
use crate::status::connection::open_client;
use crate::status::message::{PlayerStatus, StatusEvent, StatusParseError, STATUS_TOPIC};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives decoded status messages
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Handle one status message
    async fn handle_status(&self, event: StatusEvent) -> Result<()>;

    /// Handle a payload that could not be decoded
    async fn handle_error(&self, error: StatusParseError, payload: &str) {
        debug!("Unhandled malformed status payload {:?}: {}", payload, error);
    }
}

/// Whether the status channel is currently subscribed
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    connected: Arc<AtomicBool>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// Reconnect backoff for the listener
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RedisSettings> for ReconnectPolicy {
    fn from(settings: &RedisSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_initial_delay(),
            max_delay: settings.reconnect_max_delay(),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

/// Long-lived subscriber on the status topic
pub struct StatusListener {
    client: redis::Client,
    reconnect: ReconnectPolicy,
    handler: Arc<dyn StatusHandler>,
    state: ChannelState,
    metrics_collector: Arc<MetricsCollector>,
    shutdown: CancellationToken,
}

impl StatusListener {
    /// Create a listener; nothing connects until [`StatusListener::run`]
    pub fn new(
        settings: &RedisSettings,
        handler: Arc<dyn StatusHandler>,
        state: ChannelState,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        Ok(Self {
            client: open_client(settings)?,
            reconnect: ReconnectPolicy::from(settings),
            handler,
            state,
            metrics_collector,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the listener when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Run the listener on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Supervise the subscription until cancelled
    pub async fn run(self) {
        let mut delay = self.reconnect.initial_delay;
        info!("Starting status channel listener on topic {}", STATUS_TOPIC);

        loop {
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                outcome = self.consume(&mut delay) => outcome,
            };
            self.set_connected(false);

            match outcome {
                Ok(()) => warn!("Status channel subscription ended"),
                Err(e) => warn!("Status channel error: {}", e),
            }

            info!("Reconnecting to status channel in {:?}", delay);
            self.metrics_collector.record_reconnect();
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.reconnect.next_delay(delay);
        }

        self.set_connected(false);
        info!("Status channel listener stopped");
    }

    /// One connect-subscribe-consume cycle
    async fn consume(&self, delay: &mut Duration) -> Result<()> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            TransitError::StatusChannelFailed {
                message: format!("Failed to connect: {}", e),
            }
        })?;
        pubsub
            .subscribe(STATUS_TOPIC)
            .await
            .map_err(|e| TransitError::StatusChannelFailed {
                message: format!("Failed to subscribe to {}: {}", STATUS_TOPIC, e),
            })?;

        self.set_connected(true);
        *delay = self.reconnect.initial_delay;
        info!("Subscribed to status channel {}", STATUS_TOPIC);

        let messages = pubsub.on_message();
        tokio::pin!(messages);
        while let Some(message) = messages.next().await {
            match message.get_payload::<String>() {
                Ok(payload) => self.dispatch(&payload).await,
                Err(e) => {
                    warn!("Discarding non-text status message: {}", e);
                    self.metrics_collector.record_status_message("malformed");
                }
            }
        }

        Ok(())
    }

    /// Decode one payload and pass it on
    pub async fn dispatch(&self, payload: &str) {
        match StatusEvent::parse(payload) {
            Ok(event) => {
                let result = match event.status {
                    PlayerStatus::Safe => "accepted",
                    PlayerStatus::Other(_) => "ignored",
                };
                self.metrics_collector.record_status_message(result);
                debug!(
                    "Status {} received for player {}",
                    event.status, event.player_id
                );

                let player_id = event.player_id;
                if let Err(e) = self.handler.handle_status(event).await {
                    warn!("Failed to handle status for player {}: {}", player_id, e);
                }
            }
            Err(e) => {
                warn!("Discarding malformed status message {:?}: {}", payload, e);
                self.metrics_collector.record_status_message("malformed");
                self.handler.handle_error(e, payload).await;
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        self.state.set_connected(connected);
        self.metrics_collector.set_channel_connected(connected);
    }
}
