//! Service wiring and lifecycle
//!
//! `TransitService` is what a host proxy constructs once at startup: it
//! loads configuration, builds the coordinator and, when a `redis` section
//! is present, the status listener. Event callbacks go to
//! [`TransitService::coordinator`].

use crate::backend::{PlayerNotifier, QueueBackend};
use crate::config::{validate_config, AppConfig, ConfigStore};
use crate::metrics::MetricsCollector;
use crate::status::StatusListener;
use crate::transit::TransitCoordinator;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Status channel error: {message}")]
    StatusChannel { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// The running lobby transit module
pub struct TransitService {
    /// Loaded configuration
    config: AppConfig,

    /// Coordinator receiving host proxy events
    coordinator: TransitCoordinator,

    /// Metrics shared by every component
    metrics_collector: Arc<MetricsCollector>,

    /// Status listener, until it is spawned
    listener: Option<StatusListener>,

    /// Stops the status listener
    listener_token: Option<CancellationToken>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl TransitService {
    /// Build the service from an already loaded configuration
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn QueueBackend>,
        notifier: Arc<dyn PlayerNotifier>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing lobby transit service");

        if let Err(e) = validate_config(&config) {
            error!("Invalid configuration, disabling lobby transit: {}", e);
            return Err(ServiceError::Configuration {
                message: e.to_string(),
            });
        }

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let coordinator = TransitCoordinator::from_config(
            &config,
            backend,
            notifier,
            metrics_collector.clone(),
        );
        info!(
            "Configured lobbies: {}",
            coordinator
                .selector()
                .descriptors()
                .iter()
                .map(|lobby| lobby.server_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let listener = match &config.redis {
            Some(redis) => {
                info!(
                    "Status channel configured at {}:{} (database {})",
                    redis.host, redis.port, redis.database
                );
                let listener = StatusListener::new(
                    redis,
                    Arc::new(coordinator.clone()),
                    coordinator.channel_state(),
                    metrics_collector.clone(),
                )
                .map_err(|e| ServiceError::StatusChannel {
                    message: e.to_string(),
                })?;
                Some(listener)
            }
            None => {
                info!("No status channel configured, running in timer-only mode");
                None
            }
        };

        Ok(Self {
            config,
            coordinator,
            metrics_collector,
            listener,
            listener_token: None,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Load `<dir>/config.json`, creating it with defaults on first start,
    /// and build the service
    pub fn from_config_dir(
        dir: impl AsRef<Path>,
        backend: Arc<dyn QueueBackend>,
        notifier: Arc<dyn PlayerNotifier>,
    ) -> Result<Self, ServiceError> {
        let store = ConfigStore::new(dir.as_ref());
        let config = store.load_or_init().map_err(|e| {
            error!(
                "Failed to load {}, disabling lobby transit: {}",
                store.path().display(),
                e
            );
            ServiceError::Configuration {
                message: e.to_string(),
            }
        })?;

        Self::new(config, backend, notifier)
    }

    /// Start the status listener and maintenance tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if *self.is_running.read().await {
            return Err(ServiceError::Initialization {
                message: "Service is already running".to_string(),
            });
        }
        info!("Starting lobby transit service");

        // Mark as running
        *self.is_running.write().await = true;

        if let Some(listener) = self.listener.take() {
            self.listener_token = Some(listener.cancellation_token());
            self.background_tasks.push(listener.spawn());
            info!("Status channel listener started");
        }

        self.start_uptime_task();

        info!("Lobby transit service started successfully");
        Ok(())
    }

    /// Stop the listener and cancel every pending player task
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of lobby transit service");

        // Mark as not running
        *self.is_running.write().await = false;

        if let Some(token) = self.listener_token.take() {
            token.cancel();
        }

        self.coordinator
            .shutdown()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to cancel pending tasks: {}", e),
            })?;

        self.stop_background_tasks().await;

        match self.coordinator.stats() {
            Ok(stats) => info!("Final transit statistics: {:?}", stats),
            Err(e) => warn!("Failed to get final stats: {}", e),
        }
        info!("Lobby transit service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Coordinator to forward host proxy events to
    pub fn coordinator(&self) -> &TransitCoordinator {
        &self.coordinator
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn status_channel_enabled(&self) -> bool {
        self.config.status_channel_enabled()
    }

    pub fn status_channel_connected(&self) -> bool {
        self.coordinator.channel_state().is_connected()
    }

    fn start_uptime_task(&mut self) {
        let is_running = self.is_running.clone();
        let metrics = self.metrics_collector.clone();
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            while *is_running.read().await {
                interval.tick().await;
                metrics
                    .service()
                    .uptime_seconds
                    .set(started.elapsed().as_secs() as i64);
            }
        });
        self.background_tasks.push(handle);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            debug!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            if task.is_finished() {
                continue;
            }
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
            // Aborted tasks resolve with a cancellation error
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        info!("All {} background tasks stopped", task_count);
    }
}
