//! Transit coordinator
//!
//! Owns the per-player state machine and is the only component that
//! reacts to host proxy events:
//!
//! ```text
//! Unrouted -> AwaitingLobbyPlacement -> AtLobby -> AwaitingSafeSignal -> Redirected
//!                      |
//!                      +-> (retries exhausted) Abandoned
//! ```
//!
//! A player asking for a server while not on a lobby is detoured to the
//! first available lobby. Once there, they are advanced to the server they
//! asked for after a fixed delay, or earlier when the status channel says
//! their data is safe.

use crate::backend::{PlayerNotifier, QueueBackend};
use crate::config::AppConfig;
use crate::error::{Result, TransitError};
use crate::metrics::MetricsCollector;
use crate::status::{ChannelState, PlayerStatus, StatusEvent, StatusHandler};
use crate::transit::registry::{PlayerRecord, PlayerRegistry, PlayerSlot};
use crate::transit::schedule::{RetryPolicy, RetryScheduler, ScheduledTask, TaskKind};
use crate::transit::selector::LobbySelector;
use crate::types::{
    AdvanceTrigger, Notice, PlayerHandle, PlayerId, PlayerTransitState, RouteDecision,
    TransitPhase,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Coordinator timings
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// How long a player is held on a lobby before being advanced
    pub advance_delay: Duration,
    /// Placement retry policy when no lobby is available
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            advance_delay: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&AppConfig> for CoordinatorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            advance_delay: config.advance_delay(),
            retry: config.retry_policy(),
        }
    }
}

/// Statistics about coordinator operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Current number of tracked players
    pub tracked_players: usize,
    /// Total route requests seen
    pub route_requests: u64,
    /// Route requests suppressed in favour of a lobby detour
    pub suppressed_requests: u64,
    /// Lobby connects issued
    pub lobby_placements: u64,
    /// Placement attempts that found no lobby
    pub failed_placements: u64,
    /// Advances fired by the delay timer
    pub timer_advances: u64,
    /// Advances fired by a safe signal
    pub signal_advances: u64,
    /// Placement retries that ran
    pub placement_retries: u64,
    /// Episodes abandoned after the retry bound
    pub abandoned_episodes: u64,
    /// Safe signals that found nothing to advance
    pub ignored_signals: u64,
}

/// Which advance an invocation is allowed to perform
#[derive(Debug, Clone, Copy)]
enum AdvanceGuard {
    /// A timer task; only valid while it is still the record's pending task
    Scheduled { session: u64, episode: u64 },
    /// A safe signal; valid whenever the player is parked
    Any,
}

/// The lobby detour coordinator
#[derive(Clone)]
pub struct TransitCoordinator {
    /// Per-player transit records
    registry: PlayerRegistry,
    /// Configured lobby set
    selector: Arc<LobbySelector>,
    /// Spawns advance timers and placement retries
    scheduler: RetryScheduler,
    /// Host queue subsystem
    backend: Arc<dyn QueueBackend>,
    /// Host player messaging
    notifier: Arc<dyn PlayerNotifier>,
    /// Timings
    config: CoordinatorConfig,
    /// Whether the status channel is currently subscribed
    channel: ChannelState,
    /// Coordinator statistics
    stats: Arc<RwLock<CoordinatorStats>>,
    /// Metrics collector for recording transitions
    metrics_collector: Arc<MetricsCollector>,
}

impl TransitCoordinator {
    /// Create a new coordinator
    pub fn new(
        selector: LobbySelector,
        backend: Arc<dyn QueueBackend>,
        notifier: Arc<dyn PlayerNotifier>,
        config: CoordinatorConfig,
    ) -> Self {
        // Create a default metrics collector if none provided
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(selector, backend, notifier, config, metrics_collector)
    }

    /// Create a new coordinator with metrics collector
    pub fn with_metrics(
        selector: LobbySelector,
        backend: Arc<dyn QueueBackend>,
        notifier: Arc<dyn PlayerNotifier>,
        config: CoordinatorConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            selector: Arc::new(selector),
            scheduler: RetryScheduler::new(config.retry.clone()),
            backend,
            notifier,
            config,
            channel: ChannelState::new(),
            stats: Arc::new(RwLock::new(CoordinatorStats::default())),
            metrics_collector,
        }
    }

    /// Create a coordinator from a loaded configuration
    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn QueueBackend>,
        notifier: Arc<dyn PlayerNotifier>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_metrics(
            LobbySelector::from_settings(&config.configuration),
            backend,
            notifier,
            CoordinatorConfig::from(config),
            metrics_collector,
        )
    }

    /// Status channel connection flag, shared with the listener
    pub fn channel_state(&self) -> ChannelState {
        self.channel.clone()
    }

    pub fn selector(&self) -> &LobbySelector {
        &self.selector
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Player logged in to the proxy
    pub async fn on_login(&self, player: &PlayerHandle) -> Result<()> {
        let slot = self.registry.get_or_create(player)?;
        let mut record = slot.lock().await;
        record.state.display_name = player.display_name.clone();
        drop(record);

        info!("Player {} ({}) logged in", player.id, player.display_name);
        self.refresh_tracked();
        Ok(())
    }

    /// Player asked to join `target`
    ///
    /// Returns `Suppress` when the original request must be cancelled
    /// because the coordinator routes the player itself.
    pub async fn on_route_request(
        &self,
        player: &PlayerHandle,
        target: &str,
    ) -> Result<RouteDecision> {
        self.update_stats(|stats| stats.route_requests += 1);

        if self.selector.is_lobby(target) {
            debug!(
                "Player {} requested lobby {} directly, letting it through",
                player.id, target
            );
            return Ok(self.decide(RouteDecision::Proceed));
        }

        let slot = self.registry.get_or_create(player)?;
        self.refresh_tracked();
        let mut record = slot.lock().await;

        if record.is_departed() {
            return Ok(self.decide(RouteDecision::Proceed));
        }

        let on_lobby = record
            .state
            .last_server
            .as_deref()
            .is_some_and(|server| self.selector.is_lobby(server));

        if on_lobby {
            if !record.state.phase.is_parked() {
                return Ok(self.decide(RouteDecision::Proceed));
            }

            // Still waiting for sync; keep them parked and re-target
            record.state.desired_server = Some(target.to_string());
            record.state.updated_at = chrono::Utc::now();
            drop(record);

            info!(
                "Player {} asked for {} while parked on a lobby, re-targeting",
                player.id, target
            );
            self.notify(
                player,
                Notice::WaitingForSync {
                    target: target.to_string(),
                },
            )
            .await;
            return Ok(self.decide(RouteDecision::Suppress));
        }

        if record.state.phase == TransitPhase::AwaitingLobbyPlacement
            && record.state.placement_lobby.is_some()
        {
            debug!(
                "Player {} already on the way to lobby {:?}, updating desired server to {}",
                player.id, record.state.placement_lobby, target
            );
            record.state.desired_server = Some(target.to_string());
            return Ok(self.decide(RouteDecision::Suppress));
        }

        // Fresh episode; anything scheduled for the previous one is void
        if record.cancel_pending() {
            debug!("Cancelled pending task of player {} for a new episode", player.id);
        }
        record.state.begin_episode();
        record.state.desired_server = None;

        info!(
            "Player {} ({}) requested {} from {:?}, redirecting to a lobby first",
            player.id, player.display_name, target, record.state.last_server
        );

        match self.place(&mut record, player, target).await {
            Some(lobby) => {
                let (session, episode) = (record.state.session, record.state.episode);
                drop(record);
                self.connect_to_lobby(player, &lobby, target, session, episode)
                    .await;
            }
            None => {
                let abandoned = self.after_failed_placement(&mut record, player, target);
                drop(record);
                let notice = if abandoned {
                    Notice::PlacementAbandoned
                } else {
                    Notice::NoLobbyAvailable
                };
                self.notify(player, notice).await;
            }
        }

        Ok(self.decide(RouteDecision::Suppress))
    }

    /// Player landed on `server`
    pub async fn on_arrived_at_server(&self, player: &PlayerHandle, server: &str) -> Result<()> {
        let slot = self.registry.get_or_create(player)?;
        self.refresh_tracked();
        let mut record = slot.lock().await;

        if record.is_departed() {
            return Ok(());
        }

        record.state.last_server = Some(server.to_string());
        record.state.updated_at = chrono::Utc::now();
        info!(
            "Player {} ({}) connected to {}",
            player.id, player.display_name, server
        );

        if self.selector.is_lobby(server) {
            record.state.placement_lobby = None;

            let desired = record.state.desired_server.clone();
            match desired {
                Some(desired)
                    if !self.selector.is_lobby(&desired)
                        && !record.state.phase.is_parked()
                        && record.state.phase != TransitPhase::Abandoned =>
                {
                    self.park(&mut record, server, &desired);
                }
                _ => debug!(
                    "Player {} on lobby {} with nothing to advance to ({})",
                    player.id, server, record.state.phase
                ),
            }
        } else if record.state.phase.is_parked() {
            // Left the lobby some other way; the pending advance is moot
            record.cancel_pending();
            let reached_desired = record.state.desired_server.as_deref() == Some(server);
            let phase = if reached_desired {
                TransitPhase::Redirected
            } else {
                TransitPhase::Unrouted
            };
            record.state.transition(phase);
            debug!(
                "Player {} left the lobby for {} before being advanced, now {}",
                player.id, server, phase
            );
        }

        Ok(())
    }

    /// The status channel reported `player_id` as safe
    ///
    /// Returns whether an advance was issued. Unknown or already advanced
    /// players are ignored.
    pub async fn on_safe_signal(&self, player_id: PlayerId) -> Result<bool> {
        let advanced = self
            .try_advance(player_id, AdvanceGuard::Any, AdvanceTrigger::Signal)
            .await?;
        if !advanced {
            debug!("Ignoring safe signal for player {}", player_id);
            self.update_stats(|stats| stats.ignored_signals += 1);
        }
        Ok(advanced)
    }

    /// Player left the proxy
    pub async fn on_disconnect(&self, player_id: PlayerId) -> Result<()> {
        match self.registry.remove(player_id).await? {
            Some(state) => info!(
                "Player {} ({}) disconnected in phase {}",
                player_id, state.display_name, state.phase
            ),
            None => debug!("Disconnect for untracked player {}", player_id),
        }
        self.refresh_tracked();
        Ok(())
    }

    /// Current state of one player
    pub async fn snapshot(&self, player_id: PlayerId) -> Result<Option<PlayerTransitState>> {
        self.registry.snapshot(player_id).await
    }

    /// Current state of a player that must be tracked
    pub async fn require_state(&self, player_id: PlayerId) -> Result<PlayerTransitState> {
        self.snapshot(player_id).await?.ok_or_else(|| {
            TransitError::PlayerNotFound {
                player_id: player_id.to_string(),
            }
            .into()
        })
    }

    /// Get coordinator statistics
    pub fn stats(&self) -> Result<CoordinatorStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| TransitError::InternalError {
                message: "Failed to acquire stats read lock".to_string(),
            })?
            .clone();
        stats.tracked_players = self.registry.len()?;
        Ok(stats)
    }

    /// Cancel every pending timer and retry
    pub async fn shutdown(&self) -> Result<()> {
        let cancelled = self.registry.cancel_all_pending().await?;
        info!("Transit coordinator stopped, {} pending tasks cancelled", cancelled);
        Ok(())
    }

    /// Select a lobby for the current episode, committing it to the record
    async fn place(
        &self,
        record: &mut PlayerRecord,
        player: &PlayerHandle,
        target: &str,
    ) -> Option<String> {
        let timer = self.metrics_collector.start_timer();
        let chosen = self
            .selector
            .select_lobby(self.backend.as_ref(), player, &mut record.state, target)
            .await;
        self.metrics_collector
            .record_placement(chosen.is_some(), timer.stop());

        match chosen {
            Some(lobby) => {
                self.update_stats(|stats| stats.lobby_placements += 1);
                Some(lobby.server_name)
            }
            None => {
                self.update_stats(|stats| stats.failed_placements += 1);
                None
            }
        }
    }

    /// Issue the lobby connect, outside the record lock
    async fn connect_to_lobby(
        &self,
        player: &PlayerHandle,
        lobby: &str,
        target: &str,
        session: u64,
        episode: u64,
    ) {
        match self.backend.connect(player, lobby).await {
            Ok(()) => {
                info!(
                    "Redirecting player {} ({}) to lobby {}",
                    player.id, player.display_name, lobby
                );
                self.notify(
                    player,
                    Notice::RedirectingToLobby {
                        lobby: lobby.to_string(),
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(
                    "Failed to connect player {} to lobby {}: {}",
                    player.id, lobby, e
                );
                if let Err(e) = self
                    .recover_failed_connect(player, lobby, target, session, episode)
                    .await
                {
                    warn!("Could not reschedule placement for player {}: {}", player.id, e);
                }
            }
        }
    }

    /// Treat a failed lobby connect like an unavailable lobby
    async fn recover_failed_connect(
        &self,
        player: &PlayerHandle,
        lobby: &str,
        target: &str,
        session: u64,
        episode: u64,
    ) -> Result<()> {
        let Some(slot) = self.registry.get(player.id)? else {
            return Ok(());
        };
        let mut record = slot.lock().await;

        let still_placing = !record.is_departed()
            && record.state.session == session
            && record.state.episode == episode
            && record.state.phase == TransitPhase::AwaitingLobbyPlacement
            && record.state.placement_lobby.as_deref() == Some(lobby);
        if !still_placing {
            return Ok(());
        }

        let first_failure = record.state.retry_attempt == 0;
        let abandoned = self.after_failed_placement(&mut record, player, target);
        drop(record);

        if abandoned {
            self.notify(player, Notice::PlacementAbandoned).await;
        } else if first_failure {
            self.notify(player, Notice::NoLobbyAvailable).await;
        }
        Ok(())
    }

    /// Schedule the next placement retry or abandon the episode
    ///
    /// Returns true when the episode was abandoned.
    fn after_failed_placement(
        &self,
        record: &mut PlayerRecord,
        player: &PlayerHandle,
        target: &str,
    ) -> bool {
        record.state.placement_lobby = None;
        let attempt = record.state.retry_attempt + 1;
        let (session, episode) = (record.state.session, record.state.episode);

        let this = self.clone();
        let retry_player = player.clone();
        let retry_target = target.to_string();
        let scheduled = self.scheduler.schedule_retry(episode, attempt, async move {
            this.run_placement_retry(retry_player, retry_target, session, episode)
                .await;
        });

        match scheduled {
            Some(task) => {
                info!(
                    "No lobby available for player {}, retry {} of {} in {:?}",
                    player.id,
                    attempt,
                    self.scheduler.policy().max_attempts,
                    task.due().saturating_duration_since(tokio::time::Instant::now())
                );
                record.state.retry_attempt = attempt;
                record.state.transition(TransitPhase::AwaitingLobbyPlacement);
                record.replace_pending(task);
                false
            }
            None => {
                record.cancel_pending();
                record.state.desired_server = None;
                record.state.transition(TransitPhase::Abandoned);
                error!(
                    "Abandoning lobby placement for player {} ({}) after {} retries, requested server {}",
                    player.id,
                    player.display_name,
                    record.state.retry_attempt,
                    target
                );
                self.metrics_collector.record_abandoned();
                self.update_stats(|stats| stats.abandoned_episodes += 1);
                true
            }
        }
    }

    async fn run_placement_retry(
        self,
        player: PlayerHandle,
        target: String,
        session: u64,
        episode: u64,
    ) {
        if let Err(e) = self
            .retry_placement(&player, &target, session, episode)
            .await
        {
            warn!("Placement retry failed for player {}: {}", player.id, e);
        }
    }

    async fn retry_placement(
        &self,
        player: &PlayerHandle,
        target: &str,
        session: u64,
        episode: u64,
    ) -> Result<()> {
        let Some(slot) = self.registry.get(player.id)? else {
            return Ok(());
        };
        let mut record = slot.lock().await;

        if record.is_departed()
            || record.state.session != session
            || !record.take_fired(TaskKind::PlacementRetry, episode)
            || record.state.phase != TransitPhase::AwaitingLobbyPlacement
        {
            debug!("Stale placement retry for player {}", player.id);
            return Ok(());
        }

        self.metrics_collector.record_retry();
        self.update_stats(|stats| stats.placement_retries += 1);
        debug!(
            "Retrying lobby placement for player {} (attempt {})",
            player.id, record.state.retry_attempt
        );

        // Already landed on a lobby in the meantime
        if let Some(current) = record.state.last_server.clone() {
            if self.selector.is_lobby(&current) {
                record.state.desired_server = Some(target.to_string());
                self.park(&mut record, &current, target);
                return Ok(());
            }
        }

        match self.place(&mut record, player, target).await {
            Some(lobby) => {
                drop(record);
                self.connect_to_lobby(player, &lobby, target, session, episode)
                    .await;
            }
            None => {
                let abandoned = self.after_failed_placement(&mut record, player, target);
                drop(record);
                if abandoned {
                    self.notify(player, Notice::PlacementAbandoned).await;
                }
            }
        }
        Ok(())
    }

    /// Hold the player on `lobby` and schedule the advance to `desired`
    fn park(&self, record: &mut PlayerRecord, lobby: &str, desired: &str) {
        self.schedule_advance(record);

        let phase = if self.channel.is_connected() {
            TransitPhase::AwaitingSafeSignal
        } else {
            TransitPhase::AtLobby
        };
        record.state.transition(phase);

        info!(
            "Player {} parked on lobby {}, advancing to {} in {:?} ({})",
            record.state.id, lobby, desired, self.config.advance_delay, phase
        );
    }

    /// Arm the advance timer for the record's current episode
    fn schedule_advance(&self, record: &mut PlayerRecord) {
        let (session, episode) = (record.state.session, record.state.episode);
        let player_id = record.state.id;

        let this = self.clone();
        let task = self.scheduler.schedule_after(
            TaskKind::Advance,
            episode,
            self.config.advance_delay,
            async move {
                this.run_scheduled_advance(player_id, session, episode).await;
            },
        );
        record.replace_pending(task);
    }

    async fn run_scheduled_advance(self, player_id: PlayerId, session: u64, episode: u64) {
        let guard = AdvanceGuard::Scheduled { session, episode };
        if let Err(e) = self
            .try_advance(player_id, guard, AdvanceTrigger::Timer)
            .await
        {
            warn!("Scheduled advance failed for player {}: {}", player_id, e);
        }
    }

    /// Send a parked player on to their desired server
    async fn try_advance(
        &self,
        player_id: PlayerId,
        guard: AdvanceGuard,
        trigger: AdvanceTrigger,
    ) -> Result<bool> {
        let Some(slot) = self.registry.get(player_id)? else {
            return Ok(false);
        };
        let mut record = slot.lock().await;

        if record.is_departed() {
            return Ok(false);
        }
        if let AdvanceGuard::Scheduled { session, episode } = guard {
            if record.state.session != session || !record.take_fired(TaskKind::Advance, episode) {
                debug!("Stale advance timer for player {}", player_id);
                return Ok(false);
            }
        }
        if !record.state.phase.is_parked() {
            return Ok(false);
        }
        let Some(desired) = record.state.desired_server.clone() else {
            return Ok(false);
        };

        // The timer stays armed until the enqueue went through
        let held = match guard {
            AdvanceGuard::Any => record.take_pending(),
            AdvanceGuard::Scheduled { .. } => None,
        };
        let parked_phase = record.state.phase;
        let (session, episode) = (record.state.session, record.state.episode);
        record.state.transition(TransitPhase::Redirected);
        let player = record.handle();
        drop(record);

        if let Err(e) = self.backend.enqueue(&player, &desired).await {
            warn!(
                "Failed to enqueue player {} for {} ({}): {}",
                player_id, desired, trigger, e
            );
            self.restore_parked(slot, session, episode, parked_phase, held)
                .await;
            return Err(TransitError::BackendFailed {
                message: format!("enqueue {} for {}: {}", desired, player_id, e),
            }
            .into());
        }

        if let Some(task) = held {
            task.cancel();
        }
        info!(
            "Advanced player {} ({}) to {} ({})",
            player.id, player.display_name, desired, trigger
        );
        self.metrics_collector.record_advance(trigger);
        self.update_stats(|stats| match trigger {
            AdvanceTrigger::Timer => stats.timer_advances += 1,
            AdvanceTrigger::Signal => stats.signal_advances += 1,
        });
        Ok(true)
    }

    /// Put a player back on the lobby after a failed enqueue
    ///
    /// The held timer is re-armed if it has not fired yet, otherwise a new
    /// one is scheduled. Nothing happens if the record moved on meanwhile.
    async fn restore_parked(
        &self,
        slot: PlayerSlot,
        session: u64,
        episode: u64,
        parked_phase: TransitPhase,
        held: Option<ScheduledTask>,
    ) {
        let mut record = slot.lock().await;

        let unchanged = !record.is_departed()
            && record.state.session == session
            && record.state.episode == episode
            && record.state.phase == TransitPhase::Redirected;
        if !unchanged {
            if let Some(task) = held {
                task.cancel();
            }
            return;
        }

        record.state.transition(parked_phase);
        match held {
            Some(task) if !task.is_finished() => record.replace_pending(task),
            _ => self.schedule_advance(&mut record),
        }
        info!(
            "Player {} kept on lobby {:?} after a failed advance ({})",
            record.state.id, record.state.last_server, parked_phase
        );
    }

    async fn notify(&self, player: &PlayerHandle, notice: Notice) {
        debug!("Sending notice to {}: {}", player.id, notice.text());
        if let Err(e) = self.notifier.send_notice(player, notice).await {
            warn!("Failed to send notice to player {}: {}", player.id, e);
        }
    }

    fn decide(&self, decision: RouteDecision) -> RouteDecision {
        self.metrics_collector.record_route_request(decision);
        if decision == RouteDecision::Suppress {
            self.update_stats(|stats| stats.suppressed_requests += 1);
        }
        decision
    }

    fn refresh_tracked(&self) {
        if let Ok(count) = self.registry.len() {
            self.metrics_collector.set_tracked_players(count);
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut CoordinatorStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[async_trait]
impl StatusHandler for TransitCoordinator {
    async fn handle_status(&self, event: StatusEvent) -> Result<()> {
        match event.status {
            PlayerStatus::Safe => {
                self.on_safe_signal(event.player_id).await?;
            }
            PlayerStatus::Other(token) => {
                debug!(
                    "Ignoring status {} for player {}",
                    token, event.player_id
                );
            }
        }
        Ok(())
    }
}
