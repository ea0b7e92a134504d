//! Delayed one-shot tasks for a player
//!
//! Two kinds of work are ever pending for a player: the post-arrival
//! advance and a lobby placement retry. Each spawned task carries the
//! episode it was scheduled for so the record can tell whether a firing
//! task is still the one it is waiting on.

use crate::utils::backoff_delay;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// What a scheduled task will do when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Send a parked player on to their desired server
    Advance,
    /// Try lobby placement again after no lobby was available
    PlacementRetry,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Advance => write!(f, "advance"),
            TaskKind::PlacementRetry => write!(f, "placement-retry"),
        }
    }
}

/// Handle to a spawned delayed task
#[derive(Debug)]
pub struct ScheduledTask {
    kind: TaskKind,
    episode: u64,
    due: Instant,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// When the task is due to fire
    pub fn due(&self) -> Instant {
        self.due
    }

    pub fn matches(&self, kind: TaskKind, episode: u64) -> bool {
        self.kind == kind && self.episode == episode
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task; a no-op if it already ran
    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Bounded exponential backoff for lobby placement retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Retries allowed per episode before it is abandoned
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy with the given bound
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delay before the 1-based `attempt`, or `None` once the bound is spent
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(backoff_delay(
            self.initial_delay,
            self.multiplier,
            self.max_delay,
            attempt,
        ))
    }
}

/// Spawns cancellable delayed tasks on the current tokio runtime
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `task` once after `delay`
    pub fn schedule_after<F>(
        &self,
        kind: TaskKind,
        episode: u64,
        delay: Duration,
        task: F,
    ) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let due = Instant::now() + delay;
        debug!("Scheduling {} for episode {} in {:?}", kind, episode, delay);

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            task.await;
        });

        ScheduledTask {
            kind,
            episode,
            due,
            handle,
        }
    }

    /// Schedule placement retry number `attempt`, unless the policy's bound
    /// has been reached
    pub fn schedule_retry<F>(&self, episode: u64, attempt: u32, task: F) -> Option<ScheduledTask>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.policy.delay_for(attempt)?;
        Some(self.schedule_after(TaskKind::PlacementRetry, episode, delay, task))
    }
}
