//! Lobby transit core
//!
//! Registry of per-player state, lobby selection, delayed tasks, and the
//! coordinator tying them to host proxy events.

pub mod coordinator;
pub mod registry;
pub mod schedule;
pub mod selector;

pub use coordinator::{CoordinatorConfig, CoordinatorStats, TransitCoordinator};
pub use registry::{PlayerRecord, PlayerRegistry, PlayerSlot};
pub use schedule::{RetryPolicy, RetryScheduler, ScheduledTask, TaskKind};
pub use selector::LobbySelector;
