//! Lobby Transit - detour coordinator for multi-server game proxies
//!
//! When a player asks to join a backend server, this crate parks them on a
//! configured lobby server first and moves them on once their data sync has
//! had time to finish, either after a fixed delay or when a "safe" signal
//! arrives over the Redis status channel.

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod status;
pub mod transit;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{Result, TransitError};
pub use types::*;

// Re-export key components
pub use backend::{PlayerNotifier, QueueBackend};
pub use transit::{LobbySelector, PlayerRegistry, RetryPolicy, TransitCoordinator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
