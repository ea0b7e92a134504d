//! Status channel
//!
//! Redis pub/sub integration: the data-sync producer publishes
//! `<player-id> <status>` on `playerStatusUpdates` and the listener turns
//! `safe` messages into early advances.

pub mod connection;
pub mod listener;
pub mod message;
pub mod publisher;

pub use listener::{ChannelState, ReconnectPolicy, StatusHandler, StatusListener};
pub use message::{PlayerStatus, StatusEvent, StatusParseError, SAFE_TOKEN, STATUS_TOPIC};
pub use publisher::StatusPublisher;
