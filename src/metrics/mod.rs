//! Metrics for the lobby-transit coordinator
//!
//! This module provides Prometheus metrics for routing decisions, lobby
//! placements, advances and the status channel.

pub mod collector;

pub use collector::{ChannelMetrics, MetricsCollector, MetricsTimer, ServiceMetrics, TransitMetrics};
