//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the lobby-transit
//! coordinator using Prometheus metrics.

use crate::types::{AdvanceTrigger, RouteDecision};
use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the transit coordinator
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Routing and placement metrics
    transit_metrics: TransitMetrics,

    /// Status channel metrics
    channel_metrics: ChannelMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Routing and placement metrics
#[derive(Clone)]
pub struct TransitMetrics {
    /// Route requests by decision (proceed, suppress)
    pub route_requests_total: IntCounterVec,

    /// Lobby placement attempts by outcome (placed, unavailable)
    pub lobby_placements_total: IntCounterVec,

    /// Advances to the desired server by trigger (timer, signal)
    pub advances_total: IntCounterVec,

    /// Placement retries that ran
    pub placement_retries_total: IntCounter,

    /// Episodes abandoned after the retry bound
    pub placements_abandoned_total: IntCounter,

    /// Players currently tracked by the registry
    pub tracked_players: IntGauge,

    /// Time spent listing servers and picking a lobby
    pub placement_duration: Histogram,
}

/// Status channel metrics
#[derive(Clone)]
pub struct ChannelMetrics {
    /// Status messages by result (accepted, ignored, malformed)
    pub status_messages_total: IntCounterVec,

    /// 1 while subscribed, 0 otherwise
    pub connected: IntGauge,

    /// Reconnect attempts after a failure
    pub reconnects_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let transit_metrics = TransitMetrics::new(&registry)?;
        let channel_metrics = ChannelMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            transit_metrics,
            channel_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get transit metrics
    pub fn transit(&self) -> &TransitMetrics {
        &self.transit_metrics
    }

    /// Get status channel metrics
    pub fn channel(&self) -> &ChannelMetrics {
        &self.channel_metrics
    }

    /// Record a pre-routing decision
    pub fn record_route_request(&self, decision: RouteDecision) {
        let label = match decision {
            RouteDecision::Proceed => "proceed",
            RouteDecision::Suppress => "suppress",
        };
        self.transit_metrics
            .route_requests_total
            .with_label_values(&[label])
            .inc();
    }

    /// Record a lobby placement attempt
    pub fn record_placement(&self, placed: bool, duration: Duration) {
        let outcome = if placed { "placed" } else { "unavailable" };
        self.transit_metrics
            .lobby_placements_total
            .with_label_values(&[outcome])
            .inc();
        self.transit_metrics
            .placement_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a player being advanced off a lobby
    pub fn record_advance(&self, trigger: AdvanceTrigger) {
        self.transit_metrics
            .advances_total
            .with_label_values(&[trigger.as_str()])
            .inc();
    }

    pub fn record_retry(&self) {
        self.transit_metrics.placement_retries_total.inc();
    }

    pub fn record_abandoned(&self) {
        self.transit_metrics.placements_abandoned_total.inc();
    }

    pub fn set_tracked_players(&self, count: usize) {
        self.transit_metrics.tracked_players.set(count as i64);
    }

    /// Record a decoded (or rejected) status message
    pub fn record_status_message(&self, result: &str) {
        self.channel_metrics
            .status_messages_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn set_channel_connected(&self, connected: bool) {
        self.channel_metrics.connected.set(i64::from(connected));
    }

    pub fn record_reconnect(&self) {
        self.channel_metrics.reconnects_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("lobby_transit_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "lobby_transit_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl TransitMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let route_requests_total = IntCounterVec::new(
            Opts::new(
                "transit_route_requests_total",
                "Pre-routing requests by decision",
            ),
            &["decision"],
        )?;
        registry.register(Box::new(route_requests_total.clone()))?;

        let lobby_placements_total = IntCounterVec::new(
            Opts::new(
                "transit_lobby_placements_total",
                "Lobby placement attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(lobby_placements_total.clone()))?;

        let advances_total = IntCounterVec::new(
            Opts::new(
                "transit_advances_total",
                "Players advanced off a lobby by trigger",
            ),
            &["trigger"],
        )?;
        registry.register(Box::new(advances_total.clone()))?;

        let placement_retries_total = IntCounter::new(
            "transit_placement_retries_total",
            "Placement retries executed",
        )?;
        registry.register(Box::new(placement_retries_total.clone()))?;

        let placements_abandoned_total = IntCounter::new(
            "transit_placements_abandoned_total",
            "Episodes abandoned after exhausting placement retries",
        )?;
        registry.register(Box::new(placements_abandoned_total.clone()))?;

        let tracked_players =
            IntGauge::new("transit_tracked_players", "Players tracked by the registry")?;
        registry.register(Box::new(tracked_players.clone()))?;

        let placement_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transit_placement_duration_seconds",
                "Time spent selecting a lobby",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(placement_duration.clone()))?;

        Ok(Self {
            route_requests_total,
            lobby_placements_total,
            advances_total,
            placement_retries_total,
            placements_abandoned_total,
            tracked_players,
            placement_duration,
        })
    }
}

impl ChannelMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let status_messages_total = IntCounterVec::new(
            Opts::new(
                "transit_status_messages_total",
                "Status channel messages by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(status_messages_total.clone()))?;

        let connected = IntGauge::new(
            "transit_status_channel_connected",
            "Whether the status channel subscription is live",
        )?;
        registry.register(Box::new(connected.clone()))?;

        let reconnects_total = IntCounter::new(
            "transit_status_channel_reconnects_total",
            "Status channel reconnect attempts",
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        Ok(Self {
            status_messages_total,
            connected,
            reconnects_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
