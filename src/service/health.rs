//! Health reporting
//!
//! A host can poll [`HealthCheck::check`] to see whether transit is
//! running and whether early advances via the status channel are live.

use crate::service::app::TransitService;
use crate::transit::CoordinatorStats;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.as_gauge() < self.as_gauge() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Coordinator statistics
    pub stats: CoordinatorStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional detail when not healthy
    pub message: Option<String>,
}

impl HealthCheck {
    /// Check every component of the service
    pub async fn check(service: &TransitService) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(service).await,
            Self::check_status_channel(service),
            Self::check_coordinator(service),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |overall, check| {
                overall.worst(check.status)
            });
        service
            .metrics()
            .update_health_status(status.as_gauge());

        let stats = service.coordinator().stats().unwrap_or_default();

        Ok(HealthCheck {
            status,
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(service: &TransitService) -> HealthStatus {
        if service.is_running().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    async fn check_service_running(service: &TransitService) -> ComponentCheck {
        let (status, message) = if service.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    /// Timer-only by configuration is healthy; a configured but
    /// disconnected channel only loses early advances
    fn check_status_channel(service: &TransitService) -> ComponentCheck {
        let (status, message) = if !service.status_channel_enabled() {
            (
                HealthStatus::Healthy,
                Some("Status channel not configured, timer-only mode".to_string()),
            )
        } else if service.status_channel_connected() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Degraded,
                Some("Status channel disconnected, advancing on timer only".to_string()),
            )
        };

        ComponentCheck {
            name: "status_channel".to_string(),
            status,
            message,
        }
    }

    fn check_coordinator(service: &TransitService) -> ComponentCheck {
        let (status, message) = match service.coordinator().stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Coordinator stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "coordinator".to_string(),
            status,
            message,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
