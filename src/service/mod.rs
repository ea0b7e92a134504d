//! Service layer for the lobby-transit module
//!
//! This module contains the service wiring, lifecycle, health reporting
//! and logging setup used by host proxies.

pub mod app;
pub mod health;

pub use app::{ServiceError, TransitService};
pub use health::{ComponentCheck, HealthCheck, HealthStatus};

use anyhow::Result;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(())
}
