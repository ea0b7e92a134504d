//! Utility functions for the transit coordinator

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Delay for the given 1-based attempt of an exponential backoff
///
/// Attempt 1 waits `initial`, every further attempt multiplies by
/// `multiplier`, and the result never exceeds `max`.
pub fn backoff_delay(initial: Duration, multiplier: f64, max: Duration, attempt: u32) -> Duration {
    if attempt <= 1 {
        return initial.min(max);
    }
    let exponent = (attempt - 1).min(32) as i32;
    let millis = initial.as_millis() as f64 * multiplier.powi(exponent);
    if !millis.is_finite() || millis >= max.as_millis() as f64 {
        return max;
    }
    Duration::from_millis(millis as u64)
}
