//! Conversion of absolute run times into transport delays.

use chrono::{DateTime, Utc};

use crate::error::JobQueueError;

/// The transport cannot hold a message invisible for longer than 15 minutes.
pub const MAX_DELAY_SECONDS: i64 = 15 * 60;

/// Delay in whole seconds from `now` until `target`, both in fractional
/// seconds since the epoch, rounded to the nearest second.
///
/// A zero or negative result means "as soon as possible" and is not an error.
pub fn calculate_delay(target: f64, now: f64) -> Result<i64, JobQueueError> {
    let delay = (target - now).round();
    // Compare before casting so huge values cannot saturate into range.
    if delay > MAX_DELAY_SECONDS as f64 {
        return Err(JobQueueError::invalid_delay(delay as i64));
    }
    Ok(delay as i64)
}

/// [`calculate_delay`] for chrono timestamps.
#[inline]
pub fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Result<i64, JobQueueError> {
    calculate_delay(epoch_seconds(target), epoch_seconds(now))
}

#[inline]
fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1_000_000_000.0
}
