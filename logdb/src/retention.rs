//! Eviction of the oldest resident records.
//!
//! Resident records may exceed the configured bounds by [`RETENTION_SLACK`]
//! before a batch of the oldest ones is dropped at once. The count bound
//! then trims back to exactly `max_records`; the age bound continues the
//! same forward sweep from there, so the larger of the two requirements
//! wins.

use crate::schema::RetentionConfig;

/// Factor by which the resident window may exceed a bound before eviction.
pub const RETENTION_SLACK: f64 = 1.1;

/// Returns how many of the oldest records to drop.
///
/// `times` holds the time column, oldest first; `now` is the time of the
/// record just inserted.
pub fn eviction_count(times: &[f64], now: f64, retention: &RetentionConfig) -> usize {
    let len = times.len();
    let mut count = 0;

    if let Some(max_records) = retention.max_records {
        #[allow(clippy::cast_precision_loss)] // record counts stay far below 2^52
        let threshold = max_records as f64 * RETENTION_SLACK;
        #[allow(clippy::cast_precision_loss)]
        let resident = len as f64;
        if resident > threshold {
            count = len - max_records;
        }
    }

    if let Some(max_age) = retention.max_age {
        let oldest_kept = now - max_age.as_secs_f64() * RETENTION_SLACK;
        while count < len && times[count] < oldest_kept {
            count += 1;
        }
    }

    count
}
