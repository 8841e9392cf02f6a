//! Time source for the pool
//!
//! All timestamps are unix milliseconds. The pool never reads the system time
//! directly, so tests drive it with `ManualClock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds in one quota day.
pub const DAY_MILLIS: u64 = 86_400_000;

/// Supplies the current time.
pub trait Clock: Send + Sync {
    /// Current time as unix milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Quota-day number containing `now_millis`.
///
/// Days start `day_start_offset_secs` after UTC midnight; `-28800` makes the
/// quota day roll over at midnight UTC+8.
pub fn day_index(now_millis: u64, day_start_offset_secs: i64) -> i64 {
    let shifted = now_millis as i64 - day_start_offset_secs * 1000;
    shifted.div_euclid(DAY_MILLIS as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now_millis(), 62_000);
        clock.set(5);
        assert_eq!(clock.now_millis(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn day_index_rolls_at_utc_midnight_by_default() {
        let day = 20_000;
        let midnight = day as u64 * DAY_MILLIS;
        assert_eq!(day_index(midnight - 1, 0), day - 1);
        assert_eq!(day_index(midnight, 0), day);
        assert_eq!(day_index(midnight + DAY_MILLIS - 1, 0), day);
    }

    #[test]
    fn day_index_honours_boundary_offset() {
        let midnight = 20_000 * DAY_MILLIS;
        // 16:00 UTC is midnight in UTC+8
        let boundary = midnight + 16 * 3_600_000;
        let offset = -8 * 3600;
        assert_eq!(day_index(boundary - 1, offset), day_index(midnight, 0));
        assert_eq!(day_index(boundary, offset), day_index(midnight, 0) + 1);
    }
}
