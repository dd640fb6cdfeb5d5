//! Time units and per-thread blocking timestamps.
//!
//! All sleep and timing-assertion arguments in a script are expressed in
//! abstract time units, scaled by a base duration chosen to dominate
//! scheduling jitter. The default is 60 ms; it can be overridden per
//! interpreter with [`with_time_unit`](crate::ConcurrentInterpreter::with_time_unit)
//! or globally through [`Config`](crate::config::Config).
//!
//! The module also owns the per-thread "last blocked" timestamp: each worker
//! records the instant it is about to suspend at the line barrier. The `time`
//! instruction reads it as the earliest possible start of the timed
//! expression, which may predate the expression's actual start by whatever
//! scheduling delay the thread suffered after the barrier released.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Default base time unit for sleeps and timing assertions.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_millis(60);

thread_local! {
    /// The last instant this thread was about to block at the barrier.
    static LAST_BLOCKED: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Record that the current thread is about to block.
///
/// Called immediately before every barrier wait, including the one before
/// the first script line.
pub(crate) fn mark_about_to_block() {
    LAST_BLOCKED.with(|cell| cell.set(Some(Instant::now())));
}

/// The last instant the current thread was about to block, if any.
///
/// `None` when interpreting outside of a script run.
pub(crate) fn last_blocked() -> Option<Instant> {
    LAST_BLOCKED.with(|cell| cell.get())
}

/// Scale a number of time units by the base unit.
pub(crate) fn scale(units: u32, unit: Duration) -> Duration {
    unit.saturating_mul(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mark_and_read() {
        mark_about_to_block();
        let stamp = last_blocked().expect("timestamp should be set");
        assert!(stamp.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_thread_local_is_per_thread() {
        mark_about_to_block();

        // A fresh thread must not see this thread's timestamp.
        let seen = thread::spawn(last_blocked).join().unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(2, Duration::from_millis(60)), Duration::from_millis(120));
        assert_eq!(scale(0, Duration::from_millis(60)), Duration::ZERO);
    }
}
