//! The monotonic timestamp source used by all recorders in the process.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// The instant all timestamps in this process are measured from.
///
/// Initialized on first use, which is either the first scope entered or the
/// first explicit `Clock::now()` call, whichever comes first.
static ANCHOR: OnceLock<Instant> = OnceLock::new();

/// A nanosecond-resolution monotonic timestamp.
///
/// Timestamps are offsets from a process-wide anchor, so they are directly
/// comparable across threads and fit in a fixed-width event record. They carry
/// no wall-clock meaning.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(u64);

impl Timestamp {
    pub(crate) const ZERO: Self = Self(0);

    /// Reconstitutes a timestamp from a raw nanosecond offset, e.g. when
    /// loading an event dump.
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// The raw nanosecond offset from the process-wide anchor.
    #[must_use]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Nanoseconds elapsed from `earlier` to `self`, or zero if `earlier` is
    /// actually later.
    #[must_use]
    pub fn saturating_nanos_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Duration elapsed from `earlier` to `self`, or zero if `earlier` is
    /// actually later.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.saturating_nanos_since(earlier))
    }
}

/// The process-wide monotonic clock.
///
/// Suitable for querying rapidly with low overhead: a reading is one
/// `std::time::Instant` query plus a subtraction against the process anchor.
/// Readings are monotonically non-decreasing within a thread and share one
/// clock domain across all threads.
///
/// # Examples
///
/// ```
/// use call_tracker::Clock;
///
/// let start = Clock::now();
/// std::thread::sleep(std::time::Duration::from_millis(10));
/// let elapsed = Clock::now().saturating_duration_since(start);
/// assert!(elapsed.as_millis() >= 10);
/// ```
#[derive(Debug)]
pub struct Clock;

impl Clock {
    /// The current reading of the monotonic clock.
    #[must_use]
    pub fn now() -> Timestamp {
        let anchor = *ANCHOR.get_or_init(Instant::now);

        let nanos = Instant::now().saturating_duration_since(anchor).as_nanos();

        Timestamp(
            u64::try_from(nanos).expect("process uptime in nanoseconds fits u64 for 584 years"),
        )
    }
}
