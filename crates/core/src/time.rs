//! Wall-clock independent timestamps

use std::ops::Add;
use std::time::{Duration, Instant};

/// A point on the monotonic clock
///
/// Used for debounce deadlines and timing log lines; never compared with
/// file modification times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTime(Instant);

impl MonotonicTime {
    /// Current monotonic time
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Time elapsed since this point
    pub fn elapsed(self) -> Duration {
        self.0.elapsed()
    }

    /// The underlying instant, for APIs that take deadlines
    pub fn as_instant(self) -> Instant {
        self.0
    }
}

impl Add<Duration> for MonotonicTime {
    type Output = MonotonicTime;

    fn add(self, rhs: Duration) -> MonotonicTime {
        MonotonicTime(self.0 + rhs)
    }
}
