//! Monotonic time source used by the read loop.

use std::fmt::Debug;
use std::time::Instant;

/// Source of monotonic instants.
///
/// The command channel measures deadlines and quiet periods only through this
/// trait, so tests can drive time explicitly.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
