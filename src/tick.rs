//! Monotonic tick source, independent of wall-clock adjustments.

use std::sync::Arc;
use std::time::Instant;

/// A monotonic counter used to extrapolate a cached [`crate::offset::TimeSample`]
/// forward in time between syncs. Implementations must be side-effect-free and safe
/// to call from any thread; the same source must be used across a sync and the
/// `now()` calls that follow it, or extrapolation is undefined.
pub trait TickSource: Send + Sync {
    /// Current tick reading, in milliseconds, relative to an arbitrary epoch fixed at
    /// construction time.
    fn now(&self) -> i64;
}

/// The default [`TickSource`]: milliseconds elapsed since this instance was created,
/// backed by [`std::time::Instant`].
pub struct MonotonicTickSource {
    epoch: Instant,
}

impl MonotonicTickSource {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicTickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicTickSource {
    fn now(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }
}

/// Convenience constructor for the common case of wrapping a [`MonotonicTickSource`]
/// in the `Arc` that [`crate::options::Options`] expects.
pub fn default_tick_source() -> Arc<dyn TickSource> {
    Arc::new(MonotonicTickSource::new())
}
