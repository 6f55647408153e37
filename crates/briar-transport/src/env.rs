//! What key management needs from the outside world.
//!
//! Rotation periods are computed from the wall clock, and the rotation task
//! sleeps until the next period boundary. Tests substitute a clock they can
//! move by hand, so crossing a period takes no real time.

use std::time::Duration;

/// Wall clock, timer and entropy source.
///
/// Implementations must draw `random_bytes` from a cryptographically secure
/// source outside tests; shared secrets are generated with it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Both contacts compute rotation periods from this, so their clocks must
    /// agree to within `MAX_CLOCK_DIFFERENCE`. It may jump in either
    /// direction; a key set never rotates backwards.
    fn wall_clock_ms(&self) -> u64;

    /// Wait for `duration`. Only the rotation task awaits this.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}
