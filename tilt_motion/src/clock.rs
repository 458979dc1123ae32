//! Time sources for the classifier.
//!
//! Stillness windows are measured on a monotonic clock; the playback debounce
//! uses wall-clock time.  Both are read through [`Clock`] so tests and replays
//! can drive time by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A pair of time readings in milliseconds.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn monotonic_ms(&self) -> f64;
    /// Milliseconds since the Unix epoch.
    fn wall_ms(&self) -> f64;
}

// ════════════════════════════════════════════════════════════════════════════
// SystemClock
// ════════════════════════════════════════════════════════════════════════════

/// Real time: `Instant` for the monotonic reading, `SystemTime` for wall time.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self { Self::new() }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn wall_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ManualClock
// ════════════════════════════════════════════════════════════════════════════

/// Hand-driven clock.  Clones share the same reading, so a test can keep one
/// handle and advance time under a classifier that owns the other.
///
/// Monotonic and wall readings move together, starting from `0`.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, ms: f64) { self.now_ms.set(ms); }

    pub fn advance(&self, ms: f64) { self.now_ms.set(self.now_ms.get() + ms); }

    pub fn now(&self) -> f64 { self.now_ms.get() }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> f64 { self.now_ms.get() }
    fn wall_ms(&self)      -> f64 { self.now_ms.get() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(120.0);
        assert_eq!(b.monotonic_ms(), 120.0);
        b.set(5.0);
        assert_eq!(a.wall_ms(), 5.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let c = SystemClock::new();
        let t0 = c.monotonic_ms();
        let t1 = c.monotonic_ms();
        assert!(t1 >= t0);
        assert!(c.wall_ms() > 0.0);
    }
}
