//! Global atomic counters for relgate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a release check).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    families_evaluated: AtomicU64,
    producers_invoked: AtomicU64,
    attempts_launched: AtomicU64,
    stalls_detected: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            families_evaluated: AtomicU64::new(0),
            producers_invoked: AtomicU64::new(0),
            attempts_launched: AtomicU64::new(0),
            stalls_detected: AtomicU64::new(0),
        }
    }

    /// Count one family row folded into a matrix.
    pub fn inc_families_evaluated(&self) {
        self.families_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "families_evaluated", "counter incremented");
    }

    /// Count one producer launch, successful or not.
    pub fn inc_producers_invoked(&self) {
        self.producers_invoked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "producers_invoked", "counter incremented");
    }

    /// Count one watchdog attempt process spawned.
    pub fn inc_attempts_launched(&self) {
        self.attempts_launched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts_launched", "counter incremented");
    }

    /// Count one attempt killed for lack of liveness progress.
    pub fn inc_stalls_detected(&self) {
        self.stalls_detected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stalls_detected", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a matrix build, end of a
    /// watchdog cycle) rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            families_evaluated = self.families_evaluated(),
            producers_invoked = self.producers_invoked(),
            attempts_launched = self.attempts_launched(),
            stalls_detected = self.stalls_detected(),
        );
    }

    /// Family rows evaluated so far.
    pub fn families_evaluated(&self) -> u64 {
        self.families_evaluated.load(Ordering::Relaxed)
    }

    /// Producer launches so far.
    pub fn producers_invoked(&self) -> u64 {
        self.producers_invoked.load(Ordering::Relaxed)
    }

    /// Watchdog attempts spawned so far.
    pub fn attempts_launched(&self) -> u64 {
        self.attempts_launched.load(Ordering::Relaxed)
    }

    /// Attempts killed as stalled so far.
    pub fn stalls_detected(&self) -> u64 {
        self.stalls_detected.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.families_evaluated.store(0, Ordering::Relaxed);
        self.producers_invoked.store(0, Ordering::Relaxed);
        self.attempts_launched.store(0, Ordering::Relaxed);
        self.stalls_detected.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.families_evaluated(), 0);
        m.inc_families_evaluated();
        m.inc_families_evaluated();
        assert_eq!(m.families_evaluated(), 2);

        m.inc_producers_invoked();
        assert_eq!(m.producers_invoked(), 1);

        m.inc_attempts_launched();
        m.inc_stalls_detected();
        m.inc_stalls_detected();
        assert_eq!(m.attempts_launched(), 1);
        assert_eq!(m.stalls_detected(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_families_evaluated();
        m.inc_producers_invoked();
        m.inc_attempts_launched();
        m.inc_stalls_detected();
        m.reset();
        assert_eq!(m.families_evaluated(), 0);
        assert_eq!(m.producers_invoked(), 0);
        assert_eq!(m.attempts_launched(), 0);
        assert_eq!(m.stalls_detected(), 0);
    }
}
