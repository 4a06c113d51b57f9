//! Flush gate — throttle plus debounce for shared-log writes.
//!
//! DESIGN
//! ======
//! Every single-element broadcast calls `touch`, which pushes the debounce
//! deadline out. A flush is due once the debounce deadline has passed AND at
//! least one throttle interval has elapsed since the previous flush. A touch
//! inside the throttle window is deferred to the end of the window, never
//! dropped, so a burst collapses into one write that carries all of it.
//!
//! The gate is a pure state machine over `Instant`s; the channel's driver
//! owns the timer and asks `deadline()` when to wake up.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FlushGate {
    throttle: Duration,
    debounce: Duration,
    last_flush: Option<Instant>,
    debounce_until: Option<Instant>,
}

impl FlushGate {
    #[must_use]
    pub fn new(throttle: Duration, debounce: Duration) -> Self {
        Self { throttle, debounce, last_flush: None, debounce_until: None }
    }

    /// Record a write request at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.debounce_until = Some(now + self.debounce);
    }

    /// Whether a write request is waiting.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.debounce_until.is_some()
    }

    /// Earliest instant the pending write may happen, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let debounce_until = self.debounce_until?;
        let throttle_until = self.last_flush.map(|at| at + self.throttle);
        Some(throttle_until.map_or(debounce_until, |t| t.max(debounce_until)))
    }

    /// Whether the pending write is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Record that the pending write happened at `now`.
    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = Some(now);
        self.debounce_until = None;
    }

    /// Drop the pending write without flushing.
    pub fn cancel(&mut self) {
        self.debounce_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THROTTLE: Duration = Duration::from_millis(100);
    const DEBOUNCE: Duration = Duration::from_millis(50);

    fn gate() -> FlushGate {
        FlushGate::new(THROTTLE, DEBOUNCE)
    }

    #[test]
    fn idle_gate_has_no_deadline() {
        let g = gate();
        assert!(!g.is_armed());
        assert_eq!(g.deadline(), None);
        assert!(!g.is_due(Instant::now()));
    }

    #[test]
    fn first_touch_waits_only_for_debounce() {
        let mut g = gate();
        let start = Instant::now();
        g.touch(start);
        assert_eq!(g.deadline(), Some(start + DEBOUNCE));
        assert!(!g.is_due(start + Duration::from_millis(49)));
        assert!(g.is_due(start + DEBOUNCE));
    }

    #[test]
    fn repeated_touches_push_debounce_out() {
        let mut g = gate();
        let start = Instant::now();
        g.touch(start);
        g.touch(start + Duration::from_millis(30));
        g.touch(start + Duration::from_millis(60));
        assert_eq!(g.deadline(), Some(start + Duration::from_millis(110)));
    }

    #[test]
    fn touch_inside_throttle_window_is_deferred_not_dropped() {
        let mut g = gate();
        let start = Instant::now();
        g.touch(start);
        g.mark_flushed(start + DEBOUNCE);
        assert!(!g.is_armed());

        g.touch(start + Duration::from_millis(55));
        // Debounce alone would allow 105ms; throttle holds it to 150ms.
        assert_eq!(g.deadline(), Some(start + DEBOUNCE + THROTTLE));
        assert!(!g.is_due(start + Duration::from_millis(120)));
        assert!(g.is_due(start + Duration::from_millis(150)));
    }

    #[test]
    fn cancel_disarms() {
        let mut g = gate();
        let start = Instant::now();
        g.touch(start);
        g.cancel();
        assert!(!g.is_armed());
        assert!(!g.is_due(start + Duration::from_secs(1)));
    }
}
