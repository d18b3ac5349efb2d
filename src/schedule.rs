//! Deadline-based scheduling for the single-threaded event loop.
//!
//! Nothing here sleeps. A [`Deadline`] is armed with the current instant and
//! later polled by the loop; it fires once when the delay has elapsed. Arming
//! it again before it fires pushes the deadline out, which is how bursts of
//! triggers collapse into a single action (debounce).

use std::time::{Duration, Instant};

/// Quiet period after the last continent toggle before countries are re-derived.
pub const LOCATION_DEBOUNCE: Duration = Duration::from_millis(150);
/// Follow-up after a country recompute before the "select all" affordance refreshes.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Time the preset dropdown stays open after the search box loses focus.
pub const BLUR_GRACE: Duration = Duration::from_millis(200);

#[derive(Clone, Debug)]
pub struct Deadline {
    delay: Duration,
    due: Option<Instant>,
}

impl Deadline {
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    /// Arms (or re-arms) the deadline relative to `now`.
    pub fn arm(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    /// Returns true exactly once, on the first poll at or after the deadline.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_delay() {
        let start = Instant::now();
        let mut deadline = Deadline::new(Duration::from_millis(150));
        assert!(!deadline.fire(start));
        deadline.arm(start);
        assert!(!deadline.fire(start + Duration::from_millis(149)));
        assert!(deadline.fire(start + Duration::from_millis(150)));
        assert!(!deadline.fire(start + Duration::from_millis(400)));
    }

    #[test]
    fn rearming_coalesces_bursts() {
        let start = Instant::now();
        let mut deadline = Deadline::new(LOCATION_DEBOUNCE);
        deadline.arm(start);
        deadline.arm(start + Duration::from_millis(100));
        deadline.arm(start + Duration::from_millis(200));
        assert!(!deadline.fire(start + Duration::from_millis(300)));
        assert!(deadline.fire(start + Duration::from_millis(350)));
        assert!(!deadline.is_pending());
    }

    #[test]
    fn cancel_clears_pending() {
        let start = Instant::now();
        let mut deadline = Deadline::new(BLUR_GRACE);
        deadline.arm(start);
        deadline.cancel();
        assert!(!deadline.fire(start + Duration::from_secs(1)));
    }
}
