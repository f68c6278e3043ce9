//! Zero-crossing detection on event indicators.
//!
//! An [`IndicatorTracker`] keeps the previous sample of one subsystem's
//! event indicator and reports a state event when two consecutive samples
//! have strictly opposite signs. A sample of exactly zero never triggers on
//! its own; only a crossing does.

use crate::error::{OrchestratorError, Result};
use crate::handle::SubsystemHandle;
use crate::types::SubsystemId;

/// Previous/current bookkeeping for one subsystem's event indicator.
#[derive(Clone, Debug)]
pub struct IndicatorTracker {
    owner: SubsystemId,
    previous: Option<f64>,
    last_instant: Option<u64>,
}

impl IndicatorTracker {
    /// Creates an unseeded tracker. Its first observation only primes it.
    pub fn new(owner: SubsystemId) -> Self {
        Self {
            owner,
            previous: None,
            last_instant: None,
        }
    }

    /// Returns the subsystem whose indicator is tracked.
    pub fn owner(&self) -> SubsystemId {
        self.owner
    }

    /// Returns the stored previous sample.
    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    /// Seeds the previous value for `instant` so the next observation is
    /// compared against it.
    ///
    /// Seeding with the indicator value at the initial instant guarantees
    /// that the first detection cannot fire spuriously.
    pub fn seed(&mut self, instant: u64, value: f64) {
        self.previous = Some(value);
        self.last_instant = Some(instant);
    }

    /// Reads the current indicator value from the owner.
    pub fn sample(&self, handle: &mut SubsystemHandle) -> Result<f64> {
        handle.event_indicator()
    }

    /// Samples the owner and reports whether its indicator crossed zero
    /// since the previous instant.
    pub fn detect(&mut self, handle: &mut SubsystemHandle, instant: u64) -> Result<bool> {
        if self.last_instant == Some(instant) {
            return Err(self.sampled_twice(handle.name(), instant));
        }
        let current = self.sample(handle)?;
        self.observe(instant, current)
            .ok_or_else(|| self.sampled_twice(handle.name(), instant))
    }

    /// Pure crossing check: compares `current` with the stored previous
    /// value and stores `current` for the next instant.
    ///
    /// Returns `None` if `instant` was already observed.
    pub fn observe(&mut self, instant: u64, current: f64) -> Option<bool> {
        if self.last_instant == Some(instant) {
            return None;
        }
        let crossed = match self.previous {
            Some(previous) => previous * current < 0.0,
            None => false,
        };
        self.previous = Some(current);
        self.last_instant = Some(instant);
        Some(crossed)
    }

    fn sampled_twice(&self, subsystem: &str, instant: u64) -> OrchestratorError {
        OrchestratorError::ProtocolViolation {
            subsystem: subsystem.to_string(),
            operation: "event_indicator",
            detail: format!("indicator sampled twice at tick {instant}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tracker: &mut IndicatorTracker, samples: &[f64]) -> Vec<bool> {
        samples
            .iter()
            .enumerate()
            .map(|(i, &v)| tracker.observe(i as u64 + 1, v).unwrap())
            .collect()
    }

    #[test]
    fn test_seeded_first_detection_is_quiet() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        tracker.seed(0, 2.0);
        assert_eq!(tracker.observe(1, 1.9), Some(false));
    }

    #[test]
    fn test_unseeded_first_detection_is_quiet() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        assert_eq!(tracker.observe(0, -5.0), Some(false));
        assert_eq!(tracker.previous(), Some(-5.0));
    }

    #[test]
    fn test_crossing_between_ticks_one_and_two() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        tracker.seed(0, 1.0);
        let fired = run(&mut tracker, &[0.5, -0.3, -1.0]);
        assert_eq!(fired, vec![false, true, false]);
    }

    #[test]
    fn test_zero_does_not_trigger() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        tracker.seed(0, 1.0);
        let fired = run(&mut tracker, &[0.0, -1.0, 0.0, 1.0]);
        assert_eq!(fired, vec![false, false, false, false]);
    }

    #[test]
    fn test_every_sign_flip_fires() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        tracker.seed(0, 1.0);
        let fired = run(&mut tracker, &[-1.0, 1.0, 2.0, -0.1]);
        assert_eq!(fired, vec![true, true, false, true]);
    }

    #[test]
    fn test_same_instant_twice_is_rejected() {
        let mut tracker = IndicatorTracker::new(SubsystemId(0));
        tracker.seed(0, 1.0);
        assert!(tracker.observe(1, 0.5).is_some());
        assert!(tracker.observe(1, -0.5).is_none());
        // The rejected sample must not disturb the stored value.
        assert_eq!(tracker.previous(), Some(0.5));
    }
}
