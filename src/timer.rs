//! Simulated time and periodic clocks.
//!
//! [`SimulationClock`] holds the run's time axis: start, stop, the fixed step
//! and the index of the current tick. Time is always recomputed as
//! `start + tick * step` so it never accumulates rounding error.
//!
//! [`PeriodicTimer`] is the countdown of one periodic clock.

use crate::types::SimTime;

/// Relative slack used when comparing accumulated time quantities.
const TIME_TOLERANCE: f64 = 1e-9;

/// Number of sampled instants in `[start, stop]` for a fixed `step`,
/// including the initial instant: `ceil((stop - start) / step) + 1`.
pub fn tick_count(start: SimTime, stop: SimTime, step: SimTime) -> u64 {
    let spans = ((stop - start) / step - TIME_TOLERANCE).ceil().max(0.0);
    spans as u64 + 1
}

/// Countdown of a periodic clock.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodicTimer {
    period: SimTime,
    remaining: SimTime,
}

impl PeriodicTimer {
    /// Creates a timer that fires `period` after now.
    pub fn new(period: SimTime) -> Self {
        Self {
            period,
            remaining: period,
        }
    }

    /// Returns the clock interval.
    pub fn period(&self) -> SimTime {
        self.period
    }

    /// Returns the time left until the next firing.
    pub fn remaining(&self) -> SimTime {
        self.remaining
    }

    /// Counts down by `dt`.
    pub fn tick(&mut self, dt: SimTime) {
        self.remaining -= dt;
    }

    /// Returns true once the countdown reached zero.
    ///
    /// Stays true until [`PeriodicTimer::reset`] is called.
    pub fn has_fired(&self) -> bool {
        self.remaining <= self.period * TIME_TOLERANCE
    }

    /// Rearms the countdown with a full period.
    pub fn reset(&mut self) {
        self.remaining = self.period;
    }
}

/// Time axis of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationClock {
    start: SimTime,
    stop: SimTime,
    step: SimTime,
    tick: u64,
}

impl SimulationClock {
    /// Creates a clock positioned at `start`.
    pub fn new(start: SimTime, stop: SimTime, step: SimTime) -> Self {
        Self {
            start,
            stop,
            step,
            tick: 0,
        }
    }

    /// Current simulated time.
    pub fn time(&self) -> SimTime {
        self.start + self.tick as f64 * self.step
    }

    /// Index of the current instant; 0 is the initial instant.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Fixed step size.
    pub fn step(&self) -> SimTime {
        self.step
    }

    /// Start time of the run.
    pub fn start(&self) -> SimTime {
        self.start
    }

    /// Stop time of the run.
    pub fn stop(&self) -> SimTime {
        self.stop
    }

    /// Total number of instants of the run, including the initial one.
    pub fn tick_count(&self) -> u64 {
        tick_count(self.start, self.stop, self.step)
    }

    /// Returns true when the last instant has been reached.
    pub fn is_finished(&self) -> bool {
        self.tick + 1 >= self.tick_count()
    }

    /// Moves to the next instant and returns its time.
    pub fn advance(&mut self) -> SimTime {
        self.tick += 1;
        self.time()
    }

    /// Returns to the initial instant.
    pub fn reset(&mut self) {
        self.tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_count() {
        assert_eq!(tick_count(0.0, 10.0, 0.01), 1001);
        assert_eq!(tick_count(0.0, 1.0, 0.1), 11);
        assert_eq!(tick_count(0.0, 0.1, 0.01), 11);
        assert_eq!(tick_count(0.0, 1.05, 0.1), 12);
        assert_eq!(tick_count(0.0, 0.0, 0.1), 1);
    }

    #[test]
    fn test_timer_fires_on_tenth_step() {
        let mut timer = PeriodicTimer::new(0.1);
        for i in 1..=10 {
            timer.tick(0.01);
            assert_eq!(timer.has_fired(), i == 10, "step {i}");
        }
    }

    #[test]
    fn test_timer_stays_fired_until_reset() {
        let mut timer = PeriodicTimer::new(0.05);
        for _ in 0..5 {
            timer.tick(0.01);
        }
        assert!(timer.has_fired());
        timer.tick(0.01);
        assert!(timer.has_fired());

        timer.reset();
        assert!(!timer.has_fired());
        assert_eq!(timer.remaining(), 0.05);
    }

    #[test]
    fn test_timer_fires_once_per_period() {
        let mut timer = PeriodicTimer::new(0.1);
        let mut firings = Vec::new();
        for i in 1..=100u32 {
            timer.tick(0.01);
            if timer.has_fired() {
                firings.push(i);
                timer.reset();
            }
        }
        assert_eq!(firings, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn test_clock_time_is_exact_multiple() {
        let mut clock = SimulationClock::new(0.0, 1.0, 0.1);
        assert_eq!(clock.time(), 0.0);
        for i in 1..=10u64 {
            let t = clock.advance();
            assert_eq!(clock.tick(), i);
            assert_eq!(t, i as f64 * 0.1);
        }
        assert!(clock.is_finished());
    }

    #[test]
    fn test_clock_reset() {
        let mut clock = SimulationClock::new(1.0, 2.0, 0.5);
        clock.advance();
        clock.reset();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.time(), 1.0);
        assert_eq!(clock.tick_count(), 3);
    }
}
