//! Threshold supervisor.
//!
//! Watches the plant output `x` through the event indicator
//! `z = threshold - x`. Entering event mode when the last two samples of
//! `z` have strictly opposite signs latches the output clock `s`; its
//! clocked partition flips the command `as` between `+1` and `-1`.

use crate::subsystem::{
    CallResult, Causality, DiscreteUpdate, Fault, Reply, StepOutcome, Subsystem, SubsystemKind,
    ValueResult, VariableDesc,
};
use crate::types::SimTime;

use super::{read_each, write_each};

/// Default switching threshold.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

#[derive(Clone, Debug, PartialEq)]
struct SupervisorData {
    x: f64,
    as_previous: f64,
    // Unread activation of the output clock `s`.
    s: bool,
    // `s` ticks in the current event iteration.
    ticking: bool,
    // Latest indicator sample and the one before it.
    z: f64,
    pz: f64,
}

impl Default for SupervisorData {
    fn default() -> Self {
        Self {
            x: 0.0,
            as_previous: 1.0,
            s: false,
            ticking: false,
            z: 0.0,
            pz: 0.0,
        }
    }
}

/// Supervisor that reverses the controller command at each threshold crossing.
#[derive(Clone, Debug)]
pub struct Supervisor {
    kind: SubsystemKind,
    threshold: f64,
    data: SupervisorData,
    in_event_mode: bool,
}

impl Supervisor {
    /// Creates a model-exchange supervisor switching at `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self {
            kind: SubsystemKind::ModelExchange,
            threshold,
            data: SupervisorData::default(),
            in_event_mode: false,
        }
    }

    /// Switches the subsystem kind.
    pub fn with_kind(mut self, kind: SubsystemKind) -> Self {
        self.kind = kind;
        self
    }

    /// The switching threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn sample(&mut self) -> f64 {
        self.data.pz = self.data.z;
        self.data.z = self.threshold - self.data.x;
        self.data.z
    }

    /// Zero is not a crossing; only strictly opposite signs are.
    fn crossed(&self) -> bool {
        self.data.z * self.data.pz < 0.0
    }

    /// Committed value, or the next one while `s` is ticking in event mode.
    fn command(&self) -> f64 {
        if self.in_event_mode && self.data.ticking {
            -self.data.as_previous
        } else {
            self.data.as_previous
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Subsystem for Supervisor {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    fn variables(&self) -> Vec<VariableDesc> {
        vec![
            VariableDesc::clock("s", Causality::Output),
            VariableDesc::continuous("x", Causality::Input),
            VariableDesc::continuous("as", Causality::Output),
            VariableDesc::continuous("as_previous", Causality::Local),
        ]
    }

    fn get_continuous(&mut self, names: &[&str]) -> ValueResult<Vec<f64>> {
        let command = self.command();
        let data = &self.data;
        read_each(names, |name| match name {
            "x" => Some(data.x),
            "as" => Some(command),
            "as_previous" => Some(data.as_previous),
            _ => None,
        })
    }

    fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> CallResult<()> {
        let data = &mut self.data;
        write_each(names, values, |name, value| match name {
            "x" => {
                data.x = value;
                true
            }
            _ => false,
        })
    }

    fn get_clock(&mut self, names: &[&str]) -> ValueResult<Vec<bool>> {
        names
            .iter()
            .map(|&name| match name {
                "s" => Ok(std::mem::take(&mut self.data.s)),
                other => Err(Fault::unknown_variable(other)),
            })
            .collect::<CallResult<Vec<bool>>>()
            .map(Reply::ok)
    }

    fn has_event_indicator(&self) -> bool {
        true
    }

    fn event_indicator(&mut self) -> ValueResult<f64> {
        Ok(self.sample().into())
    }

    fn exit_initialization(&mut self) -> CallResult<()> {
        self.in_event_mode = true;
        Ok(())
    }

    fn enter_event_mode(&mut self) -> CallResult<()> {
        self.in_event_mode = true;
        let ticking = self.crossed();
        self.data.ticking = ticking;
        self.data.s = ticking;
        Ok(())
    }

    fn enter_step_mode(&mut self) -> CallResult<()> {
        self.in_event_mode = false;
        Ok(())
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<()> {
        self.in_event_mode = false;
        Ok(())
    }

    fn update_discrete_states(&mut self) -> ValueResult<DiscreteUpdate> {
        if self.data.ticking {
            self.data.as_previous = -self.data.as_previous;
        }
        self.data.ticking = false;
        self.data.s = false;
        Ok(DiscreteUpdate::default().into())
    }

    fn step(&mut self, time: SimTime, step: SimTime) -> ValueResult<StepOutcome> {
        if self.kind != SubsystemKind::CoSimulation {
            return Err(Fault::error("Supervisor was not instantiated for co-simulation"));
        }
        self.sample();
        Ok(StepOutcome {
            state_event: self.crossed(),
            last_successful_time: time + step,
            ..StepOutcome::default()
        }
        .into())
    }

    fn reset(&mut self) -> CallResult<()> {
        self.data = SupervisorData::default();
        self.in_event_mode = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `x` and samples the indicator, as the orchestrator does once
    /// per tick.
    fn observe(supervisor: &mut Supervisor, x: f64) -> f64 {
        supervisor.set_continuous(&["x"], &[x]).unwrap();
        supervisor.event_indicator().unwrap().value
    }

    /// A supervisor that has seen `x = 0` and then `x = 2.1`.
    fn crossed_upwards() -> Supervisor {
        let mut supervisor = Supervisor::new(2.0);
        observe(&mut supervisor, 0.0);
        observe(&mut supervisor, 2.1);
        supervisor
    }

    #[test]
    fn test_indicator_is_distance_to_threshold() {
        let mut supervisor = Supervisor::new(2.0);
        assert_eq!(supervisor.event_indicator().unwrap().value, 2.0);
        assert_eq!(observe(&mut supervisor, 2.5), -0.5);
    }

    #[test]
    fn test_no_crossing_no_clock() {
        let mut supervisor = Supervisor::new(2.0);
        observe(&mut supervisor, 0.0);
        observe(&mut supervisor, 1.0);
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![false]);
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![1.0]);
    }

    #[test]
    fn test_first_sample_never_latches() {
        let mut supervisor = Supervisor::new(2.0);
        observe(&mut supervisor, 3.0);
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![false]);
    }

    #[test]
    fn test_clock_is_read_once() {
        let mut supervisor = crossed_upwards();
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![true]);
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![false]);
    }

    #[test]
    fn test_look_ahead_transition() {
        let mut supervisor = crossed_upwards();

        // Free running: the committed value.
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![1.0]);

        // Pending activation: the next value, state not yet committed.
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![-1.0]);
        assert_eq!(supervisor.get_continuous(&["as_previous"]).unwrap().value, vec![1.0]);
        // Reading the clock does not end the look-ahead.
        supervisor.get_clock(&["s"]).unwrap();
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![-1.0]);

        // Committed: as_previous caught up, and as stays put.
        supervisor.update_discrete_states().unwrap();
        assert_eq!(
            supervisor.get_continuous(&["as", "as_previous"]).unwrap().value,
            vec![-1.0, -1.0]
        );
        supervisor.enter_continuous_time_mode().unwrap();
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![-1.0]);
    }

    #[test]
    fn test_crossing_back_flips_again() {
        let mut supervisor = crossed_upwards();
        supervisor.enter_event_mode().unwrap();
        supervisor.update_discrete_states().unwrap();
        supervisor.enter_continuous_time_mode().unwrap();

        // Still above: no new crossing.
        observe(&mut supervisor, 2.2);
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![false]);
        supervisor.update_discrete_states().unwrap();
        supervisor.enter_continuous_time_mode().unwrap();

        observe(&mut supervisor, 1.9);
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![true]);
        supervisor.update_discrete_states().unwrap();
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![1.0]);
    }

    #[test]
    fn test_touching_zero_does_not_latch() {
        let mut supervisor = Supervisor::new(2.0);
        // z = 2, 1, 0, -1, 1
        for x in [0.0, 1.0, 2.0, 3.0] {
            observe(&mut supervisor, x);
            assert!(!supervisor.crossed(), "x = {x}");
        }

        // Only the last sample pair has strictly opposite signs.
        observe(&mut supervisor, 1.0);
        supervisor.enter_event_mode().unwrap();
        assert_eq!(supervisor.get_clock(&["s"]).unwrap().value, vec![true]);
        supervisor.update_discrete_states().unwrap();
        assert_eq!(supervisor.get_continuous(&["as"]).unwrap().value, vec![-1.0]);
    }

    #[test]
    fn test_co_simulation_step_reports_crossing() {
        let mut supervisor = Supervisor::new(2.0).with_kind(SubsystemKind::CoSimulation);
        assert!(!supervisor.step(0.0, 0.01).unwrap().value.state_event);
        supervisor.set_continuous(&["x"], &[2.01]).unwrap();
        assert!(supervisor.step(0.01, 0.01).unwrap().value.state_event);
    }

    #[test]
    fn test_reset_restores_instantiation_state() {
        let mut supervisor = crossed_upwards();
        supervisor.enter_event_mode().unwrap();
        supervisor.update_discrete_states().unwrap();

        supervisor.reset().unwrap();
        assert_eq!(supervisor.data, SupervisorData::default());
        assert!(!supervisor.in_event_mode);
    }
}
