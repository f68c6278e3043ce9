//! Periodically clocked controller.
//!
//! The clocked partition on `r` integrates the supervisor's command:
//! `pre_ur = ur; ur = ur + as`. While `r` is active, `ur` already reports
//! the value the partition is about to commit, so the plant sees the new
//! input in the same event iteration.

use crate::subsystem::{
    CallResult, Causality, DiscreteUpdate, Fault, Reply, StepOutcome, Subsystem, SubsystemKind,
    ValueResult, VariableDesc,
};
use crate::types::SimTime;

use super::{read_each, write_each};

/// Default interval of the clock `r`.
pub const DEFAULT_INTERVAL: f64 = 0.1;

#[derive(Clone, Debug, PartialEq)]
struct ControllerData {
    r: bool,
    s: bool,
    xr: f64,
    ur: f64,
    pre_ur: f64,
    command: f64,
}

impl Default for ControllerData {
    fn default() -> Self {
        Self {
            r: false,
            s: false,
            xr: 0.0,
            ur: 0.0,
            pre_ur: 0.0,
            command: 1.0,
        }
    }
}

/// Integrating controller sampled by the periodic clock `r`.
#[derive(Clone, Debug)]
pub struct Controller {
    kind: SubsystemKind,
    interval: f64,
    data: ControllerData,
    in_event_mode: bool,
}

impl Controller {
    /// Creates a model-exchange controller with the default interval.
    pub fn new() -> Self {
        Self {
            kind: SubsystemKind::ModelExchange,
            interval: DEFAULT_INTERVAL,
            data: ControllerData::default(),
            in_event_mode: false,
        }
    }

    /// Overrides the interval of `r`.
    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    /// Switches the subsystem kind.
    pub fn with_kind(mut self, kind: SubsystemKind) -> Self {
        self.kind = kind;
        self
    }

    fn ur(&self) -> f64 {
        if self.data.r {
            self.data.ur + self.data.command
        } else {
            self.data.ur
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for Controller {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    fn variables(&self) -> Vec<VariableDesc> {
        vec![
            VariableDesc::clock("r", Causality::Input),
            VariableDesc::continuous("xr", Causality::Input),
            VariableDesc::continuous("ur", Causality::Output),
            VariableDesc::continuous("pre_ur", Causality::Local),
            VariableDesc::continuous("as", Causality::Input),
            VariableDesc::clock("s", Causality::Input),
        ]
    }

    fn get_continuous(&mut self, names: &[&str]) -> ValueResult<Vec<f64>> {
        let ur = self.ur();
        let data = &self.data;
        read_each(names, |name| match name {
            "xr" => Some(data.xr),
            "ur" => Some(ur),
            "pre_ur" => Some(data.pre_ur),
            "as" => Some(data.command),
            _ => None,
        })
    }

    fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> CallResult<()> {
        let data = &mut self.data;
        write_each(names, values, |name, value| match name {
            "xr" => {
                data.xr = value;
                true
            }
            "as" => {
                data.command = value;
                true
            }
            _ => false,
        })
    }

    fn get_clock(&mut self, names: &[&str]) -> ValueResult<Vec<bool>> {
        names
            .iter()
            .map(|&name| match name {
                "r" => Ok(self.data.r),
                "s" => Ok(self.data.s),
                other => Err(Fault::unknown_variable(other)),
            })
            .collect::<CallResult<Vec<bool>>>()
            .map(Reply::ok)
    }

    fn set_clock(&mut self, names: &[&str], values: &[bool]) -> CallResult<()> {
        if !self.in_event_mode {
            return Err(Fault::error("Clocks can only be set in event mode"));
        }
        let data = &mut self.data;
        write_each(names, values, |name, value| match name {
            "r" => {
                data.r = value;
                true
            }
            "s" => {
                data.s = value;
                true
            }
            _ => false,
        })
    }

    fn get_interval(&mut self, clock: &str) -> ValueResult<f64> {
        match clock {
            "r" => Ok(self.interval.into()),
            other => Err(Fault::unknown_variable(other)),
        }
    }

    fn exit_initialization(&mut self) -> CallResult<()> {
        self.in_event_mode = true;
        Ok(())
    }

    fn enter_event_mode(&mut self) -> CallResult<()> {
        self.in_event_mode = true;
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
        if self.data.r {
            self.data.pre_ur = self.data.ur;
            self.data.ur += self.data.command;
        }
        self.data.r = false;
        self.data.s = false;
        Ok(DiscreteUpdate::default().into())
    }

    fn step(&mut self, time: SimTime, step: SimTime) -> ValueResult<StepOutcome> {
        if self.kind != SubsystemKind::CoSimulation {
            return Err(Fault::error("Controller was not instantiated for co-simulation"));
        }
        Ok(StepOutcome {
            last_successful_time: time + step,
            ..StepOutcome::default()
        }
        .into())
    }

    fn reset(&mut self) -> CallResult<()> {
        self.data = ControllerData::default();
        self.in_event_mode = false;
        Ok(())
    }
}
