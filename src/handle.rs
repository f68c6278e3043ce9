//! Owned subsystem handles.
//!
//! A [`SubsystemHandle`] wraps one boxed [`Subsystem`] together with its
//! name and its lifecycle [`Mode`]. All protocol calls go through the handle,
//! which checks the mode transition first, classifies the returned status and
//! validates the shape of returned data. The handle is the only place where
//! a [`Fault`] turns into an [`OrchestratorError`].

use tracing::{debug, error, warn};

use crate::error::{OrchestratorError, Result};
use crate::mode::Mode;
use crate::subsystem::{
    CallResult, DiscreteUpdate, Fault, Subsystem, SubsystemKind, ValueResult, VariableDesc,
    VariableKind,
};
use crate::types::SimTime;

/// Orchestrator-side wrapper of one subsystem.
pub struct SubsystemHandle {
    name: String,
    kind: SubsystemKind,
    mode: Mode,
    variables: Vec<VariableDesc>,
    inner: Box<dyn Subsystem>,
    poisoned: bool,
    event_mode_entries: u64,
}

impl SubsystemHandle {
    /// Wraps a freshly instantiated subsystem.
    pub fn new(name: impl Into<String>, subsystem: Box<dyn Subsystem>) -> Self {
        let kind = subsystem.kind();
        let variables = subsystem.variables();
        Self {
            name: name.into(),
            kind,
            mode: Mode::Instantiated,
            variables,
            inner: subsystem,
            poisoned: false,
            event_mode_entries: 0,
        }
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how the subsystem advances time.
    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    /// Returns the current lifecycle mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns true once the subsystem reported `Fatal`.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Number of times the subsystem entered event mode after initialization.
    pub fn event_mode_entries(&self) -> u64 {
        self.event_mode_entries
    }

    /// Declared variables and clocks.
    pub fn variables(&self) -> &[VariableDesc] {
        &self.variables
    }

    /// Returns true if `name` is declared with the given kind.
    pub fn declares(&self, name: &str, kind: VariableKind) -> bool {
        self.variables
            .iter()
            .any(|v| v.name == name && v.kind == kind)
    }

    /// Returns true if the subsystem exposes an event indicator.
    pub fn has_event_indicator(&self) -> bool {
        self.inner.has_event_indicator()
    }

    /// A unit call: a warning is logged and the call continues.
    fn check_unit(&mut self, operation: &'static str, result: CallResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(fault) if fault.status.is_continuable() => {
                warn!(subsystem = %self.name, operation, "{}", fault.message);
                Ok(())
            }
            Err(fault) => Err(self.classify(operation, fault)),
        }
    }

    /// A value call: a warning travels with the value, is logged and the
    /// value is passed on. A bare warning without a value fails the call.
    fn check_value<T>(&mut self, operation: &'static str, result: ValueResult<T>) -> Result<T> {
        let reply = result.map_err(|fault| self.classify(operation, fault))?;
        match reply.warning {
            Some(fault) if !fault.status.is_continuable() => {
                Err(self.classify(operation, fault))
            }
            Some(fault) => {
                warn!(subsystem = %self.name, operation, "{}", fault.message);
                Ok(reply.value)
            }
            None => Ok(reply.value),
        }
    }

    fn classify(&mut self, operation: &'static str, fault: Fault) -> OrchestratorError {
        error!(
            subsystem = %self.name,
            operation,
            status = %fault.status,
            "{}",
            fault.message
        );
        if fault.status.aborts_run() {
            self.poisoned = true;
            OrchestratorError::SubsystemFatal {
                subsystem: self.name.clone(),
                operation,
                message: fault.message,
            }
        } else {
            OrchestratorError::SubsystemFailed {
                subsystem: self.name.clone(),
                operation,
                status: fault.status,
                message: fault.message,
            }
        }
    }

    fn validation(&self, operation: &'static str, detail: String) -> OrchestratorError {
        error!(subsystem = %self.name, operation, "{}", detail);
        OrchestratorError::Validation {
            subsystem: self.name.clone(),
            operation,
            detail,
        }
    }

    fn protocol(&self, operation: &'static str, detail: String) -> OrchestratorError {
        error!(subsystem = %self.name, operation, "{}", detail);
        OrchestratorError::ProtocolViolation {
            subsystem: self.name.clone(),
            operation,
            detail,
        }
    }

    fn ensure_transition(&self, to: Mode) -> Result<()> {
        if self.mode.can_transition_to(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                subsystem: self.name.clone(),
                from: self.mode,
                to,
            })
        }
    }

    fn ensure_mode(&self, operation: &'static str, expected: Mode) -> Result<()> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(self.protocol(
                operation,
                format!("requires {expected} but subsystem is in {}", self.mode),
            ))
        }
    }

    fn ensure_declared(
        &self,
        operation: &'static str,
        names: &[&str],
        kind: VariableKind,
    ) -> Result<()> {
        match names.iter().find(|name| !self.declares(name, kind)) {
            Some(name) => Err(self.validation(
                operation,
                format!("undeclared {kind:?} variable '{name}'"),
            )),
            None => Ok(()),
        }
    }

    fn ensure_count(
        &self,
        operation: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(self.validation(
                operation,
                format!("expected {expected} values but got {actual}"),
            ))
        }
    }

    /// Reads named continuous variables.
    pub fn get_continuous(&mut self, names: &[&str]) -> Result<Vec<f64>> {
        const OP: &str = "get_continuous";
        self.ensure_declared(OP, names, VariableKind::Continuous)?;
        let result = self.inner.get_continuous(names);
        let values = self.check_value(OP, result)?;
        self.ensure_count(OP, names.len(), values.len())?;
        Ok(values)
    }

    /// Reads a single continuous variable.
    pub fn get_value(&mut self, name: &str) -> Result<f64> {
        let values = self.get_continuous(&[name])?;
        Ok(values[0])
    }

    /// Writes named continuous variables.
    pub fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> Result<()> {
        const OP: &str = "set_continuous";
        self.ensure_declared(OP, names, VariableKind::Continuous)?;
        self.ensure_count(OP, names.len(), values.len())?;
        let result = self.inner.set_continuous(names, values);
        self.check_unit(OP, result)
    }

    /// Reads named clocks. Only legal in event mode.
    pub fn get_clock(&mut self, names: &[&str]) -> Result<Vec<bool>> {
        const OP: &str = "get_clock";
        self.ensure_mode(OP, Mode::EventMode)?;
        self.ensure_declared(OP, names, VariableKind::Clock)?;
        let result = self.inner.get_clock(names);
        let values = self.check_value(OP, result)?;
        self.ensure_count(OP, names.len(), values.len())?;
        Ok(values)
    }

    /// Activates or deactivates named input clocks. Only legal in event mode.
    pub fn set_clock(&mut self, names: &[&str], values: &[bool]) -> Result<()> {
        const OP: &str = "set_clock";
        self.ensure_mode(OP, Mode::EventMode)?;
        self.ensure_declared(OP, names, VariableKind::Clock)?;
        self.ensure_count(OP, names.len(), values.len())?;
        let result = self.inner.set_clock(names, values);
        self.check_unit(OP, result)
    }

    /// Fetches the interval of a periodic clock.
    pub fn get_interval(&mut self, clock: &str) -> Result<f64> {
        const OP: &str = "get_interval";
        self.ensure_declared(OP, &[clock], VariableKind::Clock)?;
        let result = self.inner.get_interval(clock);
        let interval = self.check_value(OP, result)?;
        if interval > 0.0 && interval.is_finite() {
            Ok(interval)
        } else {
            Err(self.validation(OP, format!("clock {clock} has invalid interval {interval}")))
        }
    }

    /// Samples the event indicator.
    pub fn event_indicator(&mut self) -> Result<f64> {
        let result = self.inner.event_indicator();
        self.check_value("event_indicator", result)
    }

    /// Enters initialization mode.
    pub fn enter_initialization(
        &mut self,
        tolerance: Option<f64>,
        start: SimTime,
        stop: SimTime,
    ) -> Result<()> {
        self.ensure_transition(Mode::Initializing)?;
        let result = self.inner.enter_initialization(tolerance, start, stop);
        self.check_unit("enter_initialization", result)?;
        self.mode = Mode::Initializing;
        Ok(())
    }

    /// Leaves initialization mode; the subsystem ends up in event mode.
    pub fn exit_initialization(&mut self) -> Result<()> {
        self.ensure_transition(Mode::EventMode)?;
        let result = self.inner.exit_initialization();
        self.check_unit("exit_initialization", result)?;
        self.mode = Mode::EventMode;
        Ok(())
    }

    /// Enters event mode from free stepping.
    pub fn enter_event_mode(&mut self) -> Result<()> {
        self.ensure_transition(Mode::EventMode)?;
        let result = self.inner.enter_event_mode();
        self.check_unit("enter_event_mode", result)?;
        self.mode = Mode::EventMode;
        self.event_mode_entries += 1;
        debug!(subsystem = %self.name, "entered event mode");
        Ok(())
    }

    /// Leaves event mode into step mode or continuous-time mode, depending
    /// on the subsystem kind.
    pub fn enter_free_mode(&mut self) -> Result<()> {
        match self.kind {
            SubsystemKind::CoSimulation => {
                self.ensure_transition(Mode::StepMode)?;
                let result = self.inner.enter_step_mode();
                self.check_unit("enter_step_mode", result)?;
                self.mode = Mode::StepMode;
            }
            SubsystemKind::ModelExchange => {
                self.ensure_transition(Mode::ContinuousTimeMode)?;
                let result = self.inner.enter_continuous_time_mode();
                self.check_unit("enter_continuous_time_mode", result)?;
                self.mode = Mode::ContinuousTimeMode;
            }
        }
        Ok(())
    }

    /// Runs one discrete-state update pass.
    pub fn update_discrete_states(&mut self) -> Result<DiscreteUpdate> {
        const OP: &str = "update_discrete_states";
        self.ensure_mode(OP, Mode::EventMode)?;
        let result = self.inner.update_discrete_states();
        let update = self.check_value(OP, result)?;
        if update.terminate {
            return Err(OrchestratorError::TerminationRequested {
                subsystem: self.name.clone(),
                operation: OP,
            });
        }
        Ok(update)
    }

    /// Advances continuous time from `time` by `step`.
    ///
    /// Co-simulation subsystems step themselves. Model-exchange subsystems
    /// are integrated here with one explicit Euler step. Returns true if a
    /// co-simulation subsystem reported that it needs event handling.
    pub fn advance(&mut self, time: SimTime, step: SimTime) -> Result<bool> {
        const OP: &str = "advance";
        if !self.mode.is_free_running() {
            return Err(self.protocol(
                OP,
                format!("cannot advance time while in {}", self.mode),
            ));
        }

        match self.kind {
            SubsystemKind::CoSimulation => {
                let result = self.inner.step(time, step);
                let outcome = self.check_value("step", result)?;
                if outcome.terminate {
                    return Err(OrchestratorError::TerminationRequested {
                        subsystem: self.name.clone(),
                        operation: "step",
                    });
                }
                if outcome.early_return {
                    warn!(
                        subsystem = %self.name,
                        last_successful_time = outcome.last_successful_time,
                        "step returned early"
                    );
                }
                Ok(outcome.state_event)
            }
            SubsystemKind::ModelExchange => {
                let result = self.inner.continuous_states();
                let mut states = self.check_value("continuous_states", result)?;
                if !states.is_empty() {
                    let result = self.inner.derivatives();
                    let derivatives = self.check_value("derivatives", result)?;
                    self.ensure_count("derivatives", states.len(), derivatives.len())?;
                    for (x, dx) in states.iter_mut().zip(&derivatives) {
                        *x += step * dx;
                    }
                }
                let result = self.inner.set_time(time + step);
                self.check_unit("set_time", result)?;
                if !states.is_empty() {
                    let result = self.inner.set_continuous_states(&states);
                    self.check_unit("set_continuous_states", result)?;
                }
                Ok(false)
            }
        }
    }

    /// Restores the instantiation state.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_transition(Mode::Instantiated)?;
        let result = self.inner.reset();
        self.check_unit("reset", result)?;
        self.mode = Mode::Instantiated;
        Ok(())
    }

    /// Terminates the subsystem.
    pub fn terminate(&mut self) -> Result<()> {
        self.ensure_transition(Mode::Terminated)?;
        let result = self.inner.terminate();
        self.check_unit("terminate", result)?;
        self.mode = Mode::Terminated;
        Ok(())
    }
}

impl std::fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
