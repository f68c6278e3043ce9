//! The subsystem capability interface.
//!
//! A subsystem is one independently stepped model. The orchestrator never
//! looks inside it; it only calls the operations of the [`Subsystem`] trait
//! and decides *when* to call *which* one.
//!
//! Operations without a result return a [`CallResult`]; operations that
//! produce a value return a [`ValueResult`], whose [`Reply`] may carry a
//! warning next to the value. A failing call carries a [`Fault`] whose
//! [`Status`] tells the orchestrator how far the failure reaches: a warning
//! is continuable, `Discard`/`Error` abort the current tick, `Fatal` aborts
//! the whole run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Status reported by a subsystem call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
}

impl Status {
    /// Returns true if the orchestrator may carry on after this status.
    pub fn is_continuable(self) -> bool {
        self <= Status::Warning
    }

    /// Returns true if this status ends the run immediately.
    pub fn aborts_run(self) -> bool {
        self == Status::Fatal
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::Warning => "Warning",
            Status::Discard => "Discard",
            Status::Error => "Error",
            Status::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

/// A non-OK outcome of a subsystem call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    /// Severity of the failure
    pub status: Status,
    /// Human readable description from the subsystem
    pub message: String,
}

impl Fault {
    /// Creates a fault with an explicit status.
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// A continuable warning.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Status::Warning, message)
    }

    /// The call was discarded by the subsystem.
    pub fn discard(message: impl Into<String>) -> Self {
        Self::new(Status::Discard, message)
    }

    /// The call failed.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    /// The subsystem is unusable from now on.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Status::Fatal, message)
    }

    /// Standard fault for a variable or clock the subsystem does not know.
    pub fn unknown_variable(name: &str) -> Self {
        Self::error(format!("Unexpected variable: {name}"))
    }
}

/// Result of a subsystem call. An `Err` with [`Status::Warning`] is
/// continuable.
pub type CallResult<T> = Result<T, Fault>;

/// Value returned by a successful call, with the warning reported along
/// with it, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub warning: Option<Fault>,
}

impl<T> Reply<T> {
    /// A plain OK reply.
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    /// A reply whose status is `Warning`.
    pub fn warning(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            warning: Some(Fault::warning(message)),
        }
    }
}

impl<T> From<T> for Reply<T> {
    fn from(value: T) -> Self {
        Self::ok(value)
    }
}

/// Result of a subsystem call that produces a value.
pub type ValueResult<T> = Result<Reply<T>, Fault>;

/// How a subsystem advances continuous time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubsystemKind {
    /// The subsystem integrates itself through `step`.
    CoSimulation,
    /// The orchestrator integrates the continuous state vector.
    ModelExchange,
}

/// Whether a variable is a continuous value or a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Continuous,
    Clock,
}

/// Direction of a variable as seen from the owning subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Causality {
    Input,
    Output,
    Local,
}

/// Static description of one variable exposed by a subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDesc {
    /// Variable name (e.g. "x", "ur", "r")
    pub name: String,
    /// Value or clock
    pub kind: VariableKind,
    /// Input, output or local
    pub causality: Causality,
}

impl VariableDesc {
    /// Creates a continuous variable description.
    pub fn continuous(name: impl Into<String>, causality: Causality) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Continuous,
            causality,
        }
    }

    /// Creates a clock description.
    pub fn clock(name: impl Into<String>, causality: Causality) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Clock,
            causality,
        }
    }
}

/// Flags returned by `update_discrete_states`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiscreteUpdate {
    /// Another discrete update pass would change something
    pub needs_update: bool,
    /// The subsystem requests the end of the simulation
    pub terminate: bool,
    /// Continuous state values were changed by the update
    pub states_changed: bool,
    /// Next time event requested by the subsystem, if any
    pub next_event_time: Option<SimTime>,
}

impl DiscreteUpdate {
    /// Returns true if the subsystem announced a next event time.
    pub fn next_event_time_defined(&self) -> bool {
        self.next_event_time.is_some()
    }
}

/// Flags returned by a co-simulation `step`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepOutcome {
    /// The subsystem needs event handling at the end of the step
    pub state_event: bool,
    /// The subsystem requests the end of the simulation
    pub terminate: bool,
    /// The step stopped before the requested communication point
    pub early_return: bool,
    /// Last time the subsystem reached successfully
    pub last_successful_time: SimTime,
}

/// The uniform capability interface of a stepped model.
///
/// Implementors only have to provide the operations their kind needs; the
/// defaults describe a subsystem with no continuous states, no event
/// indicator and trivial mode transitions.
pub trait Subsystem: Send {
    /// How this subsystem advances continuous time.
    fn kind(&self) -> SubsystemKind;

    /// Variables and clocks this subsystem exposes.
    fn variables(&self) -> Vec<VariableDesc>;

    /// Reads named continuous variables.
    fn get_continuous(&mut self, names: &[&str]) -> ValueResult<Vec<f64>>;

    /// Writes named continuous variables.
    fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> CallResult<()>;

    /// Reads named clocks. Reading an active clock consumes its activation.
    fn get_clock(&mut self, _names: &[&str]) -> ValueResult<Vec<bool>> {
        Err(Fault::error("Subsystem has no output clocks"))
    }

    /// Activates or deactivates named input clocks.
    fn set_clock(&mut self, _names: &[&str], _values: &[bool]) -> CallResult<()> {
        Err(Fault::error("Subsystem has no input clocks"))
    }

    /// Interval of a periodic clock.
    fn get_interval(&mut self, clock: &str) -> ValueResult<f64> {
        Err(Fault::error(format!("Clock {clock} has no interval")))
    }

    /// Returns true if [`Subsystem::event_indicator`] is meaningful.
    fn has_event_indicator(&self) -> bool {
        false
    }

    /// Current value of the zero-crossing function.
    fn event_indicator(&mut self) -> ValueResult<f64> {
        Err(Fault::error("Subsystem has no event indicator"))
    }

    /// Continuous state vector (model-exchange only).
    fn continuous_states(&mut self) -> ValueResult<Vec<f64>> {
        Ok(Vec::new().into())
    }

    /// Overwrites the continuous state vector (model-exchange only).
    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<()> {
        if states.is_empty() {
            Ok(())
        } else {
            Err(Fault::error(format!(
                "Unexpected number of continuous states: {}",
                states.len()
            )))
        }
    }

    /// Derivatives of the continuous state vector (model-exchange only).
    fn derivatives(&mut self) -> ValueResult<Vec<f64>> {
        Ok(Vec::new().into())
    }

    /// Sets the independent variable (model-exchange only).
    fn set_time(&mut self, _time: SimTime) -> CallResult<()> {
        Ok(())
    }

    /// Enters initialization mode.
    fn enter_initialization(
        &mut self,
        _tolerance: Option<f64>,
        _start: SimTime,
        _stop: SimTime,
    ) -> CallResult<()> {
        Ok(())
    }

    /// Leaves initialization mode.
    fn exit_initialization(&mut self) -> CallResult<()> {
        Ok(())
    }

    /// Enters event mode.
    fn enter_event_mode(&mut self) -> CallResult<()> {
        Ok(())
    }

    /// Leaves event mode into free stepping (co-simulation).
    fn enter_step_mode(&mut self) -> CallResult<()> {
        Ok(())
    }

    /// Leaves event mode into free integration (model-exchange).
    fn enter_continuous_time_mode(&mut self) -> CallResult<()> {
        Ok(())
    }

    /// Executes the clocked partitions whose clocks are active.
    fn update_discrete_states(&mut self) -> ValueResult<DiscreteUpdate> {
        Ok(DiscreteUpdate::default().into())
    }

    /// Advances a co-simulation subsystem from `time` by `step`.
    fn step(&mut self, _time: SimTime, _step: SimTime) -> ValueResult<StepOutcome> {
        Err(Fault::error("step is not supported by this subsystem"))
    }

    /// Restores the state produced by instantiation.
    fn reset(&mut self) -> CallResult<()>;

    /// Ends the simulation for this subsystem.
    fn terminate(&mut self) -> CallResult<()> {
        Ok(())
    }
}
