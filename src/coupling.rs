//! Couplings between subsystems.
//!
//! Subsystems talk to each other only through the links declared here:
//!
//! - [`ValueLink`]: copy one continuous variable into another subsystem's input.
//! - [`PeriodicClock`]: an input clock driven by a periodic timer, plus the
//!   clocked outputs its partition produces.
//! - [`StateEventSource`]: an output clock raised by a zero crossing, the input
//!   clocks it activates and the clocked outputs it produces.
//! - [`Column`]: a variable sampled for recording at every tick.

use crate::error::{OrchestratorError, Result};
use crate::handle::SubsystemHandle;
use crate::subsystem::VariableKind;
use crate::types::{SubsystemId, VarRef};

/// Copies `from` into `to`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueLink {
    /// Source output variable
    pub from: VarRef,
    /// Destination input variable
    pub to: VarRef,
}

impl ValueLink {
    /// Creates a new value link.
    pub fn new(from: VarRef, to: VarRef) -> Self {
        Self { from, to }
    }

    /// Reads the source and writes the destination. Returns the value moved.
    pub fn transfer(&self, handles: &mut [SubsystemHandle]) -> Result<f64> {
        let value = handles[self.from.subsystem.index()].get_value(&self.from.name)?;
        handles[self.to.subsystem.index()].set_continuous(&[self.to.name.as_str()], &[value])?;
        Ok(value)
    }
}

/// A periodic input clock and the clocked outputs of its partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodicClock {
    /// The owner's input clock (its interval is fetched at initialization)
    pub clock: VarRef,
    /// Additional subsystems that must enter event mode when the clock ticks
    pub participants: Vec<SubsystemId>,
    /// Clocked outputs exchanged after the clock is activated
    pub outputs: Vec<ValueLink>,
}

impl PeriodicClock {
    /// Creates a periodic clock on `clock` with no outputs.
    pub fn new(clock: VarRef) -> Self {
        Self {
            clock,
            participants: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Adds a clocked output link.
    pub fn with_output(mut self, link: ValueLink) -> Self {
        self.outputs.push(link);
        self
    }

    /// Adds a subsystem that joins event mode when the clock ticks.
    pub fn with_participant(mut self, id: SubsystemId) -> Self {
        self.participants.push(id);
        self
    }

    /// The subsystem owning the clock.
    pub fn owner(&self) -> SubsystemId {
        self.clock.subsystem
    }

    /// Every subsystem that enters event mode when the clock ticks.
    pub fn affected(&self) -> Vec<SubsystemId> {
        let mut ids = vec![self.owner()];
        ids.extend(self.participants.iter().copied());
        ids.extend(self.outputs.iter().map(|l| l.to.subsystem));
        ids
    }
}

/// An output clock raised by a state event and what it drives.
#[derive(Clone, Debug, PartialEq)]
pub struct StateEventSource {
    /// The owner's output clock, latched when it enters event mode
    pub output_clock: VarRef,
    /// Input clocks of dependents activated by the output clock
    pub clock_links: Vec<VarRef>,
    /// Clocked outputs propagated to dependents
    pub outputs: Vec<ValueLink>,
}

impl StateEventSource {
    /// Creates a state-event source on `output_clock`.
    pub fn new(output_clock: VarRef) -> Self {
        Self {
            output_clock,
            clock_links: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Adds a dependent input clock.
    pub fn with_clock_link(mut self, target: VarRef) -> Self {
        self.clock_links.push(target);
        self
    }

    /// Adds a clocked output link.
    pub fn with_output(mut self, link: ValueLink) -> Self {
        self.outputs.push(link);
        self
    }

    /// The subsystem owning the output clock.
    pub fn owner(&self) -> SubsystemId {
        self.output_clock.subsystem
    }

    /// The owner and its direct dependents.
    pub fn affected(&self) -> Vec<SubsystemId> {
        let mut ids = vec![self.owner()];
        ids.extend(self.clock_links.iter().map(|c| c.subsystem));
        ids.extend(self.outputs.iter().map(|l| l.to.subsystem));
        ids
    }
}

/// A recorded variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Column label
    pub label: String,
    /// Variable to read
    pub var: VarRef,
}

impl Column {
    /// Records `var` under `label`.
    pub fn new(label: impl Into<String>, var: VarRef) -> Self {
        Self {
            label: label.into(),
            var,
        }
    }
}

/// Checks that `var` names a declared variable of the given kind.
pub(crate) fn check_declared(
    handles: &[SubsystemHandle],
    var: &VarRef,
    kind: VariableKind,
    context: &'static str,
) -> Result<()> {
    let Some(handle) = handles.get(var.subsystem.index()) else {
        return Err(OrchestratorError::Validation {
            subsystem: var.subsystem.to_string(),
            operation: context,
            detail: "unknown subsystem".to_string(),
        });
    };
    if handle.declares(&var.name, kind) {
        Ok(())
    } else {
        Err(OrchestratorError::Validation {
            subsystem: handle.name().to_string(),
            operation: context,
            detail: format!("'{}' is not a declared {kind:?} variable", var.name),
        })
    }
}

/// Checks both ends of a value link.
pub(crate) fn check_link(
    handles: &[SubsystemHandle],
    link: &ValueLink,
    context: &'static str,
) -> Result<()> {
    check_declared(handles, &link.from, VariableKind::Continuous, context)?;
    check_declared(handles, &link.to, VariableKind::Continuous, context)
}
