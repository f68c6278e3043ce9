//! Dependency-ordered event dispatch.
//!
//! When the coordinator detects a time event, a state event, or both in the
//! same tick, it hands control to the [`EventDispatcher`]. The dispatcher:
//!
//! 1. consumes the fired periodic timers,
//! 2. puts every affected subsystem into event mode, once, in dependency order,
//! 3. handles all state events (output clock -> dependent input clocks and
//!    clocked values), then all time events (input clock activation and
//!    clocked outputs),
//! 4. runs one discrete-state update pass over the affected subsystems in
//!    dependency order,
//! 5. returns every affected subsystem to free stepping.
//!
//! State events are handled before time events so that the effects of an
//! asynchronous signal are visible to the periodic partition consuming them.

use tracing::{debug, warn};

use crate::coupling::{PeriodicClock, StateEventSource};
use crate::error::{OrchestratorError, Result};
use crate::handle::SubsystemHandle;
use crate::subsystem::DiscreteUpdate;
use crate::timer::PeriodicTimer;
use crate::topology::DependencyOrder;
use crate::types::{SimTime, SubsystemId};

/// Events detected for the current instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FiredEvents {
    /// Indices of fired periodic clocks
    pub time_events: Vec<usize>,
    /// Indices of state-event sources whose indicator crossed zero
    pub state_events: Vec<usize>,
}

impl FiredEvents {
    /// Returns true if nothing fired.
    pub fn is_empty(&self) -> bool {
        self.time_events.is_empty() && self.state_events.is_empty()
    }

    /// Returns true if a periodic clock fired.
    pub fn has_time_event(&self) -> bool {
        !self.time_events.is_empty()
    }

    /// Returns true if a state event was detected.
    pub fn has_state_event(&self) -> bool {
        !self.state_events.is_empty()
    }

    /// Which of the three dispatch branches applies.
    pub fn branch(&self) -> Option<DispatchBranch> {
        match (self.has_time_event(), self.has_state_event()) {
            (false, false) => None,
            (true, false) => Some(DispatchBranch::TimeOnly),
            (false, true) => Some(DispatchBranch::StateOnly),
            (true, true) => Some(DispatchBranch::Simultaneous),
        }
    }
}

/// The dispatch branch taken for one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchBranch {
    TimeOnly,
    StateOnly,
    Simultaneous,
}

/// What one dispatch did.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchReport {
    /// The branch taken
    pub branch: DispatchBranch,
    /// Subsystems that went through event mode, in dependency order
    pub affected: Vec<SubsystemId>,
    /// Discrete update flags, in dependency order
    pub updates: Vec<(SubsystemId, DiscreteUpdate)>,
}

/// Drives affected subsystems through the event-handling protocol.
#[derive(Clone, Debug)]
pub struct EventDispatcher {
    order: DependencyOrder,
    periodic: Vec<PeriodicClock>,
    state_sources: Vec<StateEventSource>,
}

impl EventDispatcher {
    /// Creates a dispatcher for fixed couplings.
    pub fn new(
        order: DependencyOrder,
        periodic: Vec<PeriodicClock>,
        state_sources: Vec<StateEventSource>,
    ) -> Self {
        Self {
            order,
            periodic,
            state_sources,
        }
    }

    /// The dependency order used for activation.
    pub fn order(&self) -> &DependencyOrder {
        &self.order
    }

    /// Periodic clocks, indexed like the coordinator's timers.
    pub fn periodic(&self) -> &[PeriodicClock] {
        &self.periodic
    }

    /// State-event sources, indexed like the coordinator's trackers.
    pub fn state_sources(&self) -> &[StateEventSource] {
        &self.state_sources
    }

    /// Subsystems affected by `fired`, in dependency order.
    pub fn affected(&self, fired: &FiredEvents) -> Vec<SubsystemId> {
        let mut affected: Vec<SubsystemId> = fired
            .state_events
            .iter()
            .flat_map(|&i| self.state_sources[i].affected())
            .chain(
                fired
                    .time_events
                    .iter()
                    .flat_map(|&i| self.periodic[i].affected()),
            )
            .collect();
        self.order.sort(&mut affected);
        affected
    }

    /// Handles the events of one instant.
    ///
    /// Returns `None` if nothing fired. Any failing call aborts the dispatch
    /// immediately; nothing is rolled back.
    pub fn dispatch(
        &self,
        handles: &mut [SubsystemHandle],
        timers: &mut [PeriodicTimer],
        fired: &FiredEvents,
        time: SimTime,
    ) -> Result<Option<DispatchReport>> {
        let Some(branch) = fired.branch() else {
            return Ok(None);
        };

        for &i in &fired.time_events {
            timers[i].reset();
        }

        let affected = self.affected(fired);
        debug!(
            time,
            ?branch,
            affected = ?affected
                .iter()
                .map(|id| handles[id.index()].name())
                .collect::<Vec<_>>(),
            "entering event mode"
        );

        for id in &affected {
            handles[id.index()].enter_event_mode()?;
        }

        let mut state_events = fired.state_events.clone();
        state_events.sort_by_key(|&i| self.order.rank(self.state_sources[i].owner()));
        for i in state_events {
            self.handle_state_event(handles, &self.state_sources[i])?;
        }

        let mut time_events = fired.time_events.clone();
        time_events.sort_by_key(|&i| self.order.rank(self.periodic[i].owner()));
        for i in time_events {
            self.handle_time_event(handles, &self.periodic[i])?;
        }

        let mut updates = Vec::with_capacity(affected.len());
        for &id in &affected {
            let handle = &mut handles[id.index()];
            let update = handle.update_discrete_states()?;
            if update.needs_update {
                warn!(
                    subsystem = handle.name(),
                    "discrete states need another update; a single pass is performed"
                );
            }
            if let Some(next) = update.next_event_time {
                debug!(subsystem = handle.name(), next, "next event time announced");
            }
            updates.push((id, update));
        }

        for id in &affected {
            handles[id.index()].enter_free_mode()?;
        }
        debug!(time, "exited event mode");

        Ok(Some(DispatchReport {
            branch,
            affected,
            updates,
        }))
    }

    fn handle_state_event(
        &self,
        handles: &mut [SubsystemHandle],
        source: &StateEventSource,
    ) -> Result<()> {
        let clock = &source.output_clock;
        let owner = &mut handles[clock.subsystem.index()];
        let active = owner.get_clock(&[clock.name.as_str()])?;
        if !active[0] {
            return Err(OrchestratorError::ProtocolViolation {
                subsystem: owner.name().to_string(),
                operation: "get_clock",
                detail: format!(
                    "output clock '{}' is inactive although a state event was detected",
                    clock.name
                ),
            });
        }

        for target in &source.clock_links {
            handles[target.subsystem.index()].set_clock(&[target.name.as_str()], &[true])?;
        }
        for link in &source.outputs {
            link.transfer(handles)?;
        }
        Ok(())
    }

    fn handle_time_event(
        &self,
        handles: &mut [SubsystemHandle],
        periodic: &PeriodicClock,
    ) -> Result<()> {
        let clock = &periodic.clock;
        handles[clock.subsystem.index()].set_clock(&[clock.name.as_str()], &[true])?;
        for link in &periodic.outputs {
            link.transfer(handles)?;
        }
        Ok(())
    }
}
