//! The step coordinator.
//!
//! The [`Orchestrator`] owns every subsystem handle for the whole run and
//! drives them through three phases:
//!
//! - **Initializing**: enter initialization mode, exchange the initial
//!   clocked and continuous values, fetch the periodic interval, seed the
//!   indicator trackers, leave initialization and record the first sample.
//! - **Stepping**: advance every subsystem by the fixed step, detect time and
//!   state events, exchange continuous values, record, and dispatch events.
//! - **Finalizing**: reset, terminate and release every subsystem, even after
//!   a failed run.
//!
//! # Example
//!
//! ```
//! use cosync::coordinator::Orchestrator;
//! use cosync::coupling::{PeriodicClock, ValueLink};
//! use cosync::models::{Controller, Plant};
//! use cosync::record::Trajectory;
//! use cosync::types::VarRef;
//!
//! let mut orchestrator = Orchestrator::new(0.0, 1.0, 0.01);
//! let controller = orchestrator.add_subsystem("controller", Box::new(Controller::new())).unwrap();
//! let plant = orchestrator.add_subsystem("plant", Box::new(Plant::new())).unwrap();
//! orchestrator
//!     .add_periodic_clock(PeriodicClock::new(VarRef::new(controller, "r")).with_output(
//!         ValueLink::new(VarRef::new(controller, "ur"), VarRef::new(plant, "u")),
//!     ))
//!     .unwrap();
//! orchestrator.add_column("x", VarRef::new(plant, "x")).unwrap();
//!
//! let mut trajectory = Trajectory::new();
//! let stats = orchestrator.run(&mut trajectory).unwrap();
//! assert_eq!(stats.ticks, 101);
//! assert_eq!(stats.time_events, 10);
//! ```

use std::collections::HashSet;

use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigError, SimConfig};
use crate::coupling::{
    check_declared, check_link, PeriodicClock, Column, StateEventSource, ValueLink,
};
use crate::dispatcher::{DispatchBranch, DispatchReport, EventDispatcher, FiredEvents};
use crate::error::{OrchestratorError, Result};
use crate::handle::SubsystemHandle;
use crate::indicator::IndicatorTracker;
use crate::record::{Recorder, Sample};
use crate::registry::ModelRegistry;
use crate::stats::{RunStats, Timer};
use crate::subsystem::{Subsystem, SubsystemKind, VariableKind};
use crate::timer::{PeriodicTimer, SimulationClock};
use crate::topology::{Dependency, DependencyOrder};
use crate::types::{SimTime, SubsystemId, VarRef};

/// Lifecycle phase of the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Subsystems and couplings may still be added
    Setup,
    /// Initialized; `step` advances time
    Stepping,
    /// A call failed; only finalization is possible
    Failed,
    /// Every subsystem was terminated and released
    Released,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "in setup",
            Phase::Stepping => "stepping",
            Phase::Failed => "failed",
            Phase::Released => "released",
        }
    }
}

/// What happened during one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    /// Index of the instant reached
    pub tick: u64,
    /// Simulated time reached
    pub time: SimTime,
    /// Events detected at this instant
    pub fired: FiredEvents,
    /// Event handling, if anything fired
    pub dispatch: Option<DispatchReport>,
}

/// Fixed-step hybrid co-simulation orchestrator.
pub struct Orchestrator {
    handles: Vec<SubsystemHandle>,
    dependencies: Vec<Dependency>,
    continuous_links: Vec<ValueLink>,
    periodic: Vec<PeriodicClock>,
    state_sources: Vec<StateEventSource>,
    columns: Vec<Column>,
    tolerance: Option<f64>,
    clock: SimulationClock,
    timers: Vec<PeriodicTimer>,
    // One per state source; `None` when the owner reports crossings from `step`.
    trackers: Vec<Option<IndicatorTracker>>,
    dispatcher: Option<EventDispatcher>,
    stats: RunStats,
    phase: Phase,
}

impl Orchestrator {
    /// Creates an orchestrator for the interval `[start, stop]` with a fixed step.
    pub fn new(start: SimTime, stop: SimTime, step: SimTime) -> Self {
        Self {
            handles: Vec::new(),
            dependencies: Vec::new(),
            continuous_links: Vec::new(),
            periodic: Vec::new(),
            state_sources: Vec::new(),
            columns: Vec::new(),
            tolerance: None,
            clock: SimulationClock::new(start, stop, step),
            timers: Vec::new(),
            trackers: Vec::new(),
            dispatcher: None,
            stats: RunStats::default(),
            phase: Phase::Setup,
        }
    }

    /// Sets the tolerance passed to `enter_initialization`.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Builds an orchestrator from a configuration.
    pub fn from_config(config: &SimConfig, registry: &ModelRegistry) -> Result<Self> {
        config.build(registry)
    }

    fn ensure_phase(&self, operation: &'static str, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidPhase {
                operation,
                phase: self.phase.as_str(),
            })
        }
    }

    /// Takes ownership of a subsystem and returns its identifier.
    pub fn add_subsystem(
        &mut self,
        name: impl Into<String>,
        subsystem: Box<dyn Subsystem>,
    ) -> Result<SubsystemId> {
        self.ensure_phase("add_subsystem", Phase::Setup)?;
        let id = SubsystemId(self.handles.len());
        self.handles.push(SubsystemHandle::new(name, subsystem));
        Ok(id)
    }

    /// Declares that `to` consumes a clocked output of `from`.
    pub fn add_dependency(&mut self, from: SubsystemId, to: SubsystemId) -> Result<()> {
        self.ensure_phase("add_dependency", Phase::Setup)?;
        self.dependencies.push(Dependency::new(from, to));
        Ok(())
    }

    /// Adds a value exchanged after every step.
    pub fn add_continuous_link(&mut self, link: ValueLink) -> Result<()> {
        self.ensure_phase("add_continuous_link", Phase::Setup)?;
        self.continuous_links.push(link);
        Ok(())
    }

    /// Adds a periodic input clock.
    pub fn add_periodic_clock(&mut self, clock: PeriodicClock) -> Result<()> {
        self.ensure_phase("add_periodic_clock", Phase::Setup)?;
        self.periodic.push(clock);
        Ok(())
    }

    /// Adds an output clock raised by a state event.
    pub fn add_state_event(&mut self, source: StateEventSource) -> Result<()> {
        self.ensure_phase("add_state_event", Phase::Setup)?;
        self.state_sources.push(source);
        Ok(())
    }

    /// Records `var` under `label` at every instant.
    pub fn add_column(&mut self, label: impl Into<String>, var: VarRef) -> Result<()> {
        self.ensure_phase("add_column", Phase::Setup)?;
        self.columns.push(Column::new(label, var));
        Ok(())
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current simulated time.
    pub fn time(&self) -> SimTime {
        self.clock.time()
    }

    /// Index of the current instant.
    pub fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Returns true once the last instant was reached.
    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    /// Number of owned subsystems.
    pub fn subsystem_count(&self) -> usize {
        self.handles.len()
    }

    /// Looks up a subsystem by name.
    pub fn subsystem_id(&self, name: &str) -> Option<SubsystemId> {
        self.handles
            .iter()
            .position(|h| h.name() == name)
            .map(SubsystemId)
    }

    /// Returns a subsystem handle. Handles are gone once released.
    pub fn handle(&self, id: SubsystemId) -> Option<&SubsystemHandle> {
        self.handles.get(id.index())
    }

    /// Statistics collected so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Column labels in recording order.
    pub fn column_labels(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.label.clone()).collect()
    }

    fn validate(&self) -> Result<()> {
        let (start, stop, step) = (self.clock.start(), self.clock.stop(), self.clock.step());
        if !(step > 0.0 && step.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "fixed step must be positive, got {step}"
            ))
            .into());
        }
        if !(start.is_finite() && stop.is_finite()) || stop < start {
            return Err(ConfigError::Validation(format!(
                "invalid time interval [{start}, {stop}]"
            ))
            .into());
        }
        if self.handles.is_empty() {
            return Err(ConfigError::Validation("no subsystems".to_string()).into());
        }

        let mut names = HashSet::new();
        for handle in &self.handles {
            if !names.insert(handle.name()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate subsystem name '{}'",
                    handle.name()
                ))
                .into());
            }
        }

        let count = self.handles.len();
        for dep in &self.dependencies {
            for id in [dep.from, dep.to] {
                if id.index() >= count {
                    return Err(ConfigError::Validation(format!(
                        "dependency names unknown subsystem {id}"
                    ))
                    .into());
                }
            }
        }

        for link in &self.continuous_links {
            check_link(&self.handles, link, "continuous_link")?;
        }
        for periodic in &self.periodic {
            check_declared(&self.handles, &periodic.clock, VariableKind::Clock, "periodic_clock")?;
            for id in &periodic.participants {
                if id.index() >= count {
                    return Err(ConfigError::Validation(format!(
                        "periodic clock participant {id} does not exist"
                    ))
                    .into());
                }
            }
            for link in &periodic.outputs {
                check_link(&self.handles, link, "periodic_clock")?;
            }
        }
        for source in &self.state_sources {
            check_declared(
                &self.handles,
                &source.output_clock,
                VariableKind::Clock,
                "state_event",
            )?;
            for target in &source.clock_links {
                check_declared(&self.handles, target, VariableKind::Clock, "state_event")?;
            }
            for link in &source.outputs {
                check_link(&self.handles, link, "state_event")?;
            }
        }
        for column in &self.columns {
            check_declared(&self.handles, &column.var, VariableKind::Continuous, "column")?;
        }
        Ok(())
    }

    fn dependency_order(&self) -> Result<DependencyOrder> {
        DependencyOrder::compute(self.handles.len(), &self.dependencies).map_err(|cyclic| {
            let names: Vec<&str> = cyclic
                .iter()
                .map(|id| self.handles[id.index()].name())
                .collect();
            ConfigError::Validation(format!("dependency cycle between {}", names.join(", "))).into()
        })
    }

    /// Runs the initialization phase and records the first sample.
    pub fn initialize(&mut self, recorder: &mut dyn Recorder) -> Result<()> {
        self.ensure_phase("initialize", Phase::Setup)?;
        let result = self.initialize_inner(recorder);
        self.phase = if result.is_ok() {
            Phase::Stepping
        } else {
            Phase::Failed
        };
        result
    }

    fn initialize_inner(&mut self, recorder: &mut dyn Recorder) -> Result<()> {
        self.validate()?;
        let order = self.dependency_order()?;

        self.clock.reset();
        self.stats = RunStats::default();
        info!(
            subsystems = self.handles.len(),
            start = self.clock.start(),
            stop = self.clock.stop(),
            step = self.clock.step(),
            ticks = self.clock.tick_count(),
            "initializing co-simulation"
        );

        let (start, stop) = (self.clock.start(), self.clock.stop());
        for handle in &mut self.handles {
            handle.enter_initialization(self.tolerance, start, stop)?;
        }

        // Clocked outputs first so their initial values are consistent,
        // then the continuous couplings.
        let clocked = self
            .state_sources
            .iter()
            .flat_map(|s| s.outputs.iter())
            .chain(self.periodic.iter().flat_map(|p| p.outputs.iter()));
        for link in clocked.chain(self.continuous_links.iter()) {
            let value = link.transfer(&mut self.handles)?;
            trace!(from = %link.from.name, to = %link.to.name, value, "initial exchange");
        }

        self.timers = Vec::with_capacity(self.periodic.len());
        for periodic in &self.periodic {
            let owner = &mut self.handles[periodic.owner().index()];
            let interval = owner.get_interval(&periodic.clock.name)?;
            debug!(
                subsystem = owner.name(),
                clock = %periodic.clock.name,
                interval,
                "periodic clock"
            );
            self.timers.push(PeriodicTimer::new(interval));
        }

        self.trackers = Vec::with_capacity(self.state_sources.len());
        for source in &self.state_sources {
            let owner = &mut self.handles[source.owner().index()];
            let tracker = match owner.kind() {
                SubsystemKind::CoSimulation => None,
                SubsystemKind::ModelExchange => {
                    if !owner.has_event_indicator() {
                        return Err(OrchestratorError::Validation {
                            subsystem: owner.name().to_string(),
                            operation: "state_event",
                            detail: "state-event source has no event indicator".to_string(),
                        });
                    }
                    let mut tracker = IndicatorTracker::new(source.owner());
                    let seed = tracker.sample(owner)?;
                    tracker.seed(self.clock.tick(), seed);
                    debug!(subsystem = owner.name(), seed, "seeded event indicator");
                    Some(tracker)
                }
            };
            self.trackers.push(tracker);
        }

        for handle in &mut self.handles {
            handle.exit_initialization()?;
        }
        for handle in &mut self.handles {
            handle.enter_free_mode()?;
        }

        self.dispatcher = Some(EventDispatcher::new(
            order,
            self.periodic.clone(),
            self.state_sources.clone(),
        ));

        recorder.begin(&self.column_labels());
        self.record(recorder)?;
        self.stats.ticks = 1;
        Ok(())
    }

    /// Advances the run by one fixed step.
    pub fn step(&mut self, recorder: &mut dyn Recorder) -> Result<TickReport> {
        self.ensure_phase("step", Phase::Stepping)?;
        if self.clock.is_finished() {
            return Err(OrchestratorError::InvalidPhase {
                operation: "step",
                phase: "past the stop time",
            });
        }
        let result = self.step_inner(recorder);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    fn step_inner(&mut self, recorder: &mut dyn Recorder) -> Result<TickReport> {
        let time = self.clock.time();
        let step = self.clock.step();

        // 1. Advance every subsystem.
        let mut flagged = vec![false; self.state_sources.len()];
        for (index, handle) in self.handles.iter_mut().enumerate() {
            if !handle.advance(time, step)? {
                continue;
            }
            let owner = SubsystemId(index);
            let mut claimed = false;
            for (i, source) in self.state_sources.iter().enumerate() {
                if source.owner() == owner && self.trackers[i].is_none() {
                    flagged[i] = true;
                    claimed = true;
                }
            }
            if !claimed {
                warn!(
                    subsystem = handle.name(),
                    time,
                    "ignoring state event flag of a subsystem that is not a state-event source"
                );
            }
        }

        // 2. Advance time and the periodic countdowns.
        let now = self.clock.advance();
        let tick = self.clock.tick();
        for timer in &mut self.timers {
            timer.tick(step);
        }

        // 3. Detect state and time events.
        let mut fired = FiredEvents::default();
        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            let crossed = match tracker {
                Some(tracker) => {
                    let owner = &mut self.handles[tracker.owner().index()];
                    tracker.detect(owner, tick)?
                }
                None => flagged[i],
            };
            if crossed {
                fired.state_events.push(i);
            }
        }
        for (i, timer) in self.timers.iter().enumerate() {
            if timer.has_fired() {
                fired.time_events.push(i);
            }
        }

        // 4. Continuous exchange, every tick.
        for link in &self.continuous_links {
            link.transfer(&mut self.handles)?;
        }

        // 5. Record.
        self.record(recorder)?;
        self.stats.ticks += 1;
        self.stats.final_time = now;

        // 6. Event handling.
        let dispatch = match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.dispatch(&mut self.handles, &mut self.timers, &fired, now)?
            }
            None => None,
        };
        if let Some(report) = &dispatch {
            match report.branch {
                DispatchBranch::TimeOnly => self.stats.time_events += 1,
                DispatchBranch::StateOnly => self.stats.state_events += 1,
                DispatchBranch::Simultaneous => self.stats.simultaneous_events += 1,
            }
            self.stats.discrete_updates += report.updates.len() as u64;
        }

        trace!(
            tick,
            time = now,
            time_event = fired.has_time_event(),
            state_event = fired.has_state_event(),
            "tick"
        );
        Ok(TickReport {
            tick,
            time: now,
            fired,
            dispatch,
        })
    }

    fn record(&mut self, recorder: &mut dyn Recorder) -> Result<()> {
        let values = self
            .columns
            .iter()
            .map(|column| self.handles[column.var.subsystem.index()].get_value(&column.var.name))
            .collect::<Result<Vec<f64>>>()?;
        recorder.record(&Sample {
            time: self.clock.time(),
            values,
        });
        Ok(())
    }

    /// Resets, terminates and releases every subsystem.
    ///
    /// Poisoned subsystems are released without further calls. Teardown
    /// keeps going after a failure and returns the first error.
    pub fn finalize(&mut self) -> Result<()> {
        if self.phase == Phase::Released {
            return Err(OrchestratorError::InvalidPhase {
                operation: "finalize",
                phase: self.phase.as_str(),
            });
        }

        self.stats.final_time = self.clock.time();
        for handle in &self.handles {
            self.stats
                .event_mode_entries
                .insert(handle.name().to_string(), handle.event_mode_entries());
        }

        let mut first_error = None;
        for handle in &mut self.handles {
            if handle.is_poisoned() {
                warn!(subsystem = handle.name(), "releasing poisoned subsystem without reset");
                continue;
            }
            if let Err(e) = handle.reset() {
                error!(subsystem = handle.name(), error = %e, "reset failed during teardown");
                first_error.get_or_insert(e);
            }
            if let Err(e) = handle.terminate() {
                error!(subsystem = handle.name(), error = %e, "terminate failed during teardown");
                first_error.get_or_insert(e);
            }
        }

        let released = std::mem::take(&mut self.handles);
        debug!(count = released.len(), "released subsystems");
        drop(released);
        self.dispatcher = None;
        self.phase = Phase::Released;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Runs initialization, every tick up to the stop time and teardown.
    ///
    /// Teardown runs even if initialization or stepping failed; the first
    /// error is returned in that case.
    pub fn run(&mut self, recorder: &mut dyn Recorder) -> Result<RunStats> {
        let timer = Timer::start();
        let outcome = self.run_steps(recorder);
        let teardown = self.finalize();
        self.stats.wall_time_ms = timer.elapsed_ms();

        match (outcome, teardown) {
            (Err(e), _) | (Ok(()), Err(e)) => {
                error!(error = %e, time = self.stats.final_time, "co-simulation failed");
                Err(e)
            }
            (Ok(()), Ok(())) => {
                info!(
                    ticks = self.stats.ticks,
                    final_time = self.stats.final_time,
                    events = self.stats.dispatched(),
                    "co-simulation finished"
                );
                Ok(self.stats.clone())
            }
        }
    }

    fn run_steps(&mut self, recorder: &mut dyn Recorder) -> Result<()> {
        if self.phase == Phase::Setup {
            self.initialize(recorder)?;
        }
        while !self.clock.is_finished() {
            self.step(recorder)?;
        }
        Ok(())
    }

    /// Exports the current state and statistics.
    pub fn export_stats(&self) -> serde_json::Value {
        let subsystems: Vec<serde_json::Value> = self
            .handles
            .iter()
            .map(|h| {
                serde_json::json!({
                    "name": h.name(),
                    "kind": h.kind(),
                    "mode": h.mode().to_string(),
                    "event_mode_entries": h.event_mode_entries(),
                })
            })
            .collect();

        serde_json::json!({
            "orchestrator": {
                "phase": self.phase.as_str(),
                "time": self.clock.time(),
                "tick": self.clock.tick(),
                "step": self.clock.step(),
                "tick_count": self.clock.tick_count(),
                "ticks": self.stats.ticks,
                "time_events": self.stats.time_events,
                "state_events": self.stats.state_events,
                "simultaneous_events": self.stats.simultaneous_events,
                "discrete_updates": self.stats.discrete_updates,
            },
            "subsystems": subsystems,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("time", &self.clock.time())
            .field("subsystems", &self.handles)
            .finish()
    }
}

/// Builds and runs the configured co-simulation.
///
/// Returns the process exit code: 0 on success, 1 on any error.
pub fn run_simulation(
    config: &SimConfig,
    registry: &ModelRegistry,
    recorder: &mut dyn Recorder,
) -> i32 {
    let result = config
        .build(registry)
        .and_then(|mut orchestrator| orchestrator.run(recorder));
    match result {
        Ok(stats) => {
            debug!("{}", stats.summary());
            0
        }
        Err(e) => {
            error!(error = %e, "simulation aborted");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Controller, Plant};
    use crate::record::{NullRecorder, Trajectory};

    fn controlled_plant(stop: SimTime) -> (Orchestrator, SubsystemId, SubsystemId) {
        let mut orchestrator = Orchestrator::new(0.0, stop, 0.01);
        let controller = orchestrator
            .add_subsystem("controller", Box::new(Controller::new()))
            .unwrap();
        let plant = orchestrator.add_subsystem("plant", Box::new(Plant::new())).unwrap();
        orchestrator.add_dependency(controller, plant).unwrap();
        orchestrator
            .add_periodic_clock(PeriodicClock::new(VarRef::new(controller, "r")).with_output(
                ValueLink::new(VarRef::new(controller, "ur"), VarRef::new(plant, "u")),
            ))
            .unwrap();
        orchestrator
            .add_continuous_link(ValueLink::new(
                VarRef::new(plant, "x"),
                VarRef::new(controller, "xr"),
            ))
            .unwrap();
        (orchestrator, controller, plant)
    }

    #[test]
    fn test_step_before_initialize() {
        let (mut orchestrator, _, _) = controlled_plant(1.0);
        let err = orchestrator.step(&mut NullRecorder).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidPhase { .. }));
    }

    #[test]
    fn test_setup_closed_after_initialize() {
        let (mut orchestrator, _, _) = controlled_plant(1.0);
        orchestrator.initialize(&mut NullRecorder).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Stepping);
        assert!(orchestrator
            .add_subsystem("late", Box::new(Plant::new()))
            .is_err());
    }

    #[test]
    fn test_initial_exchange_and_sample() {
        let (mut orchestrator, _, plant) = controlled_plant(1.0);
        orchestrator.add_column("u", VarRef::new(plant, "u")).unwrap();
        let mut trajectory = Trajectory::new();
        orchestrator.initialize(&mut trajectory).unwrap();

        assert_eq!(trajectory.times(), vec![0.0]);
        assert_eq!(trajectory.column("u"), Some(vec![0.0]));
        assert_eq!(orchestrator.tick(), 0);
    }

    #[test]
    fn test_first_time_event_at_tenth_tick() {
        let (mut orchestrator, _, _) = controlled_plant(1.0);
        orchestrator.initialize(&mut NullRecorder).unwrap();
        for tick in 1..=10u64 {
            let report = orchestrator.step(&mut NullRecorder).unwrap();
            assert_eq!(report.tick, tick);
            assert_eq!(report.fired.has_time_event(), tick == 10, "tick {tick}");
        }
    }

    #[test]
    fn test_step_past_stop_is_rejected() {
        let (mut orchestrator, _, _) = controlled_plant(0.02);
        orchestrator.initialize(&mut NullRecorder).unwrap();
        orchestrator.step(&mut NullRecorder).unwrap();
        orchestrator.step(&mut NullRecorder).unwrap();
        assert!(orchestrator.is_finished());
        assert!(orchestrator.step(&mut NullRecorder).is_err());
    }

    #[test]
    fn test_dependency_cycle_is_config_error() {
        let (mut orchestrator, controller, plant) = controlled_plant(1.0);
        orchestrator.add_dependency(plant, controller).unwrap();
        let err = orchestrator.initialize(&mut NullRecorder).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
        assert!(err.to_string().contains("cycle"));
        assert_eq!(orchestrator.phase(), Phase::Failed);
    }

    #[test]
    fn test_undeclared_column_is_rejected() {
        let (mut orchestrator, _, plant) = controlled_plant(1.0);
        orchestrator.add_column("y", VarRef::new(plant, "y")).unwrap();
        let err = orchestrator.initialize(&mut NullRecorder).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation { .. }));
    }

    #[test]
    fn test_invalid_step_is_rejected() {
        let mut orchestrator = Orchestrator::new(0.0, 1.0, 0.0);
        orchestrator.add_subsystem("plant", Box::new(Plant::new())).unwrap();
        assert!(orchestrator.initialize(&mut NullRecorder).is_err());
    }

    #[test]
    fn test_finalize_releases_handles() {
        let (mut orchestrator, controller, _) = controlled_plant(0.1);
        let stats = orchestrator.run(&mut NullRecorder).unwrap();
        assert_eq!(stats.ticks, 11);
        assert_eq!(stats.event_mode_entries["controller"], 1);
        assert_eq!(orchestrator.phase(), Phase::Released);
        assert!(orchestrator.handle(controller).is_none());
        assert!(orchestrator.finalize().is_err());
    }

    #[test]
    fn test_export_stats() {
        let (mut orchestrator, _, _) = controlled_plant(1.0);
        orchestrator.initialize(&mut NullRecorder).unwrap();
        orchestrator.step(&mut NullRecorder).unwrap();

        let json = orchestrator.export_stats();
        assert_eq!(json["orchestrator"]["tick"], 1);
        assert_eq!(json["orchestrator"]["tick_count"], 101);
        assert_eq!(json["subsystems"][1]["name"], "plant");
    }
}
