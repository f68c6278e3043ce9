//! Scripted subsystem for testing.
//!
//! [`ScriptedSubsystem`] holds plain named values and clocks, replays a
//! scripted event-indicator sequence and writes every capability call into
//! a shared [`CallJournal`], so tests can assert the exact order in which
//! the orchestrator talks to its subsystems.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::subsystem::{
    CallResult, Causality, DiscreteUpdate, Fault, Reply, StepOutcome, Subsystem, SubsystemKind,
    ValueResult, VariableDesc,
};
use crate::types::SimTime;

use super::{read_each, write_each};

/// Ordered log of calls shared between several scripted subsystems.
///
/// Entries look like `"name.operation"` or `"name.operation:variable"`.
#[derive(Clone, Debug, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries that end with `suffix`, e.g. `".enter_event_mode"`.
    pub fn matching(&self, suffix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Number of entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    /// Forgets all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct ScriptState {
    values: BTreeMap<String, f64>,
    clocks: BTreeMap<String, bool>,
    indicator_cursor: usize,
    steps: u64,
    advances: usize,
}

/// A subsystem driven entirely by its script.
#[derive(Debug)]
pub struct ScriptedSubsystem {
    name: String,
    kind: SubsystemKind,
    journal: CallJournal,
    variables: Vec<VariableDesc>,
    initial: ScriptState,
    state: ScriptState,
    intervals: BTreeMap<String, f64>,
    indicator: Option<Vec<f64>>,
    series: BTreeMap<String, Vec<f64>>,
    latched_clocks: Vec<String>,
    state_event_steps: Vec<u64>,
    terminate_on_update: bool,
    faults: BTreeMap<&'static str, Fault>,
    in_event_mode: bool,
}

impl ScriptedSubsystem {
    /// Creates a subsystem with no variables.
    pub fn new(name: impl Into<String>, kind: SubsystemKind, journal: CallJournal) -> Self {
        Self {
            name: name.into(),
            kind,
            journal,
            variables: Vec::new(),
            initial: ScriptState::default(),
            state: ScriptState::default(),
            intervals: BTreeMap::new(),
            indicator: None,
            series: BTreeMap::new(),
            latched_clocks: Vec::new(),
            state_event_steps: Vec::new(),
            terminate_on_update: false,
            faults: BTreeMap::new(),
            in_event_mode: false,
        }
    }

    /// Declares a continuous variable with an initial value.
    pub fn with_value(mut self, name: &str, causality: Causality, initial: f64) -> Self {
        self.variables.push(VariableDesc::continuous(name, causality));
        self.initial.values.insert(name.to_string(), initial);
        self.state.values.insert(name.to_string(), initial);
        self
    }

    /// Declares an output that takes `values[k]` after the k-th advance of
    /// time. The last value repeats once the series is exhausted.
    pub fn with_series(mut self, name: &str, values: Vec<f64>) -> Self {
        let initial = values.first().copied().unwrap_or_default();
        self.series.insert(name.to_string(), values);
        self.with_value(name, Causality::Output, initial)
    }

    /// Declares an input clock.
    pub fn with_input_clock(self, name: &str) -> Self {
        self.with_clock(name, Causality::Input)
    }

    /// Declares an input clock with a periodic interval.
    pub fn with_periodic_clock(mut self, name: &str, interval: f64) -> Self {
        self.intervals.insert(name.to_string(), interval);
        self.with_clock(name, Causality::Input)
    }

    /// Declares an output clock that stays inactive unless latched.
    pub fn with_output_clock(self, name: &str) -> Self {
        self.with_clock(name, Causality::Output)
    }

    /// Declares an output clock activated by every event-mode entry.
    pub fn with_latched_clock(mut self, name: &str) -> Self {
        self.latched_clocks.push(name.to_string());
        self.with_clock(name, Causality::Output)
    }

    /// Replays `values` from the event indicator, one per call. The last
    /// value repeats once the script is exhausted.
    pub fn with_indicator(mut self, values: Vec<f64>) -> Self {
        self.indicator = Some(values);
        self
    }

    /// Reports a state event from `step` on the given (1-based) step numbers.
    pub fn with_state_event_at_steps(mut self, steps: Vec<u64>) -> Self {
        self.state_event_steps = steps;
        self
    }

    /// Requests termination from every discrete update.
    pub fn terminating(mut self) -> Self {
        self.terminate_on_update = true;
        self
    }

    /// Makes `operation` fail with `fault` every time it is called. A
    /// warning on an operation that returns a value comes back alongside
    /// the value.
    pub fn failing(mut self, operation: &'static str, fault: Fault) -> Self {
        self.faults.insert(operation, fault);
        self
    }

    /// Current value of a variable, bypassing the journal.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.state.values.get(name).copied()
    }

    fn with_clock(mut self, name: &str, causality: Causality) -> Self {
        self.variables.push(VariableDesc::clock(name, causality));
        self.initial.clocks.insert(name.to_string(), false);
        self.state.clocks.insert(name.to_string(), false);
        self
    }

    fn log(&self, operation: &str) {
        self.journal.record(format!("{}.{}", self.name, operation));
    }

    fn log_each(&self, operation: &str, names: &[&str]) {
        for name in names {
            self.journal
                .record(format!("{}.{}:{}", self.name, operation, name));
        }
    }

    fn advance_series(&mut self) {
        self.state.advances += 1;
        for (name, values) in &self.series {
            let index = self.state.advances.min(values.len().saturating_sub(1));
            if let Some(&value) = values.get(index) {
                self.state.values.insert(name.clone(), value);
            }
        }
    }

    fn ensure_event_mode(&self) -> CallResult<()> {
        if self.in_event_mode {
            Ok(())
        } else {
            Err(Fault::error("Clocks are only accessible in event mode"))
        }
    }

    fn scripted(&self, operation: &'static str) -> CallResult<()> {
        match self.faults.get(operation) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    /// Scripted warning to attach to the reply of `operation`; any other
    /// scripted fault fails the call.
    fn scripted_warning(&self, operation: &'static str) -> CallResult<Option<Fault>> {
        match self.faults.get(operation) {
            Some(fault) if fault.status.is_continuable() => Ok(Some(fault.clone())),
            Some(fault) => Err(fault.clone()),
            None => Ok(None),
        }
    }
}

fn reply<T>(value: T, warning: Option<Fault>) -> ValueResult<T> {
    Ok(Reply { value, warning })
}

impl Subsystem for ScriptedSubsystem {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    fn variables(&self) -> Vec<VariableDesc> {
        self.variables.clone()
    }

    fn get_continuous(&mut self, names: &[&str]) -> ValueResult<Vec<f64>> {
        self.log_each("get", names);
        let warning = self.scripted_warning("get_continuous")?;
        let values = &self.state.values;
        let read = read_each(names, |name| values.get(name).copied())?;
        reply(read.value, warning)
    }

    fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> CallResult<()> {
        self.log_each("set", names);
        self.scripted("set_continuous")?;
        let stored = &mut self.state.values;
        write_each(names, values, |name, value| match stored.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })
    }

    fn get_clock(&mut self, names: &[&str]) -> ValueResult<Vec<bool>> {
        self.log_each("get_clock", names);
        let warning = self.scripted_warning("get_clock")?;
        self.ensure_event_mode()?;
        let clocks = names
            .iter()
            .map(|&name| match self.state.clocks.get_mut(name) {
                Some(active) => Ok(std::mem::take(active)),
                None => Err(Fault::unknown_variable(name)),
            })
            .collect::<CallResult<Vec<bool>>>()?;
        reply(clocks, warning)
    }

    fn set_clock(&mut self, names: &[&str], values: &[bool]) -> CallResult<()> {
        self.log_each("set_clock", names);
        self.scripted("set_clock")?;
        self.ensure_event_mode()?;
        let clocks = &mut self.state.clocks;
        write_each(names, values, |name, value| match clocks.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })
    }

    fn get_interval(&mut self, clock: &str) -> ValueResult<f64> {
        self.log_each("get_interval", &[clock]);
        let warning = self.scripted_warning("get_interval")?;
        let interval = self
            .intervals
            .get(clock)
            .copied()
            .ok_or_else(|| Fault::error(format!("Clock {clock} has no interval")))?;
        reply(interval, warning)
    }

    fn has_event_indicator(&self) -> bool {
        self.indicator.is_some()
    }

    fn event_indicator(&mut self) -> ValueResult<f64> {
        self.log("event_indicator");
        let warning = self.scripted_warning("event_indicator")?;
        let Some(script) = &self.indicator else {
            return Err(Fault::error("Subsystem has no event indicator"));
        };
        let index = self.state.indicator_cursor.min(script.len().saturating_sub(1));
        let value = script
            .get(index)
            .copied()
            .ok_or_else(|| Fault::error("Empty indicator script"))?;
        self.state.indicator_cursor += 1;
        reply(value, warning)
    }

    fn set_time(&mut self, _time: SimTime) -> CallResult<()> {
        self.advance_series();
        Ok(())
    }

    fn enter_initialization(
        &mut self,
        _tolerance: Option<f64>,
        _start: SimTime,
        _stop: SimTime,
    ) -> CallResult<()> {
        self.log("enter_initialization");
        self.scripted("enter_initialization")
    }

    fn exit_initialization(&mut self) -> CallResult<()> {
        self.log("exit_initialization");
        self.scripted("exit_initialization")?;
        self.in_event_mode = true;
        Ok(())
    }

    fn enter_event_mode(&mut self) -> CallResult<()> {
        self.log("enter_event_mode");
        self.scripted("enter_event_mode")?;
        self.in_event_mode = true;
        for clock in &self.latched_clocks {
            self.state.clocks.insert(clock.clone(), true);
        }
        Ok(())
    }

    fn enter_step_mode(&mut self) -> CallResult<()> {
        self.log("enter_step_mode");
        self.scripted("enter_step_mode")?;
        self.in_event_mode = false;
        Ok(())
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<()> {
        self.log("enter_continuous_time_mode");
        self.scripted("enter_continuous_time_mode")?;
        self.in_event_mode = false;
        Ok(())
    }

    fn update_discrete_states(&mut self) -> ValueResult<DiscreteUpdate> {
        self.log("update");
        let warning = self.scripted_warning("update_discrete_states")?;
        for active in self.state.clocks.values_mut() {
            *active = false;
        }
        let update = DiscreteUpdate {
            terminate: self.terminate_on_update,
            ..DiscreteUpdate::default()
        };
        reply(update, warning)
    }

    fn step(&mut self, time: SimTime, step: SimTime) -> ValueResult<StepOutcome> {
        self.log("step");
        let warning = self.scripted_warning("step")?;
        self.state.steps += 1;
        self.advance_series();
        let outcome = StepOutcome {
            state_event: self.state_event_steps.contains(&self.state.steps),
            last_successful_time: time + step,
            ..StepOutcome::default()
        };
        reply(outcome, warning)
    }

    fn reset(&mut self) -> CallResult<()> {
        self.log("reset");
        self.scripted("reset")?;
        self.state = self.initial.clone();
        self.in_event_mode = false;
        Ok(())
    }

    fn terminate(&mut self) -> CallResult<()> {
        self.log("terminate");
        self.scripted("terminate")
    }
}
