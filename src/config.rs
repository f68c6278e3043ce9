//! Configuration system for co-simulation runs.
//!
//! A run is described declaratively in YAML or JSON: the time axis, the
//! subsystems (created through a [`ModelRegistry`]), their dependency
//! edges and every coupling between them. Variables are referenced as
//! `"subsystem.variable"`.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   start_time: 0.0
//!   stop_time: 10.0
//!   fixed_step: 0.01
//!   log_level: info
//!
//! subsystems:
//!   - name: controller
//!     model: Controller
//!   - name: plant
//!     model: Plant
//!   - name: supervisor
//!     model: Supervisor
//!     attrs:
//!       threshold: "2.0"
//!
//! dependencies:
//!   - { from: supervisor, to: controller }
//!   - { from: controller, to: plant }
//!
//! continuous_links:
//!   - { from: plant.x, to: supervisor.x }
//!
//! periodic_clocks:
//!   - clock: controller.r
//!     outputs:
//!       - { from: controller.ur, to: plant.u }
//!
//! state_events:
//!   - clock: supervisor.s
//!     activates: [controller.s]
//!     outputs:
//!       - { from: supervisor.as, to: controller.as }
//!
//! recorded:
//!   - var: plant.x
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::coordinator::Orchestrator;
use crate::coupling::{PeriodicClock, StateEventSource, ValueLink};
use crate::error::Result;
use crate::registry::ModelRegistry;
use crate::subsystem::SubsystemKind;
use crate::topology::{Dependency, DependencyOrder};
use crate::types::{SimTime, SubsystemId, VarRef};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Unknown model type: {0}")]
    UnknownModel(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Time axis and global settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// First simulated instant
    #[serde(default)]
    pub start_time: SimTime,

    /// Last simulated instant
    #[serde(default = "default_stop_time")]
    pub stop_time: SimTime,

    /// Fixed communication step
    #[serde(default = "default_fixed_step")]
    pub fixed_step: SimTime,

    /// Tolerance passed to the subsystems at initialization
    #[serde(default)]
    pub tolerance: Option<f64>,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_stop_time() -> SimTime {
    10.0
}

fn default_fixed_step() -> SimTime {
    0.01
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: default_stop_time(),
            fixed_step: default_fixed_step(),
            tolerance: None,
            log_level: default_log_level(),
        }
    }
}

/// One subsystem instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    /// Unique instance name
    pub name: String,

    /// Registered model type
    pub model: String,

    /// Model-specific attributes
    #[serde(default)]
    pub attrs: HashMap<String, String>,
}

/// `to` consumes a clocked output of `from`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub from: String,
    pub to: String,
}

/// A value copied from `from` to `to`, both `"subsystem.variable"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
}

impl LinkConfig {
    /// Creates a link configuration.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A periodic input clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodicClockConfig {
    /// The owner's input clock, e.g. `"controller.r"`
    pub clock: String,

    /// Other subsystems entering event mode when the clock ticks
    #[serde(default)]
    pub participants: Vec<String>,

    /// Clocked outputs exchanged when the clock ticks
    #[serde(default)]
    pub outputs: Vec<LinkConfig>,
}

/// An output clock raised by a state event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEventConfig {
    /// The owner's output clock, e.g. `"supervisor.s"`
    pub clock: String,

    /// Input clocks activated by the output clock
    #[serde(default)]
    pub activates: Vec<String>,

    /// Clocked outputs propagated when the clock ticks
    #[serde(default)]
    pub outputs: Vec<LinkConfig>,
}

/// A recorded variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// The variable, e.g. `"plant.x"`
    pub var: String,

    /// Column label; defaults to `var`
    #[serde(default)]
    pub label: Option<String>,
}

impl ColumnConfig {
    /// The column label.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.var)
    }
}

/// Complete co-simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Time axis and global settings
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Subsystem instances, in registration order
    #[serde(default)]
    pub subsystems: Vec<SubsystemConfig>,

    /// Dependency edges
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,

    /// Values exchanged after every step
    #[serde(default)]
    pub continuous_links: Vec<LinkConfig>,

    /// Periodic input clocks
    #[serde(default)]
    pub periodic_clocks: Vec<PeriodicClockConfig>,

    /// State-event output clocks
    #[serde(default)]
    pub state_events: Vec<StateEventConfig>,

    /// Variables recorded at every instant
    #[serde(default)]
    pub recorded: Vec<ColumnConfig>,
}

/// Splits `"subsystem.variable"` at the first dot.
pub fn parse_endpoint(endpoint: &str) -> ConfigResult<(&str, &str)> {
    match endpoint.split_once('.') {
        Some((subsystem, variable)) if !subsystem.is_empty() && !variable.is_empty() => {
            Ok((subsystem, variable))
        }
        _ => Err(ConfigError::Validation(format!(
            "Endpoint '{endpoint}' is not of the form subsystem.variable"
        ))),
    }
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let sim = &self.simulation;
        if !(sim.fixed_step > 0.0 && sim.fixed_step.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "fixed_step must be positive, got {}",
                sim.fixed_step
            )));
        }
        if !(sim.start_time.is_finite() && sim.stop_time.is_finite())
            || sim.stop_time < sim.start_time
        {
            return Err(ConfigError::Validation(format!(
                "stop_time {} is before start_time {}",
                sim.stop_time, sim.start_time
            )));
        }
        if let Some(tolerance) = sim.tolerance {
            if !(tolerance > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "tolerance must be positive, got {tolerance}"
                )));
            }
        }

        if self.subsystems.is_empty() {
            return Err(ConfigError::Validation("No subsystems defined".to_string()));
        }
        let mut names = HashSet::new();
        for sub in &self.subsystems {
            if sub.name.is_empty() || sub.name.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid subsystem name: '{}'",
                    sub.name
                )));
            }
            if !names.insert(sub.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate subsystem name: {}",
                    sub.name
                )));
            }
        }

        let known = |name: &str| -> ConfigResult<()> {
            if names.contains(name) {
                Ok(())
            } else {
                Err(ConfigError::Validation(format!(
                    "Reference to unknown subsystem: {name}"
                )))
            }
        };
        let endpoint = |ep: &str| -> ConfigResult<()> { known(parse_endpoint(ep)?.0) };
        let link = |l: &LinkConfig| -> ConfigResult<()> {
            endpoint(&l.from)?;
            endpoint(&l.to)
        };

        for dep in &self.dependencies {
            known(&dep.from)?;
            known(&dep.to)?;
        }
        for l in &self.continuous_links {
            link(l)?;
        }

        if self.periodic_clocks.len() > 1 {
            return Err(ConfigError::Validation(format!(
                "At most one periodic clock is supported, found {}",
                self.periodic_clocks.len()
            )));
        }
        for periodic in &self.periodic_clocks {
            endpoint(&periodic.clock)?;
            for participant in &periodic.participants {
                known(participant)?;
            }
            for l in &periodic.outputs {
                link(l)?;
            }
        }
        for state in &self.state_events {
            endpoint(&state.clock)?;
            for target in &state.activates {
                endpoint(target)?;
            }
            for l in &state.outputs {
                link(l)?;
            }
        }
        for column in &self.recorded {
            endpoint(&column.var)?;
        }

        let index = self.name_index();
        let edges: Vec<Dependency> = self
            .dependencies
            .iter()
            .map(|d| Dependency::new(index[d.from.as_str()], index[d.to.as_str()]))
            .collect();
        if let Err(cyclic) = DependencyOrder::compute(self.subsystems.len(), &edges) {
            let names: Vec<&str> = cyclic
                .iter()
                .map(|id| self.subsystems[id.index()].name.as_str())
                .collect();
            return Err(ConfigError::Validation(format!(
                "Dependency cycle between: {}",
                names.join(", ")
            )));
        }

        Ok(())
    }

    fn name_index(&self) -> HashMap<&str, SubsystemId> {
        self.subsystems
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), SubsystemId(i)))
            .collect()
    }

    /// Instantiates every subsystem through `registry` and wires the
    /// couplings into a ready-to-run orchestrator.
    pub fn build(&self, registry: &ModelRegistry) -> Result<Orchestrator> {
        self.validate()?;
        let sim = &self.simulation;
        let mut orchestrator = Orchestrator::new(sim.start_time, sim.stop_time, sim.fixed_step);
        if let Some(tolerance) = sim.tolerance {
            orchestrator = orchestrator.with_tolerance(tolerance);
        }

        for sub in &self.subsystems {
            let subsystem = registry
                .create(&sub.model, &sub.attrs)
                .ok_or_else(|| ConfigError::UnknownModel(sub.model.clone()))?;
            orchestrator.add_subsystem(sub.name.clone(), subsystem)?;
        }

        let index = self.name_index();
        let var = |ep: &str| -> ConfigResult<VarRef> {
            let (sub, name) = parse_endpoint(ep)?;
            Ok(VarRef::new(index[sub], name))
        };
        let link = |l: &LinkConfig| -> ConfigResult<ValueLink> {
            Ok(ValueLink::new(var(&l.from)?, var(&l.to)?))
        };

        for dep in &self.dependencies {
            orchestrator.add_dependency(index[dep.from.as_str()], index[dep.to.as_str()])?;
        }
        for l in &self.continuous_links {
            orchestrator.add_continuous_link(link(l)?)?;
        }
        for periodic in &self.periodic_clocks {
            let mut clock = PeriodicClock::new(var(&periodic.clock)?);
            for participant in &periodic.participants {
                clock = clock.with_participant(index[participant.as_str()]);
            }
            for l in &periodic.outputs {
                clock = clock.with_output(link(l)?);
            }
            orchestrator.add_periodic_clock(clock)?;
        }
        for state in &self.state_events {
            let mut source = StateEventSource::new(var(&state.clock)?);
            for target in &state.activates {
                source = source.with_clock_link(var(target)?);
            }
            for l in &state.outputs {
                source = source.with_output(link(l)?);
            }
            orchestrator.add_state_event(source)?;
        }
        for column in &self.recorded {
            orchestrator.add_column(column.label(), var(&column.var)?)?;
        }

        Ok(orchestrator)
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Finds a subsystem configuration by name.
    pub fn find_subsystem(&self, name: &str) -> Option<&SubsystemConfig> {
        self.subsystems.iter().find(|s| s.name == name)
    }

    /// The supervisory-control example: a periodically clocked controller
    /// driving a first-order plant, and a supervisor reversing the
    /// controller's command whenever the plant output crosses 2.0.
    pub fn supervisory_control(kind: SubsystemKind) -> Self {
        let kind_attr = match kind {
            SubsystemKind::CoSimulation => "co-simulation",
            SubsystemKind::ModelExchange => "model-exchange",
        };
        let mut builder = SimConfigBuilder::new()
            .start_time(0.0)
            .stop_time(10.0)
            .fixed_step(0.01);
        for (name, model) in [
            ("controller", "Controller"),
            ("plant", "Plant"),
            ("supervisor", "Supervisor"),
        ] {
            builder = builder.add_subsystem_with_attrs(
                name,
                model,
                HashMap::from([("kind".to_string(), kind_attr.to_string())]),
            );
        }
        builder
            .add_dependency("supervisor", "controller")
            .add_dependency("controller", "plant")
            .add_continuous_link("plant.x", "supervisor.x")
            .add_continuous_link("plant.x", "controller.xr")
            .add_periodic_clock(PeriodicClockConfig {
                clock: "controller.r".to_string(),
                participants: Vec::new(),
                outputs: vec![LinkConfig::new("controller.ur", "plant.u")],
            })
            .add_state_event(StateEventConfig {
                clock: "supervisor.s".to_string(),
                activates: vec!["controller.s".to_string()],
                outputs: vec![LinkConfig::new("supervisor.as", "controller.as")],
            })
            .record("plant.x")
            .record("controller.xr")
            .record("controller.ur")
            .record("controller.as")
            .into_config()
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start time.
    pub fn start_time(mut self, time: SimTime) -> Self {
        self.config.simulation.start_time = time;
        self
    }

    /// Sets the stop time.
    pub fn stop_time(mut self, time: SimTime) -> Self {
        self.config.simulation.stop_time = time;
        self
    }

    /// Sets the fixed step.
    pub fn fixed_step(mut self, step: SimTime) -> Self {
        self.config.simulation.fixed_step = step;
        self
    }

    /// Sets the initialization tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.simulation.tolerance = Some(tolerance);
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Adds a subsystem with default attributes.
    pub fn add_subsystem(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.add_subsystem_with_attrs(name, model, HashMap::new())
    }

    /// Adds a subsystem with attributes.
    pub fn add_subsystem_with_attrs(
        mut self,
        name: impl Into<String>,
        model: impl Into<String>,
        attrs: HashMap<String, String>,
    ) -> Self {
        self.config.subsystems.push(SubsystemConfig {
            name: name.into(),
            model: model.into(),
            attrs,
        });
        self
    }

    /// Adds a dependency edge.
    pub fn add_dependency(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.dependencies.push(DependencyConfig {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Adds a continuous link.
    pub fn add_continuous_link(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.continuous_links.push(LinkConfig::new(from, to));
        self
    }

    /// Adds a periodic clock.
    pub fn add_periodic_clock(mut self, clock: PeriodicClockConfig) -> Self {
        self.config.periodic_clocks.push(clock);
        self
    }

    /// Adds a state-event output clock.
    pub fn add_state_event(mut self, state: StateEventConfig) -> Self {
        self.config.state_events.push(state);
        self
    }

    /// Records a variable under its own name.
    pub fn record(mut self, var: impl Into<String>) -> Self {
        self.config.recorded.push(ColumnConfig {
            var: var.into(),
            label: None,
        });
        self
    }

    fn into_config(self) -> SimConfig {
        self.config
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
