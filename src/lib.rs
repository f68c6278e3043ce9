//! # Cosync Co-Simulation Orchestrator
//!
//! A fixed-step orchestrator for hybrid co-simulation: continuous
//! subsystems advanced on a shared time grid, coupled with discrete,
//! clock-driven subsystems that react to periodic time events and to
//! zero-crossing state events.
//!
//! ## Design Principles
//!
//! - **Uniform subsystems**: every model implements [`Subsystem`] and is
//!   owned by the orchestrator through a mode-checked [`SubsystemHandle`].
//! - **Two subsystem kinds**: co-simulation subsystems step themselves;
//!   model-exchange subsystems are integrated by the orchestrator with
//!   explicit Euler.
//! - **Dependency-ordered events**: when a time event, a state event or both
//!   fire on the same instant, the [`EventDispatcher`] handles them in the
//!   topological order of the declared dependencies, state events first.
//! - **Configuration-driven**: a [`SimConfig`] plus a [`ModelRegistry`]
//!   fully describe a run.
//!
//! ## Quick Start
//!
//! ```rust
//! use cosync::{create_default_registry, run_simulation, SimConfig, SubsystemKind, Trajectory};
//!
//! let config = SimConfig::supervisory_control(SubsystemKind::ModelExchange);
//! let registry = create_default_registry();
//!
//! let mut trajectory = Trajectory::new();
//! let code = run_simulation(&config, &registry, &mut trajectory);
//! assert_eq!(code, 0);
//! assert_eq!(trajectory.len(), 1001);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use cosync::config::SimConfig;
//!
//! let config = SimConfig::from_yaml_file("supervisory_control.yaml")?;
//! let mut orchestrator = config.build(&cosync::create_default_registry())?;
//! ```

pub mod types;
pub mod mode;
pub mod subsystem;
pub mod error;
pub mod handle;
pub mod indicator;
pub mod timer;
pub mod topology;
pub mod coupling;
pub mod dispatcher;
pub mod coordinator;
pub mod record;
pub mod stats;
pub mod config;
pub mod registry;
pub mod models;

// Re-export commonly used types
pub use types::{SimTime, SubsystemId, VarRef};
pub use mode::Mode;
pub use subsystem::{
    CallResult, Causality, DiscreteUpdate, Fault, Reply, Status, StepOutcome, Subsystem,
    SubsystemKind, ValueResult, VariableDesc, VariableKind,
};
pub use error::{OrchestratorError, Result};
pub use handle::SubsystemHandle;
pub use indicator::IndicatorTracker;
pub use timer::{PeriodicTimer, SimulationClock};
pub use topology::{Dependency, DependencyOrder};
pub use coupling::{PeriodicClock, Column, StateEventSource, ValueLink};
pub use dispatcher::{DispatchBranch, DispatchReport, EventDispatcher, FiredEvents};
pub use coordinator::{run_simulation, Orchestrator, Phase, TickReport};
pub use record::{NullRecorder, Recorder, Sample, Trajectory};
pub use stats::{RunStats, Timer};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use registry::{create_default_registry, ModelRegistry};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// cosync::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
