//! Subsystem lifecycle modes.
//!
//! Every subsystem handle carries a [`Mode`]. Transitions only happen through
//! the protocol calls and are checked against the table in
//! [`Mode::can_transition_to`]:
//!
//! ```text
//! Instantiated -> Initializing -> EventMode <-> StepMode | ContinuousTimeMode
//!                                     \______________________________/
//!                                                    |
//!                                               Terminated
//! ```
//!
//! `reset` returns any mode to `Instantiated`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle mode of a subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Created, not yet initialized
    Instantiated,
    /// Between `enter_initialization` and `exit_initialization`
    Initializing,
    /// Discrete states and clocks may change; continuous time is frozen
    EventMode,
    /// Free stepping of a co-simulation subsystem
    StepMode,
    /// Free integration of a model-exchange subsystem
    ContinuousTimeMode,
    /// Terminated; only `reset` or release are allowed
    Terminated,
}

impl Mode {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Mode) -> bool {
        use Mode::*;

        matches!(
            (self, next),
            (Instantiated, Initializing)
                | (Initializing, EventMode)
                | (EventMode, StepMode)
                | (EventMode, ContinuousTimeMode)
                | (StepMode, EventMode)
                | (ContinuousTimeMode, EventMode)
                | (_, Instantiated)
                | (Instantiated, Terminated)
                | (Initializing, Terminated)
                | (EventMode, Terminated)
                | (StepMode, Terminated)
                | (ContinuousTimeMode, Terminated)
        )
    }

    /// Returns true while continuous time may advance.
    pub fn is_free_running(self) -> bool {
        matches!(self, Mode::StepMode | Mode::ContinuousTimeMode)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Instantiated => "Instantiated",
            Mode::Initializing => "Initializing",
            Mode::EventMode => "EventMode",
            Mode::StepMode => "StepMode",
            Mode::ContinuousTimeMode => "ContinuousTimeMode",
            Mode::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}
