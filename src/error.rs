//! Error taxonomy of the orchestrator.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mode::Mode;
use crate::subsystem::Status;

/// Errors raised while orchestrating a run.
///
/// Every variant that originates in a subsystem call names the subsystem and
/// the failing operation.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A call returned an unexpected number of values or referenced an
    /// undeclared variable. Aborts the current step.
    #[error("[{subsystem}] {operation}: {detail}")]
    Validation {
        subsystem: String,
        operation: &'static str,
        detail: String,
    },

    /// The event-detection/dispatch invariants were broken.
    #[error("[{subsystem}] protocol violation in {operation}: {detail}")]
    ProtocolViolation {
        subsystem: String,
        operation: &'static str,
        detail: String,
    },

    /// The subsystem reported `Fatal`.
    #[error("[{subsystem}] {operation} reported Fatal: {message}")]
    SubsystemFatal {
        subsystem: String,
        operation: &'static str,
        message: String,
    },

    /// The subsystem reported `Discard` or `Error`.
    #[error("[{subsystem}] {operation} returned {status}: {message}")]
    SubsystemFailed {
        subsystem: String,
        operation: &'static str,
        status: Status,
        message: String,
    },

    /// The subsystem asked for the simulation to end.
    #[error("[{subsystem}] requested termination during {operation}")]
    TerminationRequested {
        subsystem: String,
        operation: &'static str,
    },

    /// A protocol call was made in a mode that does not allow it.
    #[error("[{subsystem}] invalid mode transition {from} -> {to}")]
    InvalidTransition {
        subsystem: String,
        from: Mode,
        to: Mode,
    },

    /// The orchestrator API was used out of order.
    #[error("{operation} is not allowed while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OrchestratorError {
    /// Name of the subsystem the error originated in, if any.
    pub fn subsystem(&self) -> Option<&str> {
        match self {
            OrchestratorError::Validation { subsystem, .. }
            | OrchestratorError::ProtocolViolation { subsystem, .. }
            | OrchestratorError::SubsystemFatal { subsystem, .. }
            | OrchestratorError::SubsystemFailed { subsystem, .. }
            | OrchestratorError::TerminationRequested { subsystem, .. }
            | OrchestratorError::InvalidTransition { subsystem, .. } => Some(subsystem),
            OrchestratorError::InvalidPhase { .. } | OrchestratorError::Config(_) => None,
        }
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
