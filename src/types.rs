//! Core type definitions for the orchestrator.
//!
//! This module defines the fundamental types used throughout the co-simulation core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulated time in seconds.
///
/// All subsystems share one timeline; continuous time only ever advances in
/// multiples of the fixed step.
pub type SimTime = f64;

/// Opaque identifier of a subsystem owned by the orchestrator.
///
/// It is an index into the orchestrator's handle arena and is only meaningful
/// for the orchestrator that handed it out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubsystemId(pub(crate) usize);

impl SubsystemId {
    /// Returns the arena index behind this identifier.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named variable (or clock) on a specific subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarRef {
    /// The owning subsystem
    pub subsystem: SubsystemId,
    /// Variable or clock name as declared by the subsystem
    pub name: String,
}

impl VarRef {
    /// Creates a new variable reference.
    pub fn new(subsystem: SubsystemId, name: impl Into<String>) -> Self {
        Self {
            subsystem,
            name: name.into(),
        }
    }
}
