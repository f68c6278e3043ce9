//! Built-in subsystem models.
//!
//! # Available Models
//!
//! ## Supervisory control example
//! - [`Plant`] - First-order plant `der(x) = -x + u`
//! - [`Controller`] - Periodically clocked integrating controller
//! - [`Supervisor`] - Threshold supervisor raising a state event
//!
//! ## Testing
//! - [`ScriptedSubsystem`] - Scripted subsystem recording every call in a [`CallJournal`]

pub mod controller;
pub mod mock;
pub mod plant;
pub mod supervisor;

pub use controller::Controller;
pub use mock::{CallJournal, ScriptedSubsystem};
pub use plant::Plant;
pub use supervisor::Supervisor;

use crate::subsystem::{CallResult, Fault, Reply, ValueResult};

/// Maps each name through `read`, stopping at the first unknown name.
pub(crate) fn read_each<F>(names: &[&str], mut read: F) -> ValueResult<Vec<f64>>
where
    F: FnMut(&str) -> Option<f64>,
{
    names
        .iter()
        .map(|&name| read(name).ok_or_else(|| Fault::unknown_variable(name)))
        .collect::<CallResult<Vec<f64>>>()
        .map(Reply::ok)
}

/// Applies each (name, value) pair through `write`, stopping at the first
/// name `write` rejects.
pub(crate) fn write_each<T: Copy, F>(names: &[&str], values: &[T], mut write: F) -> CallResult<()>
where
    F: FnMut(&str, T) -> bool,
{
    if names.len() != values.len() {
        return Err(Fault::error(format!(
            "Expected {} values but got {}",
            names.len(),
            values.len()
        )));
    }
    for (&name, &value) in names.iter().zip(values) {
        if !write(name, value) {
            return Err(Fault::unknown_variable(name));
        }
    }
    Ok(())
}
