//! Run statistics and export.
//!
//! [`RunStats`] is filled in by the orchestrator while it steps and can be
//! exported as JSON or rendered as a human-readable summary.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Counters collected over one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Instants visited, including the initial one
    pub ticks: u64,
    /// Ticks dispatched because only a periodic clock fired
    pub time_events: u64,
    /// Ticks dispatched because only a state event was detected
    pub state_events: u64,
    /// Ticks on which both fired
    pub simultaneous_events: u64,
    /// Event-mode entries per subsystem after initialization
    pub event_mode_entries: BTreeMap<String, u64>,
    /// Discrete-state update calls
    pub discrete_updates: u64,
    /// Simulated time reached
    pub final_time: SimTime,
    /// Wall-clock duration of the run in milliseconds
    pub wall_time_ms: f64,
}

impl RunStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks that went through event handling.
    pub fn dispatched(&self) -> u64 {
        self.time_events + self.state_events + self.simultaneous_events
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Run Statistics ===")?;
        writeln!(w, "Final simulation time: {}", self.final_time)?;
        writeln!(w, "Ticks: {}", self.ticks)?;
        writeln!(w, "Time events: {}", self.time_events)?;
        writeln!(w, "State events: {}", self.state_events)?;
        writeln!(w, "Simultaneous events: {}", self.simultaneous_events)?;
        writeln!(w, "Discrete updates: {}", self.discrete_updates)?;
        writeln!(w, "Wall time: {:.2} ms", self.wall_time_ms)?;

        if !self.event_mode_entries.is_empty() {
            writeln!(w, "--- Event mode entries ---")?;
            for (name, entries) in &self.event_mode_entries {
                writeln!(w, "  {name}: {entries}")?;
            }
        }
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Measures wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
