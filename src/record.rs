//! Per-tick sample recording.
//!
//! The orchestrator reads every configured column once per instant and hands
//! the resulting [`Sample`] to a [`Recorder`]. It does not know about file
//! formats; [`Trajectory`] keeps the samples in memory and can render them
//! as CSV for whoever wants to write them out.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Column values at one simulated instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulated time of the instant
    pub time: SimTime,
    /// One value per column, in column order
    pub values: Vec<f64>,
}

/// Receives one sample per simulated instant.
pub trait Recorder {
    /// Called once before the first sample with the column labels.
    fn begin(&mut self, _labels: &[String]) {}

    /// Called with the sample of the current instant.
    fn record(&mut self, sample: &Sample);
}

impl<F> Recorder for F
where
    F: FnMut(&Sample),
{
    fn record(&mut self, sample: &Sample) {
        self(sample)
    }
}

/// Discards every sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record(&mut self, _sample: &Sample) {}
}

/// In-memory table of samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    labels: Vec<String>,
    samples: Vec<Sample>,
}

impl Trajectory {
    /// Creates an empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column labels, without the time column.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All recorded samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recorded times.
    pub fn times(&self) -> Vec<SimTime> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Values of the column labelled `label`.
    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let index = self.labels.iter().position(|l| l == label)?;
        Some(self.samples.iter().map(|s| s.values[index]).collect())
    }

    /// Renders the trajectory as CSV with a `time` column first.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("time");
        for label in &self.labels {
            csv.push(',');
            csv.push_str(label);
        }
        csv.push('\n');

        for sample in &self.samples {
            csv.push_str(&sample.time.to_string());
            for value in &sample.values {
                csv.push(',');
                csv.push_str(&value.to_string());
            }
            csv.push('\n');
        }
        csv
    }

    /// Writes the CSV rendering to `w`.
    pub fn write_csv<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        w.write_all(self.to_csv().as_bytes())
    }

    /// Writes the CSV rendering to a file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }
}

impl Recorder for Trajectory {
    fn begin(&mut self, labels: &[String]) {
        self.labels = labels.to_vec();
        self.samples.clear();
    }

    fn record(&mut self, sample: &Sample) {
        self.samples.push(sample.clone());
    }
}
