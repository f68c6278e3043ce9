//! First-order plant.
//!
//! `der(x) = -x + u`. As a model-exchange subsystem the orchestrator
//! integrates `x`; as a co-simulation subsystem the plant takes its own
//! explicit Euler step.

use crate::subsystem::{
    CallResult, Causality, Fault, StepOutcome, Subsystem, SubsystemKind, ValueResult,
    VariableDesc,
};
use crate::types::SimTime;

use super::{read_each, write_each};

#[derive(Clone, Debug, Default, PartialEq)]
struct PlantData {
    time: SimTime,
    x: f64,
    der_x: f64,
    u: f64,
}

impl PlantData {
    fn derivative(&mut self) -> f64 {
        self.der_x = -self.x + self.u;
        self.der_x
    }
}

/// First-order lag driven by the input `u`.
#[derive(Clone, Debug)]
pub struct Plant {
    kind: SubsystemKind,
    initial: PlantData,
    data: PlantData,
}

impl Plant {
    /// Creates a model-exchange plant starting at `x = 0`.
    pub fn new() -> Self {
        Self::with_kind(SubsystemKind::ModelExchange)
    }

    /// Creates a plant that steps itself.
    pub fn co_simulation() -> Self {
        Self::with_kind(SubsystemKind::CoSimulation)
    }

    /// Creates a plant of the given kind.
    pub fn with_kind(kind: SubsystemKind) -> Self {
        Self {
            kind,
            initial: PlantData::default(),
            data: PlantData::default(),
        }
    }

    /// Sets the initial state, also restored by `reset`.
    pub fn with_initial_state(mut self, x0: f64) -> Self {
        self.initial.x = x0;
        self.data.x = x0;
        self
    }
}

impl Default for Plant {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for Plant {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    fn variables(&self) -> Vec<VariableDesc> {
        vec![
            VariableDesc::continuous("time", Causality::Local),
            VariableDesc::continuous("x", Causality::Output),
            VariableDesc::continuous("der_x", Causality::Local),
            VariableDesc::continuous("u", Causality::Input),
        ]
    }

    fn get_continuous(&mut self, names: &[&str]) -> ValueResult<Vec<f64>> {
        let data = &self.data;
        read_each(names, |name| match name {
            "time" => Some(data.time),
            "x" => Some(data.x),
            "der_x" => Some(data.der_x),
            "u" => Some(data.u),
            _ => None,
        })
    }

    fn set_continuous(&mut self, names: &[&str], values: &[f64]) -> CallResult<()> {
        let data = &mut self.data;
        write_each(names, values, |name, value| match name {
            "u" => {
                data.u = value;
                true
            }
            _ => false,
        })
    }

    fn continuous_states(&mut self) -> ValueResult<Vec<f64>> {
        Ok(vec![self.data.x].into())
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<()> {
        match states {
            [x] => {
                self.data.x = *x;
                Ok(())
            }
            _ => Err(Fault::error(format!(
                "Unexpected number of continuous states: {}",
                states.len()
            ))),
        }
    }

    fn derivatives(&mut self) -> ValueResult<Vec<f64>> {
        Ok(vec![self.data.derivative()].into())
    }

    fn set_time(&mut self, time: SimTime) -> CallResult<()> {
        self.data.time = time;
        Ok(())
    }

    fn step(&mut self, time: SimTime, step: SimTime) -> ValueResult<StepOutcome> {
        if self.kind != SubsystemKind::CoSimulation {
            return Err(Fault::error("Plant was not instantiated for co-simulation"));
        }
        let dx = self.data.derivative();
        self.data.x += step * dx;
        self.data.time = time + step;
        Ok(StepOutcome {
            last_successful_time: self.data.time,
            ..StepOutcome::default()
        }
        .into())
    }

    fn reset(&mut self) -> CallResult<()> {
        self.data = self.initial.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivative() {
        let mut plant = Plant::new().with_initial_state(1.0);
        plant.set_continuous(&["u"], &[3.0]).unwrap();
        assert_eq!(plant.derivatives().unwrap().value, vec![2.0]);
        assert_eq!(plant.get_continuous(&["der_x"]).unwrap().value, vec![2.0]);
    }

    #[test]
    fn test_only_u_is_writable() {
        let mut plant = Plant::new();
        let fault = plant.set_continuous(&["x"], &[1.0]).unwrap_err();
        assert!(fault.message.contains('x'));
    }

    #[test]
    fn test_co_simulation_step() {
        let mut plant = Plant::co_simulation();
        plant.set_continuous(&["u"], &[1.0]).unwrap();
        let outcome = plant.step(0.0, 0.5).unwrap().value;
        assert!(!outcome.state_event);
        assert_eq!(outcome.last_successful_time, 0.5);
        assert_eq!(plant.get_continuous(&["x", "time"]).unwrap().value, vec![0.5, 0.5]);
    }

    #[test]
    fn test_model_exchange_refuses_step() {
        let mut plant = Plant::new();
        assert!(plant.step(0.0, 0.1).is_err());
    }

    #[test]
    fn test_state_vector_size() {
        let mut plant = Plant::new();
        assert!(plant.set_continuous_states(&[1.0, 2.0]).is_err());
        plant.set_continuous_states(&[4.0]).unwrap();
        assert_eq!(plant.continuous_states().unwrap().value, vec![4.0]);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut plant = Plant::new().with_initial_state(0.5);
        plant.set_continuous(&["u"], &[2.0]).unwrap();
        plant.set_continuous_states(&[7.0]).unwrap();
        plant.set_time(3.0).unwrap();

        plant.reset().unwrap();
        assert_eq!(
            plant.get_continuous(&["time", "x", "der_x", "u"]).unwrap().value,
            vec![0.0, 0.5, 0.0, 0.0]
        );
    }
}
