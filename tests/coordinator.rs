//! Integration tests for the step coordinator.
//!
//! These tests verify the stepping lifecycle end to end:
//! - time axis and sample count
//! - periodic time events
//! - indicator-based and step-flagged state events
//! - status handling and teardown

use cosync::models::{CallJournal, ScriptedSubsystem, Supervisor};
use cosync::{
    Causality, DispatchBranch, Fault, NullRecorder, Orchestrator, OrchestratorError, PeriodicClock,
    Phase, StateEventSource, SubsystemId, SubsystemKind, Trajectory, ValueLink, VarRef,
};

const ME: SubsystemKind = SubsystemKind::ModelExchange;
const CS: SubsystemKind = SubsystemKind::CoSimulation;

// ============================================================================
// Helpers
// ============================================================================

fn single(
    orchestrator: &mut Orchestrator,
    subsystem: ScriptedSubsystem,
    name: &str,
) -> SubsystemId {
    orchestrator.add_subsystem(name, Box::new(subsystem)).unwrap()
}

/// Runs every tick and returns the ticks on which a time event fired.
fn time_event_ticks(orchestrator: &mut Orchestrator) -> Vec<u64> {
    orchestrator.initialize(&mut NullRecorder).unwrap();
    let mut ticks = Vec::new();
    while !orchestrator.is_finished() {
        let report = orchestrator.step(&mut NullRecorder).unwrap();
        if report.fired.has_time_event() {
            ticks.push(report.tick);
        }
    }
    ticks
}

/// Runs every tick and returns the ticks on which a state event fired.
fn state_event_ticks(orchestrator: &mut Orchestrator) -> Vec<u64> {
    orchestrator.initialize(&mut NullRecorder).unwrap();
    let mut ticks = Vec::new();
    while !orchestrator.is_finished() {
        let report = orchestrator.step(&mut NullRecorder).unwrap();
        if report.fired.has_state_event() {
            ticks.push(report.tick);
        }
    }
    ticks
}

fn indicator_source(journal: &CallJournal, values: Vec<f64>) -> (Orchestrator, SubsystemId) {
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("watch", ME, journal.clone())
            .with_indicator(values)
            .with_latched_clock("s"),
        "watch",
    );
    orchestrator
        .add_state_event(StateEventSource::new(VarRef::new(id, "s")))
        .unwrap();
    (orchestrator, id)
}

// ============================================================================
// Time axis
// ============================================================================

#[test]
fn test_sample_count_and_times() {
    let mut orchestrator = Orchestrator::new(0.0, 1.0, 0.01);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("sub", ME, CallJournal::new())
            .with_value("y", Causality::Output, 3.0),
        "sub",
    );
    orchestrator.add_column("y", VarRef::new(id, "y")).unwrap();

    let mut trajectory = Trajectory::new();
    let stats = orchestrator.run(&mut trajectory).unwrap();

    assert_eq!(stats.ticks, 101);
    assert_eq!(trajectory.len(), 101);
    for (k, t) in trajectory.times().into_iter().enumerate() {
        assert!((t - k as f64 * 0.01).abs() < 1e-12, "tick {k} at {t}");
    }
    assert!((stats.final_time - 1.0).abs() < 1e-12);
    assert_eq!(stats.dispatched(), 0);
}

#[test]
fn test_non_zero_start_time() {
    let mut orchestrator = Orchestrator::new(2.0, 2.5, 0.1);
    single(&mut orchestrator, ScriptedSubsystem::new("sub", ME, CallJournal::new()), "sub");

    let mut trajectory = Trajectory::new();
    orchestrator.run(&mut trajectory).unwrap();
    let times = trajectory.times();
    assert_eq!(times.len(), 6);
    assert_eq!(times[0], 2.0);
    assert!((times[5] - 2.5).abs() < 1e-12);
}

#[test]
fn test_every_subsystem_advanced_once_per_step() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.1, 0.01);
    single(&mut orchestrator, ScriptedSubsystem::new("a", CS, journal.clone()), "a");
    single(&mut orchestrator, ScriptedSubsystem::new("b", CS, journal.clone()), "b");

    orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(journal.count("a.step"), 10);
    assert_eq!(journal.count("b.step"), 10);
    // Registration order within each step.
    assert_eq!(journal.matching(".step")[..2], ["a.step", "b.step"]);
}

// ============================================================================
// Time events
// ============================================================================

#[test]
fn test_periodic_clock_fires_every_interval() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.35, 0.01);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, journal.clone()).with_periodic_clock("r", 0.1),
        "ctrl",
    );
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(id, "r")))
        .unwrap();

    assert_eq!(time_event_ticks(&mut orchestrator), vec![10, 20, 30]);
    // No event mode between firings.
    assert_eq!(journal.count("ctrl.enter_event_mode"), 3);
    assert_eq!(journal.count("ctrl.set_clock:r"), 3);
}

#[test]
fn test_interval_not_multiple_of_step() {
    let mut orchestrator = Orchestrator::new(0.0, 1.0, 0.1);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, CallJournal::new()).with_periodic_clock("r", 0.25),
        "ctrl",
    );
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(id, "r")))
        .unwrap();

    // Fires on the first tick at or past each due time, then rearms with a
    // full period from that tick.
    assert_eq!(time_event_ticks(&mut orchestrator), vec![3, 6, 9]);
}

#[test]
fn test_participants_enter_event_mode() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.1, 0.05);
    let ctrl = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, journal.clone()).with_periodic_clock("r", 0.05),
        "ctrl",
    );
    let logger = single(
        &mut orchestrator,
        ScriptedSubsystem::new("logger", ME, journal.clone()),
        "logger",
    );
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(ctrl, "r")).with_participant(logger))
        .unwrap();

    orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(journal.count("logger.enter_event_mode"), 2);
    assert_eq!(journal.count("logger.update"), 2);
}

// ============================================================================
// State events
// ============================================================================

#[test]
fn test_indicator_sign_change_detected_once() {
    let journal = CallJournal::new();
    let (mut orchestrator, _) = indicator_source(&journal, vec![1.0, 0.5, -0.3, -1.0]);

    assert_eq!(state_event_ticks(&mut orchestrator), vec![2]);
    // One seed sample plus one per step.
    assert_eq!(journal.count("watch.event_indicator"), 6);
}

#[test]
fn test_touching_zero_is_not_a_crossing() {
    let journal = CallJournal::new();
    let (mut orchestrator, _) = indicator_source(&journal, vec![1.0, 0.0, -1.0]);
    assert!(state_event_ticks(&mut orchestrator).is_empty());
}

#[test]
fn test_seed_suppresses_spurious_first_event() {
    // Already negative at the initial instant: nothing to report.
    let journal = CallJournal::new();
    let (mut orchestrator, _) = indicator_source(&journal, vec![-1.0]);
    assert!(state_event_ticks(&mut orchestrator).is_empty());
}

#[test]
fn test_repeated_crossings() {
    let journal = CallJournal::new();
    let (mut orchestrator, _) = indicator_source(&journal, vec![1.0, -1.0, 1.0, 1.0, -1.0]);
    assert_eq!(state_event_ticks(&mut orchestrator), vec![1, 2, 4]);
}

#[test]
fn test_supervisor_latches_where_indicator_crosses() {
    // x = 0, 1, 2, 3, 1 gives z = 2 - x = 2, 1, 0, -1, 1: touching zero
    // is no crossing, the way back up is.
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    let source = single(
        &mut orchestrator,
        ScriptedSubsystem::new("source", ME, CallJournal::new())
            .with_series("x", vec![0.0, 1.0, 2.0, 3.0, 1.0]),
        "source",
    );
    let supervisor = orchestrator
        .add_subsystem("supervisor", Box::new(Supervisor::new(2.0)))
        .unwrap();
    orchestrator
        .add_continuous_link(ValueLink::new(
            VarRef::new(source, "x"),
            VarRef::new(supervisor, "x"),
        ))
        .unwrap();
    orchestrator
        .add_state_event(StateEventSource::new(VarRef::new(supervisor, "s")))
        .unwrap();

    assert_eq!(state_event_ticks(&mut orchestrator), vec![5]);
    orchestrator.finalize().unwrap();
}

#[test]
fn test_co_simulation_step_flag() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("cs", CS, journal.clone())
            .with_state_event_at_steps(vec![3])
            .with_latched_clock("s"),
        "cs",
    );
    orchestrator
        .add_state_event(StateEventSource::new(VarRef::new(id, "s")))
        .unwrap();

    assert_eq!(state_event_ticks(&mut orchestrator), vec![3]);
    assert_eq!(journal.count("cs.event_indicator"), 0);
    assert_eq!(journal.count("cs.enter_step_mode"), 2);
}

#[test]
fn test_unclaimed_step_flag_is_ignored() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("cs", CS, journal.clone()).with_state_event_at_steps(vec![2]),
        "cs",
    );

    let stats = orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(stats.state_events, 0);
    assert_eq!(journal.count("cs.enter_event_mode"), 0);
}

#[test]
fn test_model_exchange_source_needs_indicator() {
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("me", ME, CallJournal::new()).with_latched_clock("s"),
        "me",
    );
    orchestrator
        .add_state_event(StateEventSource::new(VarRef::new(id, "s")))
        .unwrap();

    let err = orchestrator.initialize(&mut NullRecorder).unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { operation: "state_event", .. }));
    assert_eq!(orchestrator.phase(), Phase::Failed);
}

#[test]
fn test_state_and_time_counted_separately() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.04, 0.01);
    let watch = single(
        &mut orchestrator,
        ScriptedSubsystem::new("watch", ME, journal.clone())
            .with_indicator(vec![1.0, -1.0, -1.0, 1.0])
            .with_latched_clock("s"),
        "watch",
    );
    let ctrl = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, journal.clone()).with_periodic_clock("r", 0.02),
        "ctrl",
    );
    orchestrator
        .add_state_event(StateEventSource::new(VarRef::new(watch, "s")))
        .unwrap();
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(ctrl, "r")))
        .unwrap();

    orchestrator.initialize(&mut NullRecorder).unwrap();
    let branches: Vec<Option<DispatchBranch>> = (0..4)
        .map(|_| {
            orchestrator
                .step(&mut NullRecorder)
                .unwrap()
                .dispatch
                .map(|d| d.branch)
        })
        .collect();
    assert_eq!(
        branches,
        vec![
            Some(DispatchBranch::StateOnly),
            Some(DispatchBranch::TimeOnly),
            Some(DispatchBranch::StateOnly),
            Some(DispatchBranch::TimeOnly),
        ]
    );

    orchestrator.finalize().unwrap();
    let stats = orchestrator.stats();
    assert_eq!(stats.state_events, 2);
    assert_eq!(stats.time_events, 2);
    assert_eq!(stats.simultaneous_events, 0);
    assert_eq!(stats.event_mode_entries["watch"], 2);
    assert_eq!(stats.event_mode_entries["ctrl"], 2);
}

// ============================================================================
// Status handling and teardown
// ============================================================================

#[test]
fn test_fatal_poisons_subsystem() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.1, 0.01);
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("healthy", CS, journal.clone()),
        "healthy",
    );
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("broken", CS, journal.clone())
            .failing("step", Fault::fatal("solver diverged")),
        "broken",
    );

    let err = orchestrator.run(&mut NullRecorder).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::SubsystemFatal { ref subsystem, .. } if subsystem == "broken"
    ));

    // The poisoned subsystem is released without further calls.
    assert_eq!(journal.count("broken.reset"), 0);
    assert_eq!(journal.count("broken.terminate"), 0);
    assert_eq!(journal.count("healthy.reset"), 1);
    assert_eq!(journal.count("healthy.terminate"), 1);
    assert_eq!(orchestrator.phase(), Phase::Released);
}

#[test]
fn test_error_aborts_run_but_not_teardown() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.1, 0.01);
    let a = single(
        &mut orchestrator,
        ScriptedSubsystem::new("a", ME, journal.clone()).with_value("y", Causality::Output, 1.0),
        "a",
    );
    let b = single(
        &mut orchestrator,
        ScriptedSubsystem::new("b", ME, journal.clone())
            .with_value("u", Causality::Input, 0.0)
            .failing("set_continuous", Fault::error("rejected")),
        "b",
    );
    orchestrator
        .add_continuous_link(ValueLink::new(VarRef::new(a, "y"), VarRef::new(b, "u")))
        .unwrap();

    let err = orchestrator.run(&mut NullRecorder).unwrap_err();
    assert!(matches!(err, OrchestratorError::SubsystemFailed { operation: "set_continuous", .. }));
    assert_eq!(journal.count("b.reset"), 1);
    assert_eq!(journal.count("b.terminate"), 1);
}

#[test]
fn test_warning_on_mode_change_continues() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.2, 0.1);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, journal.clone())
            .with_periodic_clock("r", 0.1)
            .failing("enter_continuous_time_mode", Fault::warning("late")),
        "ctrl",
    );
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(id, "r")))
        .unwrap();

    let stats = orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(stats.time_events, 2);
}

#[test]
fn test_warning_on_step_continues() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.05, 0.01);
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("cs", CS, journal.clone())
            .failing("step", Fault::warning("reduced accuracy")),
        "cs",
    );

    let stats = orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(stats.ticks, 6);
    assert_eq!(journal.count("cs.step"), 5);
}

#[test]
fn test_warning_on_discrete_update_continues() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.2, 0.1);
    let id = single(
        &mut orchestrator,
        ScriptedSubsystem::new("ctrl", ME, journal.clone())
            .with_periodic_clock("r", 0.1)
            .failing("update_discrete_states", Fault::warning("clamped")),
        "ctrl",
    );
    orchestrator
        .add_periodic_clock(PeriodicClock::new(VarRef::new(id, "r")))
        .unwrap();

    let stats = orchestrator.run(&mut NullRecorder).unwrap();
    assert_eq!(stats.time_events, 2);
    assert_eq!(stats.discrete_updates, 2);
}

#[test]
fn test_teardown_collects_first_error() {
    let journal = CallJournal::new();
    let mut orchestrator = Orchestrator::new(0.0, 0.02, 0.01);
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("first", ME, journal.clone())
            .failing("terminate", Fault::error("cannot terminate")),
        "first",
    );
    single(&mut orchestrator, ScriptedSubsystem::new("second", ME, journal.clone()), "second");

    let err = orchestrator.run(&mut NullRecorder).unwrap_err();
    assert_eq!(err.subsystem(), Some("first"));
    assert_eq!(journal.count("second.terminate"), 1);
    assert!(orchestrator.finalize().is_err());
}

#[test]
fn test_stepping_after_failure_is_rejected() {
    let mut orchestrator = Orchestrator::new(0.0, 0.1, 0.01);
    single(
        &mut orchestrator,
        ScriptedSubsystem::new("cs", CS, CallJournal::new())
            .failing("step", Fault::discard("cannot step")),
        "cs",
    );
    orchestrator.initialize(&mut NullRecorder).unwrap();
    assert!(orchestrator.step(&mut NullRecorder).is_err());
    assert_eq!(orchestrator.phase(), Phase::Failed);

    let err = orchestrator.step(&mut NullRecorder).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidPhase { .. }));
    orchestrator.finalize().unwrap();
}
