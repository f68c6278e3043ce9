//! Supervisory control example.
//!
//! A controller clocked every 0.1 ramps its command into a first-order plant.
//! Whenever the plant output crosses 2.0 the supervisor raises a state event
//! and the controller reverses the ramp, so the output oscillates around the
//! threshold.
//!
//! Usage:
//!
//! ```text
//! cargo run --example supervisory_control                # model exchange
//! cargo run --example supervisory_control -- --cs        # co-simulation
//! cargo run --example supervisory_control -- run.yaml out.csv
//! ```

use cosync::{create_default_registry, SimConfig, SubsystemKind, Trajectory};

fn main() {
    let mut kind = SubsystemKind::ModelExchange;
    let mut paths = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--cs" => kind = SubsystemKind::CoSimulation,
            _ => paths.push(arg),
        }
    }

    let config = match paths.first() {
        Some(path) => match SimConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => SimConfig::supervisory_control(kind),
    };
    cosync::init_logging(&config.simulation.log_level);

    println!("==== Supervisory control ====");
    println!(
        "{} subsystems, t = [{}, {}], h = {}\n",
        config.subsystems.len(),
        config.simulation.start_time,
        config.simulation.stop_time,
        config.simulation.fixed_step
    );

    let registry = create_default_registry();
    let mut orchestrator = match config.build(&registry) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut trajectory = Trajectory::new();
    let stats = match orchestrator.run(&mut trajectory) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("simulation failed: {e}");
            std::process::exit(1);
        }
    };

    // Print the instants at which the supervisor switched.
    if let (Some(x), Some(command)) = (
        trajectory.column("plant.x"),
        trajectory.column("controller.as"),
    ) {
        let times = trajectory.times();
        for i in 1..command.len() {
            if command[i] != command[i - 1] {
                println!(
                    "t = {:>6.2}  x = {:>7.4}  command {:>2} -> {:>2}",
                    times[i],
                    x[i],
                    command[i - 1],
                    command[i]
                );
            }
        }
    }

    println!();
    print!("{}", stats.summary());

    if let Some(path) = paths.get(1) {
        match trajectory.to_csv_file(path) {
            Ok(()) => println!("\nTrajectory written to {path}"),
            Err(e) => {
                eprintln!("failed to write {path}: {e}");
                std::process::exit(1);
            }
        }
    }
}
