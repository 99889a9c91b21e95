//! Tracks transmitters from a simulated Master or a recorded session, and
//! streams positions and errors to the configured external connections.

use clap::Parser;
use log::info;
use serial2::SerialPort;
use std::time::Duration;
use ultratrack::{
    args::{CommandTask, UltraArgs},
    calibrator_triangle::ReservedRangeDetector,
    dispatcher::Dispatcher,
    dummy_master::{self, DummyMaster},
    event_queue::EventQueue,
    external::{ExternalDataConnection, StreamConnection},
    gui::{device_selector, fold_until_stop, MonitorError},
    master::{Master, MasterSetup, Measurement},
    position_calculator::CalculatedPosition,
    replay_master::ReplayMaster,
    scenario::Scenario,
    scenario_file::ScenarioStore,
};

const TICK: Duration = Duration::from_millis(50);

// Example:
// cargo run --bin ultratrack --
//                            --tcp-sink 127.0.0.1:5000
//                            simulate
//                            --transmitters 3
//                            --merge

fn main() {
    env_logger::init();
    let args = UltraArgs::parse();

    if let Err(e) = run(args) {
        eprintln!("ultratrack: {}", e);
        std::process::exit(1);
    }
}

fn run(args: UltraArgs) -> Result<(), MonitorError> {
    let queue = EventQueue::new();
    let setup = MasterSetup::for_temperature(args.temperature);
    let store = ScenarioStore::new(&args.calibration);
    let connections = open_connections(&args)?;

    match args.command {
        CommandTask::Simulate(sim) => {
            let groups = if sim.merge { 2 } else { 1 };
            let master = DummyMaster::builder()
                .num_transmitters(sim.transmitters)
                .receiver_groups(groups)
                .noise(sim.noise)
                .rate(sim.rate)
                .build(queue.clone());
            let calculator = master.calculator();

            let mut dispatcher = Dispatcher::new(master, calculator, ReservedRangeDetector::default())
                .with_setup(setup)
                .with_store(store)?;
            for connection in connections {
                dispatcher.add_connection(connection);
            }
            dispatcher.connect()?;

            if dispatcher.scenarios().is_empty() {
                info!("no calibration yet, calibrating {} receiver groups", groups);
                dummy_master::calibrate(&mut dispatcher, &queue, groups)?;
            }
            if sim.merge {
                dispatcher.begin_merge()?;
            }

            let mut dispatcher = fold_until_stop(
                dispatcher,
                |mut d| {
                    d.drain(queue.clone());
                    spin_sleep::sleep(TICK);
                    d
                },
                status_lines,
            )?;

            if dispatcher.is_merging() {
                dispatcher.finish_merge()?;
            }
            dispatcher.close();
        }

        CommandTask::Replay(replay) => {
            let master = ReplayMaster::from_path(&replay.file, queue.clone())?;
            let per_tick = (replay.rate as f64 * TICK.as_secs_f64()).ceil().max(1.0) as usize;

            // Recordings carry no ground truth to resolve against, so only
            // the per-measurement checks produce output
            let unresolved = |_: &Measurement, _: &[Scenario]| -> Option<CalculatedPosition> { None };

            let mut dispatcher = Dispatcher::new(master, unresolved, ReservedRangeDetector::default())
                .with_setup(setup)
                .with_store(store)?;
            for connection in connections {
                dispatcher.add_connection(connection);
            }
            dispatcher.connect()?;

            let mut finished = false;
            let mut dispatcher = fold_until_stop(
                dispatcher,
                |mut d| {
                    d.drain(queue.clone());
                    d.master_mut().play(per_tick);
                    if !finished && d.master().remaining() == 0 {
                        info!("{} : recording finished", replay.file.display());
                        finished = true;
                    }
                    spin_sleep::sleep(TICK);
                    d
                },
                status_lines,
            )?;
            dispatcher.close();
        }
    }

    Ok(())
}

fn open_connections(args: &UltraArgs) -> Result<Vec<Box<dyn ExternalDataConnection>>, MonitorError> {
    let mut connections: Vec<Box<dyn ExternalDataConnection>> = Vec::new();

    if let Some(addr) = &args.tcp_sink {
        connections.push(Box::new(StreamConnection::connect_tcp(addr.as_str())?));
    }

    let serial = if args.select_serial_sink {
        device_selector(SerialPort::available_ports()?, args.serial_baud)?
    } else {
        args.serial_sink.clone()
    };
    if let Some(path) = serial {
        connections.push(Box::new(StreamConnection::open_serial(&path, args.serial_baud)?));
    }

    Ok(connections)
}

fn status_lines<M: Master>(d: &Dispatcher<M>) -> Vec<String> {
    vec![
        format!(" Master: {} ", d.status_text()),
        format!(" Version: {} ", d.version_text()),
        format!(
            " Units: {} transmitters, {} receivers, triangle {} ",
            d.transmitters().len(),
            d.receivers().len(),
            if d.calibrator_triangle_detected() { "found" } else { "missing" }
        ),
        format!(
            " Scenarios: {}{} ",
            d.scenarios().len(),
            if d.is_merging() { " (merging)" } else { "" }
        ),
        format!(" History: {} positions ", d.history().len()),
    ]
}
