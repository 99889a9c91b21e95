//! Commandline argument parser using clap for UltraTrack

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line of the `ultratrack` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct UltraArgs {
    #[command(subcommand, long_about)]
    /// Where measurements come from, a simulation or a recording
    pub command: CommandTask,

    /// Calibration file to load scenarios from and save them to
    #[arg(short = 'c', long = "calibration", default_value = "Calibration.ron")]
    pub calibration: PathBuf,

    /// Air temperature, in degrees Celsius. Sets the speed of sound
    #[arg(short = 't', long = "temperature", default_value_t = 22.0)]
    pub temperature: f64,

    /// Send positions and errors to a TCP listener at this address
    #[arg(long = "tcp-sink")]
    pub tcp_sink: Option<String>,

    /// Send positions and errors out of this serial port
    #[arg(long = "serial-sink")]
    pub serial_sink: Option<PathBuf>,

    /// Baud rate of the serial sink
    #[arg(long = "serial-baud", default_value_t = 9600)]
    pub serial_baud: u32,

    /// Pick the serial sink's port from a list
    #[arg(long = "select-serial-sink")]
    pub select_serial_sink: bool,
}

/// Where measurements come from.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Track transmitters of a simulated Master
    #[command(about)]
    Simulate(SimulateCommand),

    /// Track transmitters of a recorded session
    #[command(about)]
    Replay(ReplayCommand),
}

/// Options of the simulated Master.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct SimulateCommand {
    /// Number of moving transmitters, not counting the calibrator triangle
    #[arg(short = 'n', long = "transmitters", default_value_t = 2)]
    pub transmitters: usize,

    /// Maximum distance error, in millimetres
    #[arg(long = "noise", default_value_t = 5.0)]
    pub noise: f64,

    /// Pulses per second per transmitter
    #[arg(short = 'r', long = "rate", default_value_t = 20.0)]
    pub rate: f64,

    /// Simulate two receiver groups and merge their scenarios
    #[arg(short = 'm', long = "merge")]
    pub merge: bool,
}

/// Options of the replay Master.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ReplayCommand {
    /// Recorded event log
    pub file: PathBuf,

    /// Measurements released per second
    #[arg(short = 'r', long = "rate", default_value_t = 50)]
    pub rate: usize,
}
