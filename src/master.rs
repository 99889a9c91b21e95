//! The hardware abstraction for the Master device and the unit, event and
//! measurement types that flow out of it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The radio address of a transmitter or receiver unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitAddress(pub u16);

impl fmt::Display for UnitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection status of the Master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    /// No device connection.
    Offline,
    /// The port has been opened, waiting for the handshake.
    Connecting,
    /// The Master answered and is ready for commands.
    Connected,
}

impl fmt::Display for MasterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MasterStatus::Offline => "Offline",
            MasterStatus::Connecting => "Connecting",
            MasterStatus::Connected => "Connected",
        };
        write!(f, "{}", name)
    }
}

/// Operating state a transmitter can be put in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterState {
    /// Emitting ultrasound and radio at full rate.
    ActiveHigh,
    /// Silent; takes no space in the measurement loop.
    Deactivated,
}

/// Per-transmitter ultrasonic power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UltrasonicLevel {
    /// Reduced ultrasonic output.
    Low,
    /// Full ultrasonic output.
    High,
}

/// Global ultrasonic level used in [`MasterSetup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupUltrasonicLevel {
    /// Quietest.
    Level1,
    /// Second quietest.
    Level2,
    /// Second loudest.
    Level3,
    /// Loudest, the default.
    Level4,
}

/// Parameters sent to the Master once it has connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterSetup {
    /// Radio baud setting.
    pub baud: u16,
    /// Speed of sound in m/s, rounded to the nearest integer.
    pub speed_of_sound: u16,
    /// Number of receiver channels.
    pub channels: u8,
    /// Reserved flag bits.
    pub flags: u8,
    /// Global ultrasonic output level.
    pub ultrasonic_level: SetupUltrasonicLevel,
}

impl MasterSetup {
    /// The setup used by the sample application, for a given air temperature.
    pub fn for_temperature(temperature_celsius: f64) -> Self {
        Self {
            baud: 110,
            speed_of_sound: (speed_of_sound(temperature_celsius) + 0.5) as u16,
            channels: 16,
            flags: 0,
            ultrasonic_level: SetupUltrasonicLevel::Level4,
        }
    }
}

/// Speed of sound in dry air, in m/s.
pub fn speed_of_sound(temperature_celsius: f64) -> f64 {
    331.3 + 0.606 * temperature_celsius
}

/// One receiver's distance reading for a single transmitter pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxMeasurement {
    /// The receiver that timed the pulse.
    pub receiver: UnitAddress,
    /// Distance in millimetres. Zero or less means no ultrasound arrived.
    pub distance_mm: f64,
}

impl RxMeasurement {
    /// True if the receiver actually heard the pulse.
    pub fn is_valid(&self) -> bool {
        self.distance_mm > 0.0
    }
}

/// A raw reading of one transmitter pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// The transmitter that pulsed.
    pub tx_address: UnitAddress,
    /// Radio signal strength. Zero means the radio link was lost.
    pub rssi: u8,
    /// Pulse sequence number.
    pub sequence: u32,
    /// Per-receiver readings, in receiver order.
    pub rx_measurements: Vec<RxMeasurement>,
}

impl Measurement {
    /// Number of receivers with a strictly positive distance.
    pub fn valid_distance_count(&self) -> usize {
        self.rx_measurements.iter().filter(|m| m.is_valid()).count()
    }
}

/// Everything the Master reports back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterEvent {
    /// The connection to the Master changed.
    StatusChanged(MasterStatus),
    /// A transmitter was seen for the first time.
    NewTransmitterConnected(UnitAddress),
    /// A receiver was seen for the first time.
    NewReceiverConnected(UnitAddress),
    /// Answer to [`Master::request_info`].
    InfoReceived {
        /// Firmware version.
        version: String,
        /// Serial number of the Master.
        serial: String,
    },
    /// One transmitter pulse, as heard by the receivers.
    MeasurementReceived(Measurement),
}

/// `Master`
///
/// Commands that can be issued to a Master device. Answers and measurements
/// do not come back from these calls, they are pushed as [`MasterEvent`]s
/// into the [`EventQueue`](crate::event_queue::EventQueue) the implementation
/// was built with.
pub trait Master {
    /// Starts connecting. Returns `false` immediately if no device is found,
    /// otherwise a [`MasterEvent::StatusChanged`] follows.
    fn begin_connect(&mut self) -> bool;

    /// Asks for firmware version and serial number.
    fn request_info(&mut self);

    /// Asks for every currently connected unit.
    fn request_units(&mut self);

    /// Restarts the Master.
    fn request_restart(&mut self);

    /// Changes the state of a single transmitter.
    fn set_transmitter_state(
        &mut self,
        address: UnitAddress,
        state: TransmitterState,
        level: UltrasonicLevel,
    );

    /// Sends the global parameters.
    fn setup(&mut self, setup: MasterSetup);

    /// Closes the device connection.
    fn close(&mut self);

    /// Current connection status.
    fn status(&self) -> MasterStatus;

    /// Name of the port the Master is attached to.
    fn current_port_name(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_at_room_temperature() {
        let setup = MasterSetup::for_temperature(22.0);
        assert_eq!(setup.speed_of_sound, 345);
        assert_eq!(setup.baud, 110);
        assert_eq!(setup.channels, 16);
        assert_eq!(setup.ultrasonic_level, SetupUltrasonicLevel::Level4);
    }

    #[test]
    fn valid_distances_are_strictly_positive() {
        let m = Measurement {
            tx_address: UnitAddress(7),
            rssi: 40,
            sequence: 0,
            rx_measurements: vec![
                RxMeasurement { receiver: UnitAddress(1), distance_mm: 0.0 },
                RxMeasurement { receiver: UnitAddress(2), distance_mm: -3.0 },
                RxMeasurement { receiver: UnitAddress(3), distance_mm: 1200.0 },
            ],
        };
        assert_eq!(m.valid_distance_count(), 1);
    }
}
