//! External data connections. Every computed position and every measurement
//! error is streamed to all registered connections.
//!
//! Connections are best effort: a failing call is reported back as a
//! [`ConnectionError`] and the caller logs it and moves on.

mod stream;

pub use stream::StreamConnection;

use crate::master::{Measurement, UnitAddress};
use crate::position_calculator::CalculatedPosition;

use std::{error::Error, fmt::Display};

/// Why a measurement did not produce a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No scenario has been calibrated yet.
    NoCalibration,
    /// The radio link to the transmitter was lost (RSSI of zero).
    TransmitterRadioLost,
    /// Fewer than three receivers heard the pulse.
    NoUltraSound,
    /// The resolver could not find a position.
    Other,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NoCalibration => "NoCalibration",
            ErrorCode::TransmitterRadioLost => "TransmitterRadioLost",
            ErrorCode::NoUltraSound => "NoUltraSound",
            ErrorCode::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

/// Why an external connection could not take a call.
#[derive(Debug)]
pub enum ConnectionError {
    /// Writing to the socket or port failed.
    IOError(std::io::Error),
    /// [`ExternalDataConnection::start`] has not been called.
    NotStarted,
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::IOError(e) => write!(f, "io error: {}", e),
            ConnectionError::NotStarted => write!(f, "connection was not started"),
        }
    }
}

impl Error for ConnectionError {}

impl From<std::io::Error> for ConnectionError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

/// `ExternalDataConnection`
///
/// A third party that wants positions and errors as they happen.
pub trait ExternalDataConnection {
    /// Called once when the connection is registered with the dispatcher.
    fn start(&mut self) -> Result<(), ConnectionError>;

    /// Called once when the dispatcher is closed.
    fn stop(&mut self) -> Result<(), ConnectionError>;

    /// Called for every raw measurement, before anything else happens to it.
    fn update_statistics(&mut self, measurement: &Measurement) -> Result<(), ConnectionError>;

    /// Called for every position the pipeline resolves.
    fn send_position(&mut self, position: &CalculatedPosition) -> Result<(), ConnectionError>;

    /// Called for every error a measurement produced.
    fn send_error(&mut self, code: ErrorCode, tx_address: UnitAddress) -> Result<(), ConnectionError>;

    /// Name used in log messages.
    fn name(&self) -> String;
}
