use super::{ConnectionError, ErrorCode, ExternalDataConnection};
use crate::master::{Measurement, UnitAddress};
use crate::position_calculator::CalculatedPosition;

use log::{debug, info};
use serial2::SerialPort;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Writes one text line per position or error to any [Write]able object:
///
/// ```text
/// POS <tx> <x> <y> <z>
/// ERR <tx> <code>
/// ```
///
/// Statistics are only counted, never written.
pub struct StreamConnection<W: Write> {
    name: String,
    writer: W,
    started: bool,
    measurements_seen: u64,
    measurements_with_ultrasound: u64,
}

impl<W: Write> StreamConnection<W> {
    /// Wraps `writer`. Nothing is written until [`ExternalDataConnection::start`].
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
            started: false,
            measurements_seen: 0,
            measurements_with_ultrasound: 0,
        }
    }

    /// Measurements counted so far, and how many of them at least three
    /// receivers heard.
    pub fn statistics(&self) -> (u64, u64) {
        (self.measurements_seen, self.measurements_with_ultrasound)
    }

    /// Gives the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: String) -> Result<(), ConnectionError> {
        if !self.started {
            return Err(ConnectionError::NotStarted);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl StreamConnection<TcpStream> {
    /// Connects to a TCP listener that wants the data.
    pub fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let name = format!("tcp {}", stream.peer_addr()?);
        Ok(Self::new(name, stream))
    }
}

impl StreamConnection<SerialPort> {
    /// Opens a serial port to stream the data over.
    pub fn open_serial(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self, ConnectionError> {
        let path = path.as_ref();
        let mut port = SerialPort::open(path, baud_rate)?;
        port.set_write_timeout(WRITE_TIMEOUT)?;
        Ok(Self::new(format!("serial {}", path.display()), port))
    }
}

impl<W: Write> ExternalDataConnection for StreamConnection<W> {
    fn start(&mut self) -> Result<(), ConnectionError> {
        info!("{} : started.", self.name);
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.started = false;
        info!(
            "{} : stopped after {} measurements ({} with ultrasound).",
            self.name, self.measurements_seen, self.measurements_with_ultrasound
        );
        self.writer.flush()?;
        Ok(())
    }

    fn update_statistics(&mut self, measurement: &Measurement) -> Result<(), ConnectionError> {
        self.measurements_seen += 1;
        if measurement.valid_distance_count() >= 3 {
            self.measurements_with_ultrasound += 1;
        }
        Ok(())
    }

    fn send_position(&mut self, position: &CalculatedPosition) -> Result<(), ConnectionError> {
        let p = position.position;
        debug!("{} : position {} for {}", self.name, p, position.tx_address);
        self.write_line(format!(
            "POS {} {:.1} {:.1} {:.1}",
            position.tx_address, p.x, p.y, p.z
        ))
    }

    fn send_error(&mut self, code: ErrorCode, tx_address: UnitAddress) -> Result<(), ConnectionError> {
        self.write_line(format!("ERR {} {}", tx_address, code))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::RxMeasurement;
    use crate::scenario::Point3;

    #[test]
    fn writes_positions_and_errors_as_lines() {
        let mut conn = StreamConnection::new("test", Vec::new());
        conn.start().unwrap();
        conn.send_position(&CalculatedPosition {
            position: Point3::new(1.0, -2.5, 300.04),
            tx_address: UnitAddress(12),
            scenario: None,
        })
        .unwrap();
        conn.send_error(ErrorCode::NoUltraSound, UnitAddress(13)).unwrap();
        conn.stop().unwrap();

        let text = String::from_utf8(conn.into_inner()).unwrap();
        assert_eq!(text, "POS 12 1.0 -2.5 300.0\nERR 13 NoUltraSound\n");
    }

    #[test]
    fn refuses_to_write_before_start() {
        let mut conn = StreamConnection::new("test", Vec::new());
        let res = conn.send_error(ErrorCode::Other, UnitAddress(1));
        assert!(matches!(res, Err(ConnectionError::NotStarted)));
    }

    #[test]
    fn counts_statistics_without_writing() {
        let mut conn = StreamConnection::new("test", Vec::new());
        conn.start().unwrap();
        let heard = |d: f64| RxMeasurement {
            receiver: UnitAddress(1),
            distance_mm: d,
        };
        let m = Measurement {
            tx_address: UnitAddress(4),
            rssi: 9,
            sequence: 0,
            rx_measurements: vec![heard(1.0), heard(2.0), heard(3.0)],
        };
        conn.update_statistics(&m).unwrap();
        conn.update_statistics(&Measurement {
            rx_measurements: vec![heard(0.0)],
            ..m
        })
        .unwrap();

        assert_eq!(conn.statistics(), (2, 1));
        assert!(conn.into_inner().is_empty());
    }
}
