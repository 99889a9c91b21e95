//! A [`Master`] that plays back a recorded event log instead of talking to a
//! device. See [`message_decoder`](crate::message_decoder) for the format.

use crate::event_queue::EventQueue;
use crate::master::{
    Master, MasterEvent, MasterSetup, MasterStatus, TransmitterState, UltrasonicLevel,
    UnitAddress,
};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Plays back units, info and measurements from a recording.
///
/// Unit and info lines are answered on [`Master::request_units`] and
/// [`Master::request_info`]; measurements are released in recorded order by
/// [`ReplayMaster::play`]. Recorded status lines are ignored, the replay
/// decides its own status.
pub struct ReplayMaster {
    name: String,
    queue: EventQueue,
    status: MasterStatus,
    units: Vec<MasterEvent>,
    info: Option<MasterEvent>,
    measurements: Vec<MasterEvent>,
    cursor: usize,
    states: HashMap<UnitAddress, TransmitterState>,
}

impl ReplayMaster {
    /// Reads the recording at `path`.
    pub fn from_path(path: impl AsRef<Path>, queue: EventQueue) -> io::Result<Self> {
        let path = path.as_ref();
        let mut replay = Self::from_reader(File::open(path)?, queue)?;
        replay.name = path.display().to_string();
        Ok(replay)
    }

    /// Reads a recording from any [Read]able object. Lines that do not parse
    /// are logged and skipped.
    pub fn from_reader(reader: impl Read, queue: EventQueue) -> io::Result<Self> {
        let mut replay = ReplayMaster {
            name: "replay".to_owned(),
            queue,
            status: MasterStatus::Offline,
            units: Vec::new(),
            info: None,
            measurements: Vec::new(),
            cursor: 0,
            states: HashMap::new(),
        };

        for (number, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match MasterEvent::from_str(trimmed) {
                Ok(event @ MasterEvent::MeasurementReceived(_)) => replay.measurements.push(event),
                Ok(event @ MasterEvent::InfoReceived { .. }) => replay.info = Some(event),
                Ok(MasterEvent::StatusChanged(_)) => {}
                Ok(event) => replay.units.push(event),
                Err(e) => warn!("line {}: was unable to parse recorded event: {:?}", number + 1, e),
            }
        }

        Ok(replay)
    }

    /// Measurements not played yet.
    pub fn remaining(&self) -> usize {
        self.measurements.len() - self.cursor
    }

    /// Releases up to `max` recorded measurements into the queue. Pulses of
    /// transmitters that have been deactivated are skipped, as the hardware
    /// would never have sent them. Returns how many recorded measurements
    /// were consumed.
    pub fn play(&mut self, max: usize) -> usize {
        if self.status != MasterStatus::Connected {
            return 0;
        }
        let end = self.measurements.len().min(self.cursor.saturating_add(max));
        for event in &self.measurements[self.cursor..end] {
            if let MasterEvent::MeasurementReceived(m) = event {
                if self.states.get(&m.tx_address) == Some(&TransmitterState::Deactivated) {
                    continue;
                }
            }
            self.queue.push(event.clone());
        }
        let played = end - self.cursor;
        self.cursor = end;
        played
    }

    fn set_status(&mut self, status: MasterStatus) {
        self.status = status;
        self.queue.push(MasterEvent::StatusChanged(status));
    }
}

impl Master for ReplayMaster {
    fn begin_connect(&mut self) -> bool {
        if self.units.is_empty() && self.measurements.is_empty() {
            return false;
        }
        info!("{} : replaying {} measurements", self.name, self.measurements.len());
        self.set_status(MasterStatus::Connecting);
        self.set_status(MasterStatus::Connected);
        true
    }

    fn request_info(&mut self) {
        let info = self.info.clone().unwrap_or_else(|| MasterEvent::InfoReceived {
            version: "replay".to_owned(),
            serial: self.name.clone(),
        });
        self.queue.push(info);
    }

    fn request_units(&mut self) {
        for unit in &self.units {
            self.queue.push(unit.clone());
        }
    }

    fn request_restart(&mut self) {
        self.states.clear();
        self.cursor = 0;
        self.set_status(MasterStatus::Connecting);
        self.set_status(MasterStatus::Connected);
    }

    fn set_transmitter_state(
        &mut self,
        address: UnitAddress,
        state: TransmitterState,
        level: UltrasonicLevel,
    ) {
        debug!("{} : {} -> {:?} ({:?})", self.name, address, state, level);
        self.states.insert(address, state);
    }

    fn setup(&mut self, setup: MasterSetup) {
        debug!("{} : setup {:?}", self.name, setup);
    }

    fn close(&mut self) {
        self.status = MasterStatus::Offline;
    }

    fn status(&self) -> MasterStatus {
        self.status
    }

    fn current_port_name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = "\
# recorded in the lab
+STATUS:Connected
+INFO:\"2.1.0\",\"A1B2C3\"
+RX:1
+RX:2
+RX:3
+TX:65280
+TX:1000
+MEAS:1000,45,1,1=1000;2=1100;3=1200
+MEAS:65280,45,2,1=900;2=950;3=990
this line is broken
+MEAS:1000,0,3,1=1000;2=0;3=0
";

    fn replay() -> (ReplayMaster, EventQueue) {
        let queue = EventQueue::new();
        let replay = ReplayMaster::from_reader(RECORDING.as_bytes(), queue.clone()).unwrap();
        (replay, queue)
    }

    #[test]
    fn splits_the_recording() {
        let (replay, _) = replay();
        assert_eq!(replay.units.len(), 5);
        assert_eq!(replay.remaining(), 3);
        assert!(replay.info.is_some());
    }

    #[test]
    fn plays_nothing_before_connecting() {
        let (mut replay, queue) = replay();
        assert_eq!(replay.play(10), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn skips_deactivated_transmitters() {
        let (mut replay, queue) = replay();
        assert!(replay.begin_connect());
        queue.clear();

        replay.set_transmitter_state(
            UnitAddress(65280),
            TransmitterState::Deactivated,
            UltrasonicLevel::High,
        );
        assert_eq!(replay.play(2), 2);
        assert_eq!(replay.remaining(), 1);

        let played: Vec<_> = queue.clone().collect();
        assert_eq!(played.len(), 1);
        assert!(matches!(
            &played[0],
            MasterEvent::MeasurementReceived(m) if m.tx_address == UnitAddress(1000)
        ));

        assert_eq!(replay.play(usize::MAX), 1);
        assert_eq!(replay.remaining(), 0);
    }

    #[test]
    fn empty_recording_is_no_device() {
        let mut replay = ReplayMaster::from_reader("".as_bytes(), EventQueue::new()).unwrap();
        assert!(!replay.begin_connect());
    }
}
