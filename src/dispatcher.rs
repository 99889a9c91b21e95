//! The [`Dispatcher`] owns every piece of mutable state: scenarios, position
//! history, connected units, the merge flag, and a running calibration. It
//! consumes [`MasterEvent`]s one at a time, so nothing in here needs a lock.
//! Hardware threads only ever touch the
//! [`EventQueue`].

use crate::calibrator_triangle::{CalibrationSession, CalibratorTriangle, TriangleDetector};
use crate::event_queue::EventQueue;
use crate::external::{ConnectionError, ExternalDataConnection};
use crate::history::{Bounds, PositionHistory, Track};
use crate::master::{
    Master, MasterEvent, MasterSetup, MasterStatus, Measurement, TransmitterState, UnitAddress,
};
use crate::pipeline::{self, Effect, PipelineContext, TRANSMITTER_LEVEL};
use crate::position_calculator::{CalculatedPosition, PositionCalculator};
use crate::scenario::{Point3, Scenario, ScenarioId, ScenarioList, ScenarioTransform};
use crate::scenario_file::{ScenarioFileError, ScenarioStore};

use log::{debug, error, info, trace, warn};
use std::time::{Duration, Instant};
use std::{error::Error, fmt::Display};

/// How long [`Dispatcher::drain_until`] sleeps when the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Things the user asked for that could not be done.
#[derive(Debug)]
pub enum DispatchError {
    /// No Master device could be detected.
    MasterNotFound,
    /// A calibration needs the calibrator triangle and at least three receivers.
    NotReadyForCalibration,
    /// Merging needs at least two scenarios.
    MergeNeedsTwoScenarios,
    /// No scenario has this id.
    UnknownScenario(ScenarioId),
    /// A calibration is already running.
    CalibrationActive,
    /// There is no calibration to finish.
    CalibrationInactive,
    /// The calibration file could not be read or written.
    Persistence(ScenarioFileError),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::MasterNotFound => write!(
                f,
                "a Master could not be detected, make sure it is connected and the USB driver is installed"
            ),
            DispatchError::NotReadyForCalibration => write!(
                f,
                "need the calibration triangle and at least three receivers to create a new scenario"
            ),
            DispatchError::MergeNeedsTwoScenarios => {
                write!(f, "at least two scenarios are required for merge to make sense")
            }
            DispatchError::UnknownScenario(id) => write!(f, "no scenario with id {}", id.0),
            DispatchError::CalibrationActive => write!(f, "a calibration is already running"),
            DispatchError::CalibrationInactive => write!(f, "no calibration is running"),
            DispatchError::Persistence(e) => write!(f, "calibration file: {}", e),
        }
    }
}

impl Error for DispatchError {}

impl From<ScenarioFileError> for DispatchError {
    fn from(value: ScenarioFileError) -> Self {
        Self::Persistence(value)
    }
}

/// Calls `f` on every connection. Failures are logged and otherwise ignored
/// so one broken connection cannot hold up the others.
fn broadcast<F>(connections: &mut [Box<dyn ExternalDataConnection>], mut f: F)
where
    F: FnMut(&mut dyn ExternalDataConnection) -> Result<(), ConnectionError>,
{
    for connection in connections.iter_mut() {
        if let Err(e) = f(connection.as_mut()) {
            warn!("{} : {}", connection.name(), e);
        }
    }
}

/// The single consumer of Master events and user commands.
pub struct Dispatcher<M: Master> {
    master: M,
    calculator: Box<dyn PositionCalculator>,
    detector: Box<dyn TriangleDetector>,
    connections: Vec<Box<dyn ExternalDataConnection>>,
    store: Option<ScenarioStore>,
    setup: MasterSetup,

    scenarios: ScenarioList,
    history: PositionHistory,
    is_merging: bool,
    transmitters: Vec<UnitAddress>,
    receivers: Vec<UnitAddress>,
    triangle: Option<CalibratorTriangle>,
    calibration: Option<Box<dyn CalibrationSession>>,

    status_text: String,
    version_text: String,
}

impl<M: Master> Dispatcher<M> {
    /// A dispatcher with no scenarios, no connections and no calibration file.
    pub fn new<C, D>(master: M, calculator: C, detector: D) -> Self
    where
        C: PositionCalculator + 'static,
        D: TriangleDetector + 'static,
    {
        Self {
            master,
            calculator: Box::new(calculator),
            detector: Box::new(detector),
            connections: Vec::new(),
            store: None,
            setup: MasterSetup::for_temperature(22.0),
            scenarios: ScenarioList::new(),
            history: PositionHistory::new(),
            is_merging: false,
            transmitters: Vec::new(),
            receivers: Vec::new(),
            triangle: None,
            calibration: None,
            status_text: MasterStatus::Offline.to_string(),
            version_text: "Unknown".to_owned(),
        }
    }

    /// Sets what is sent to the Master once it connects.
    pub fn with_setup(self, setup: MasterSetup) -> Self {
        Self { setup, ..self }
    }

    /// Uses `store` as the calibration file, loading the last calibration
    /// from it if there is one.
    pub fn with_store(mut self, store: ScenarioStore) -> Result<Self, DispatchError> {
        if let Some(scenarios) = store.load_if_present()? {
            info!(
                "loaded {} scenarios from {}",
                scenarios.len(),
                store.path().display()
            );
            self.scenarios = scenarios;
            self.history.clear();
        }
        self.store = Some(store);
        Ok(self)
    }

    /// Registers and starts an external data connection.
    pub fn add_connection(&mut self, mut connection: Box<dyn ExternalDataConnection>) {
        if let Err(e) = connection.start() {
            warn!("{} : failed to start: {}", connection.name(), e);
        }
        self.connections.push(connection);
    }

    /// Starts connecting to the Master. Fails immediately if there is none.
    pub fn connect(&mut self) -> Result<(), DispatchError> {
        if self.master.begin_connect() {
            Ok(())
        } else {
            error!("failed to detect Master");
            Err(DispatchError::MasterNotFound)
        }
    }

    /// Handles every event currently waiting in `events`. Returns how many
    /// there were.
    pub fn drain(&mut self, events: impl Iterator<Item = MasterEvent>) -> usize {
        let mut count = 0;
        for event in events {
            self.handle(event);
            count += 1;
        }
        count
    }

    /// Keeps handling events from `queue` until `done` holds or `timeout`
    /// has passed. Returns whether `done` held.
    pub fn drain_until<F>(&mut self, queue: &EventQueue, timeout: Duration, done: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain(queue.clone());
            if done(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            spin_sleep::sleep(POLL_INTERVAL);
        }
    }

    /// Handles a single event from the Master.
    pub fn handle(&mut self, event: MasterEvent) {
        match event {
            MasterEvent::StatusChanged(status) => self.on_status_changed(status),
            MasterEvent::NewTransmitterConnected(address) => self.on_transmitter(address),
            MasterEvent::NewReceiverConnected(address) => self.on_receiver(address),
            MasterEvent::InfoReceived { version, serial } => {
                self.version_text = format!("{}, Serial: {}", version, serial);
                info!("Master version {}", self.version_text);
            }
            MasterEvent::MeasurementReceived(measurement) => self.on_measurement(measurement),
        }
    }

    fn on_status_changed(&mut self, status: MasterStatus) {
        self.status_text = status.to_string();

        if status == MasterStatus::Connected {
            self.status_text += &format!(" ({})", self.master.current_port_name());
            self.master.request_info();
            self.master.setup(self.setup);
            // Units show up as events, so this has to come last
            self.master.request_units();
        }
        info!("Master status: {}", self.status_text);
    }

    fn on_receiver(&mut self, address: UnitAddress) {
        if !self.receivers.contains(&address) {
            debug!("new receiver {}", address);
            self.receivers.push(address);
        }
    }

    fn on_transmitter(&mut self, address: UnitAddress) {
        if !self.transmitters.contains(&address) {
            debug!("new transmitter {}", address);
            self.transmitters.push(address);
            let state = pipeline::desired_state(address, self.is_merging, self.detector.as_ref());
            self.master
                .set_transmitter_state(address, state, TRANSMITTER_LEVEL);
        }

        if self.triangle.is_none() {
            self.triangle = self.detector.try_find(&self.transmitters);
            if let Some(triangle) = &self.triangle {
                info!(
                    "calibrator triangle detected: {:?}",
                    triangle.transmitter_addresses
                );
            }
        }
    }

    fn on_measurement(&mut self, measurement: Measurement) {
        broadcast(&mut self.connections, |c| c.update_statistics(&measurement));

        if let Some(session) = self.calibration.as_mut() {
            trace!("measurement from {} goes to calibration", measurement.tx_address);
            session.add_measurement(&measurement);
            return;
        }

        let ctx = PipelineContext {
            scenarios: self.scenarios.as_slice(),
            is_merging: self.is_merging,
            history_len: self.history.len(),
        };
        let effects = pipeline::process_measurement(&measurement, &ctx, self.calculator.as_ref());
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::EmitError { code, tx_address } => {
                    trace!("{} : {}", tx_address, code);
                    broadcast(&mut self.connections, |c| c.send_error(code, tx_address));
                }
                Effect::EmitPosition(position) => {
                    trace!("{} : {}", position.tx_address, position.position);
                    broadcast(&mut self.connections, |c| c.send_position(&position));
                    self.history.push(position);
                }
                Effect::Evict(count) => self.history.evict(count),
            }
        }
    }

    fn update_transmitter_states(&mut self) {
        for &address in &self.transmitters {
            let state = pipeline::desired_state(address, self.is_merging, self.detector.as_ref());
            self.master
                .set_transmitter_state(address, state, TRANSMITTER_LEVEL);
        }
    }

    fn set_triangle_state(&mut self, state: TransmitterState) {
        if let Some(triangle) = self.triangle {
            for address in triangle.transmitter_addresses {
                self.master
                    .set_transmitter_state(address, state, TRANSMITTER_LEVEL);
            }
        }
    }

    fn save(&self) -> Result<(), DispatchError> {
        if let Some(store) = &self.store {
            store.save(&self.scenarios)?;
            debug!("saved {} scenarios to {}", self.scenarios.len(), store.path().display());
        }
        Ok(())
    }

    /// Switches merge mode and re-applies every transmitter's state. The
    /// history is only trimmed to the new capacity on the next measurement.
    pub fn set_merging(&mut self, is_merging: bool) {
        info!("merging: {}", is_merging);
        self.is_merging = is_merging;
        self.update_transmitter_states();
    }

    /// Starts lining up scenarios against each other.
    pub fn begin_merge(&mut self) -> Result<(), DispatchError> {
        if self.scenarios.len() < 2 {
            return Err(DispatchError::MergeNeedsTwoScenarios);
        }
        if !self.is_merging {
            self.set_merging(true);
        }
        Ok(())
    }

    /// Moves a scenario in the shared frame.
    pub fn update_scenario_transform(
        &mut self,
        id: ScenarioId,
        transform: ScenarioTransform,
    ) -> Result<(), DispatchError> {
        let scenario = self
            .scenarios
            .get_mut(id)
            .ok_or(DispatchError::UnknownScenario(id))?;
        scenario.transform = transform;
        Ok(())
    }

    /// Done moving scenarios around; writes them to the calibration file.
    /// Merge mode stays on until [`Dispatcher::set_merging`] turns it off.
    pub fn finish_merge(&mut self) -> Result<(), DispatchError> {
        self.save()
    }

    /// Starts a calibration. Until [`Dispatcher::finish_calibration`], every
    /// measurement goes to `session` and nothing else.
    pub fn begin_calibration(
        &mut self,
        session: Box<dyn CalibrationSession>,
    ) -> Result<(), DispatchError> {
        if self.calibration.is_some() {
            return Err(DispatchError::CalibrationActive);
        }
        if self.triangle.is_none() || self.receivers.len() < 3 {
            return Err(DispatchError::NotReadyForCalibration);
        }

        // All three corners have to be heard, at full power
        self.set_triangle_state(TransmitterState::ActiveHigh);
        self.calibration = Some(session);
        info!("calibration started");
        Ok(())
    }

    /// Ends the calibration. If it produced a scenario, that scenario is
    /// added and its id returned. The triangle transmitters are switched off
    /// again either way.
    pub fn finish_calibration(&mut self) -> Result<Option<ScenarioId>, DispatchError> {
        let session = self
            .calibration
            .take()
            .ok_or(DispatchError::CalibrationInactive)?;

        let res = match session.finish() {
            Some(scenario) => self.add_scenario(scenario).map(Some),
            None => {
                info!("calibration cancelled");
                Ok(None)
            }
        };

        self.set_triangle_state(TransmitterState::Deactivated);
        res
    }

    /// Appends a scenario, rewrites the calibration file and starts the
    /// history over.
    pub fn add_scenario(&mut self, scenario: Scenario) -> Result<ScenarioId, DispatchError> {
        let id = self.scenarios.push(scenario);
        info!("added scenario {}", id.0);
        self.history.clear();
        self.save()?;
        Ok(id)
    }

    /// Removes a scenario and rewrites the calibration file.
    pub fn delete_scenario(&mut self, id: ScenarioId) -> Result<(), DispatchError> {
        self.scenarios
            .remove(id)
            .ok_or(DispatchError::UnknownScenario(id))?;
        info!("deleted scenario {}", id.0);
        self.save()
    }

    /// Restarts the Master and forgets every unit and position. The
    /// calibrator triangle stays detected. Does nothing while offline.
    pub fn restart(&mut self) {
        if self.master.status() == MasterStatus::Offline {
            return;
        }
        info!("restarting Master");
        self.master.request_restart();
        self.history.clear();
        self.receivers.clear();
        self.transmitters.clear();
    }

    /// Closes the Master and stops every connection.
    pub fn close(&mut self) {
        self.master.close();
        broadcast(&mut self.connections, |c| c.stop());
        info!("closed");
    }

    /// The Master this dispatcher drives.
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the Master, e.g. to release replayed measurements.
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Every calibrated scenario, in list order.
    pub fn scenarios(&self) -> &ScenarioList {
        &self.scenarios
    }

    /// Recently calculated positions, oldest first.
    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    /// True while scenarios are being lined up against each other.
    pub fn is_merging(&self) -> bool {
        self.is_merging
    }

    /// True between [`Dispatcher::begin_calibration`] and [`Dispatcher::finish_calibration`].
    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// Transmitters seen since the last restart, in order of arrival.
    pub fn transmitters(&self) -> &[UnitAddress] {
        &self.transmitters
    }

    /// Receivers seen since the last restart, in order of arrival.
    pub fn receivers(&self) -> &[UnitAddress] {
        &self.receivers
    }

    /// The calibrator triangle, once it has been seen.
    pub fn triangle(&self) -> Option<&CalibratorTriangle> {
        self.triangle.as_ref()
    }

    /// Whether the calibrator triangle has been seen.
    pub fn calibrator_triangle_detected(&self) -> bool {
        self.triangle.is_some()
    }

    /// E.g. `Connected (COM3)`.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// E.g. `2.1.0, Serial: A1B2C3`.
    pub fn version_text(&self) -> &str {
        &self.version_text
    }

    /// History grouped for display in the current mode, each position moved
    /// by the transform of the scenario that produced it.
    pub fn display_tracks(&self) -> Vec<Track> {
        let detector = self.detector.as_ref();
        self.history.tracks(
            self.is_merging,
            |a| detector.is_triangle_address(a),
            |entry| self.placed(entry),
        )
    }

    /// Area a display should show.
    pub fn bounds(&self) -> Bounds {
        self.history.bounds(|entry| self.placed(entry))
    }

    /// Where a stored position is drawn. Positions of deleted scenarios are
    /// drawn where they were computed.
    fn placed(&self, entry: &CalculatedPosition) -> Point3 {
        entry
            .scenario
            .and_then(|id| self.scenarios.get(id))
            .map_or(entry.position, |s| s.transform.apply(entry.position))
    }
}
