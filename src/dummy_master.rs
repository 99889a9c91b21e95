//! A simulated Master. Runs a background thread that moves transmitters
//! around on circles and reports the distances the receivers would have
//! measured, with some noise.
//!
//! Since there is no real solver in this crate, the simulation also comes
//! with [`DummyCalculator`], which "resolves" a measurement by looking up
//! where the simulation actually put the transmitter.

use crate::calibrator_triangle::RecordingSession;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::event_queue::EventQueue;
use crate::master::{
    Master, MasterEvent, MasterSetup, MasterStatus, Measurement, RxMeasurement,
    TransmitterState, UltrasonicLevel, UnitAddress,
};
use crate::position_calculator::{CalculatedPosition, PositionCalculator};
use crate::scenario::{Point3, ReceiverPlacement, Scenario, ScenarioId};

use log::{debug, info, warn};
use rand::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

/// First address of the simulated calibrator triangle. Matches the default
/// [`ReservedRangeDetector`](crate::calibrator_triangle::ReservedRangeDetector).
pub const TRIANGLE_BASE_ADDRESS: u16 = 0xFF00;

/// Side length of the simulated calibrator triangle's legs, in millimetres.
const TRIANGLE_LEG: f64 = 1000.0;

/// Receivers further away than this never hear a pulse.
const HEARING_RANGE: f64 = 9000.0;

/// Receivers hang from the ceiling.
const RECEIVER_HEIGHT: f64 = 2500.0;

/// Side of the square each receiver group is laid out on.
const GROUP_SIDE: f64 = 4000.0;

/// Pulses remembered per transmitter. Measurements that sit in the queue
/// for longer than this many pulses can no longer be resolved.
const TRUTH_DEPTH: usize = 256;

/// How long to wait for the Master to report its units.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long each simulated calibration listens to the triangle.
const CALIBRATION_TIME: Duration = Duration::from_millis(500);

enum Signal {
    Run(bool),
    Noise(f64),
    Stop,
}

/// Recent pulses per transmitter, oldest first, as `(sequence, position)`.
type Truth = Arc<Mutex<HashMap<UnitAddress, VecDeque<(u32, Point3)>>>>;
type States = Arc<Mutex<HashMap<UnitAddress, TransmitterState>>>;

/// The simulated Master.
pub struct DummyMaster {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    queue: EventQueue,
    status: MasterStatus,
    present: bool,
    receivers: Vec<ReceiverPlacement>,
    transmitters: Vec<UnitAddress>,
    states: States,
    truth: Truth,
}

/// Configures a [`DummyMaster`] before its thread starts.
#[derive(Debug, Clone)]
pub struct DummyMasterBuilder {
    num_transmitters: usize,
    receiver_groups: usize,
    range: f64,
    noise: f64,
    dropout: f64,
    rate: f64,
    present: bool,
}

impl Default for DummyMasterBuilder {
    fn default() -> Self {
        Self {
            num_transmitters: 2,
            receiver_groups: 1,
            range: 1500.0,
            noise: 5.0,
            dropout: 0.0,
            rate: 20.0,
            present: true,
        }
    }
}

impl DummyMasterBuilder {
    /// Number of moving transmitters, on top of the three triangle ones.
    pub fn num_transmitters(self, num_transmitters: usize) -> Self {
        Self {
            num_transmitters,
            ..self
        }
    }

    /// Number of separate four-receiver groups, laid out next to each other
    /// along the x axis. Each group is one scenario.
    pub fn receiver_groups(self, receiver_groups: usize) -> Self {
        Self {
            receiver_groups: receiver_groups.max(1),
            ..self
        }
    }

    /// Radius of the transmitters' circles, in millimetres.
    pub fn range(self, range: f64) -> Self {
        Self { range, ..self }
    }

    /// Maximum distance error, in millimetres.
    pub fn noise(self, noise: f64) -> Self {
        Self { noise, ..self }
    }

    /// Probability that a receiver misses a pulse.
    pub fn dropout(self, dropout: f64) -> Self {
        Self {
            dropout: dropout.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Pulses per second per transmitter.
    pub fn rate(self, rate: f64) -> Self {
        Self { rate, ..self }
    }

    /// `false` simulates a Master that is not plugged in.
    pub fn present(self, present: bool) -> Self {
        Self { present, ..self }
    }

    /// Starts the simulation thread. It stays quiet until connected.
    pub fn build(self, queue: EventQueue) -> DummyMaster {
        let receivers = layout_receivers(self.receiver_groups);
        let transmitters: Vec<UnitAddress> = (0..3)
            .map(|i| UnitAddress(TRIANGLE_BASE_ADDRESS + i))
            .chain((0..self.num_transmitters).map(|i| UnitAddress(i as u16 + 1000)))
            .collect();

        let (tx, rx) = mpsc::channel::<Signal>();
        let states: States = Arc::new(Mutex::new(HashMap::new()));
        let truth: Truth = Arc::new(Mutex::new(HashMap::new()));

        let sim = Simulation {
            receivers: receivers.clone(),
            transmitters: transmitters.clone(),
            range: self.range,
            noise: self.noise,
            dropout: self.dropout,
            states: Arc::clone(&states),
            truth: Arc::clone(&truth),
            queue: queue.clone(),
        };
        let period = Duration::from_secs_f64(1.0 / self.rate.max(0.1));

        let handle = thread::spawn(move || sim.run(rx, period));

        DummyMaster {
            handle: Some(handle),
            tx,
            queue,
            status: MasterStatus::Offline,
            present: self.present,
            receivers,
            transmitters,
            states,
            truth,
        }
    }
}

impl DummyMaster {
    /// A builder with the default simulation settings.
    pub fn builder() -> DummyMasterBuilder {
        DummyMasterBuilder::default()
    }

    /// A resolver that knows where the simulation put each transmitter.
    pub fn calculator(&self) -> DummyCalculator {
        DummyCalculator {
            truth: Arc::clone(&self.truth),
        }
    }

    /// The scenario a perfect calibration of receiver group `group` would
    /// produce.
    pub fn calibrated_scenario(&self, group: usize) -> Scenario {
        let receivers = self
            .receivers
            .iter()
            .skip(group * 4)
            .take(4)
            .cloned()
            .collect();
        Scenario::new(
            format!("simulated group {}", group),
            receivers,
            [TRIANGLE_LEG, TRIANGLE_LEG, TRIANGLE_LEG * 2f64.sqrt()],
        )
    }

    /// A calibration that comes up with [`DummyMaster::calibrated_scenario`]
    /// once every triangle transmitter has been heard by three receivers of
    /// the group.
    pub fn calibration_session(&self, group: usize) -> RecordingSession {
        let scenario = self.calibrated_scenario(group);
        RecordingSession::new(move |measurements: &[Measurement]| {
            let heard = |address: UnitAddress| {
                measurements.iter().any(|m| {
                    m.tx_address == address
                        && m.rx_measurements
                            .iter()
                            .filter(|rx| rx.is_valid() && scenario.has_receiver(rx.receiver))
                            .count()
                            >= 3
                })
            };
            let complete = (0..3).all(|i| heard(UnitAddress(TRIANGLE_BASE_ADDRESS + i)));
            if !complete {
                warn!("dummy master: calibration did not hear the whole triangle");
            }
            complete.then_some(scenario)
        })
    }

    /// Where every active transmitter was at its last pulse.
    pub fn true_positions(&self) -> Vec<Point3> {
        self.truth
            .lock()
            .unwrap()
            .values()
            .filter_map(|pulses| pulses.back().map(|(_, p)| *p))
            .collect()
    }

    /// Changes the noise while running.
    pub fn set_noise(&self, noise: f64) {
        self.signal(Signal::Noise(noise));
    }

    fn signal(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            warn!("dummy master: simulation thread has already stopped");
        }
    }

    /// Stops the simulation thread for good.
    pub fn stop(&mut self) {
        if let Some(thread) = self.handle.take() {
            self.signal(Signal::Stop);
            if thread.join().is_err() {
                warn!("dummy master: simulation thread panicked");
            }
        }
    }

    fn set_status(&mut self, status: MasterStatus) {
        self.status = status;
        self.queue.push(MasterEvent::StatusChanged(status));
    }
}

impl Master for DummyMaster {
    fn begin_connect(&mut self) -> bool {
        if !self.present {
            return false;
        }
        self.set_status(MasterStatus::Connecting);
        self.set_status(MasterStatus::Connected);
        self.signal(Signal::Run(true));
        true
    }

    fn request_info(&mut self) {
        self.queue.push(MasterEvent::InfoReceived {
            version: "2.0-sim".to_owned(),
            serial: "SIM-0001".to_owned(),
        });
    }

    fn request_units(&mut self) {
        for r in &self.receivers {
            self.queue.push(MasterEvent::NewReceiverConnected(r.address));
        }
        for t in &self.transmitters {
            self.queue.push(MasterEvent::NewTransmitterConnected(*t));
        }
    }

    fn request_restart(&mut self) {
        info!("dummy master: restarting");
        self.signal(Signal::Run(false));
        self.states.lock().unwrap().clear();
        self.truth.lock().unwrap().clear();
        self.set_status(MasterStatus::Connecting);
        self.set_status(MasterStatus::Connected);
        self.signal(Signal::Run(true));
    }

    fn set_transmitter_state(
        &mut self,
        address: UnitAddress,
        state: TransmitterState,
        level: UltrasonicLevel,
    ) {
        debug!("dummy master: {} -> {:?} ({:?})", address, state, level);
        self.states.lock().unwrap().insert(address, state);
    }

    fn setup(&mut self, setup: MasterSetup) {
        debug!("dummy master: setup {:?}", setup);
    }

    fn close(&mut self) {
        self.stop();
        self.status = MasterStatus::Offline;
    }

    fn status(&self) -> MasterStatus {
        self.status
    }

    fn current_port_name(&self) -> String {
        "SIM0".to_owned()
    }
}

impl Drop for DummyMaster {
    fn drop(&mut self) {
        if let Some(thread) = self.handle.take() {
            let _ = self.tx.send(Signal::Stop);
            let _ = thread.join();
        }
    }
}

/// Resolves measurements produced by a [`DummyMaster`] to the positions the
/// simulation used, provided a scenario has at least three receivers that
/// heard the pulse.
#[derive(Clone)]
pub struct DummyCalculator {
    truth: Truth,
}

impl PositionCalculator for DummyCalculator {
    fn try_calculate_position(
        &self,
        measurement: &Measurement,
        scenarios: &[Scenario],
    ) -> Option<CalculatedPosition> {
        let scenario = scenarios.iter().find(|s| {
            measurement
                .rx_measurements
                .iter()
                .filter(|rx| rx.is_valid() && s.has_receiver(rx.receiver))
                .count()
                >= 3
        })?;

        let truth = self.truth.lock().unwrap();
        let (_, position) = truth
            .get(&measurement.tx_address)?
            .iter()
            .rev()
            .find(|(sequence, _)| *sequence == measurement.sequence)?;

        Some(CalculatedPosition {
            position: *position,
            tx_address: measurement.tx_address,
            scenario: Some(scenario.id),
        })
    }
}

/// Calibrates every receiver group of a connected [`DummyMaster`] through
/// `dispatcher`, one after the other, the way a user would carry the
/// triangle from group to group.
pub fn calibrate(
    dispatcher: &mut Dispatcher<DummyMaster>,
    queue: &EventQueue,
    groups: usize,
) -> Result<Vec<ScenarioId>, DispatchError> {
    let ready = dispatcher.drain_until(queue, READY_TIMEOUT, |d| {
        d.calibrator_triangle_detected() && d.receivers().len() >= 3
    });
    if !ready {
        return Err(DispatchError::NotReadyForCalibration);
    }

    let mut ids = Vec::new();
    for group in 0..groups {
        let session = dispatcher.master().calibration_session(group);
        dispatcher.begin_calibration(Box::new(session))?;
        dispatcher.drain_until(queue, CALIBRATION_TIME, |_| false);
        if let Some(id) = dispatcher.finish_calibration()? {
            ids.push(id);
        }
    }
    Ok(ids)
}

struct Simulation {
    receivers: Vec<ReceiverPlacement>,
    transmitters: Vec<UnitAddress>,
    range: f64,
    noise: f64,
    dropout: f64,
    states: States,
    truth: Truth,
    queue: EventQueue,
}

impl Simulation {
    fn run(mut self, rx: mpsc::Receiver<Signal>, period: Duration) {
        let mut rng = thread_rng();
        let mut running = false;
        let mut sequence: u32 = 0;
        let mut angle: f64 = 0.0;

        loop {
            while let Ok(received) = rx.try_recv() {
                match received {
                    Signal::Run(run) => running = run,
                    Signal::Noise(noise) => self.noise = noise,
                    Signal::Stop => return,
                }
            }

            if running {
                angle = (angle + 2.0 * PI * period.as_secs_f64() / 10.0) % (2.0 * PI);
                for (i, &address) in self.transmitters.iter().enumerate() {
                    let active = matches!(
                        self.states.lock().unwrap().get(&address),
                        Some(TransmitterState::ActiveHigh)
                    );
                    if !active {
                        continue;
                    }
                    let position = self.position_of(i, angle);
                    let measurement = self.measure(&mut rng, address, sequence, position);
                    {
                        let mut truth = self.truth.lock().unwrap();
                        let pulses = truth.entry(address).or_default();
                        pulses.push_back((sequence, position));
                        if pulses.len() > TRUTH_DEPTH {
                            pulses.pop_front();
                        }
                    }
                    self.queue.push(MasterEvent::MeasurementReceived(measurement));
                    sequence = sequence.wrapping_add(1);
                }
            }

            spin_sleep::sleep(period);
        }
    }

    /// Triangle transmitters sit still on the floor at the triangle corners,
    /// the others circle around the middle of the first receiver group.
    fn position_of(&self, index: usize, angle: f64) -> Point3 {
        match index {
            0 => Point3::new(0.0, 0.0, 0.0),
            1 => Point3::new(TRIANGLE_LEG, 0.0, 0.0),
            2 => Point3::new(TRIANGLE_LEG, TRIANGLE_LEG, 0.0),
            n => {
                let phase = angle + (n - 3) as f64 * 2.0 * PI / 5.0;
                Point3::new(
                    GROUP_SIDE / 2.0 + phase.cos() * self.range,
                    GROUP_SIDE / 2.0 + phase.sin() * self.range,
                    1000.0,
                )
            }
        }
    }

    fn measure(
        &self,
        rng: &mut impl Rng,
        address: UnitAddress,
        sequence: u32,
        position: Point3,
    ) -> Measurement {
        let rx_measurements = self
            .receivers
            .iter()
            .map(|r| {
                let distance = r.position.distance(&position);
                let heard = distance <= HEARING_RANGE && rng.gen::<f64>() >= self.dropout;
                let distance_mm = if heard {
                    (distance + rng.gen_range(-self.noise..=self.noise)).max(1.0)
                } else {
                    0.0
                };
                RxMeasurement {
                    receiver: r.address,
                    distance_mm,
                }
            })
            .collect();

        Measurement {
            tx_address: address,
            rssi: rng.gen_range(20..=90),
            sequence,
            rx_measurements,
        }
    }
}

fn layout_receivers(groups: usize) -> Vec<ReceiverPlacement> {
    let corners = [(0.0, 0.0), (GROUP_SIDE, 0.0), (GROUP_SIDE, GROUP_SIDE), (0.0, GROUP_SIDE)];
    (0..groups)
        .flat_map(|g| {
            corners.iter().enumerate().map(move |(i, &(x, y))| ReceiverPlacement {
                address: UnitAddress((g * 4 + i + 1) as u16),
                position: Point3::new(x + g as f64 * GROUP_SIDE * 0.75, y, RECEIVER_HEIGHT),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn receivers_are_laid_out_per_group() {
        let receivers = layout_receivers(2);
        assert_eq!(receivers.len(), 8);
        assert_eq!(receivers[0].address, UnitAddress(1));
        assert_eq!(receivers[7].address, UnitAddress(8));
        assert_eq!(receivers[4].position.x, 3000.0);
    }

    #[test]
    fn absent_master_does_not_connect() {
        let queue = EventQueue::new();
        let mut master = DummyMaster::builder().present(false).build(queue.clone());
        assert!(!master.begin_connect());
        assert!(queue.is_empty());
        master.close();
    }

    #[test]
    fn announces_units_on_request() {
        let queue = EventQueue::new();
        let mut master = DummyMaster::builder()
            .num_transmitters(2)
            .receiver_groups(1)
            .build(queue.clone());
        master.request_units();
        let events: Vec<_> = queue.clone().collect();
        assert_eq!(events.len(), 4 + 3 + 2);
        assert!(events.contains(&MasterEvent::NewTransmitterConnected(UnitAddress(
            TRIANGLE_BASE_ADDRESS
        ))));
        master.close();
    }

    #[test]
    fn only_active_transmitters_pulse_and_resolve() {
        let queue = EventQueue::new();
        let mut master = DummyMaster::builder()
            .num_transmitters(1)
            .noise(0.0)
            .rate(200.0)
            .build(queue.clone());
        let calc = master.calculator();
        let scenario = master.calibrated_scenario(0);

        assert!(master.begin_connect());
        master.set_transmitter_state(UnitAddress(1000), TransmitterState::ActiveHigh, UltrasonicLevel::High);

        let deadline = Instant::now() + Duration::from_secs(5);
        while master.true_positions().is_empty() {
            assert!(Instant::now() < deadline, "no measurement arrived");
            thread::sleep(Duration::from_millis(5));
        }
        master.close();

        // The thread is gone, so the last pulse in the queue is also the
        // last one the calculator saw
        let measurement = queue
            .clone()
            .filter_map(|e| match e {
                MasterEvent::MeasurementReceived(m) => Some(m),
                _ => None,
            })
            .last()
            .unwrap();

        assert_eq!(measurement.tx_address, UnitAddress(1000));
        assert_eq!(measurement.valid_distance_count(), 4);

        let pos = calc
            .try_calculate_position(&measurement, std::slice::from_ref(&scenario))
            .unwrap();
        assert_eq!(pos.tx_address, UnitAddress(1000));
        assert_eq!(pos.position.z, 1000.0);

        // A scenario without those receivers cannot resolve it
        let empty = Scenario::new("empty", vec![], [1.0, 1.0, 1.0]);
        assert!(calc.try_calculate_position(&measurement, &[empty]).is_none());
    }

    #[test]
    fn pulses_resolve_after_later_pulses_arrive() {
        let queue = EventQueue::new();
        let mut master = DummyMaster::builder()
            .num_transmitters(1)
            .noise(0.0)
            .rate(200.0)
            .build(queue.clone());
        let calc = master.calculator();
        let scenario = master.calibrated_scenario(0);

        assert!(master.begin_connect());
        master.set_transmitter_state(UnitAddress(1000), TransmitterState::ActiveHigh, UltrasonicLevel::High);

        // Nothing drains the queue while dozens of pulses go out
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.len() < 40 {
            assert!(Instant::now() < deadline, "not enough pulses arrived");
            thread::sleep(Duration::from_millis(5));
        }
        master.close();

        let measurements: Vec<Measurement> = queue
            .filter_map(|e| match e {
                MasterEvent::MeasurementReceived(m) => Some(m),
                _ => None,
            })
            .collect();
        assert!(measurements.len() > 10);
        for measurement in &measurements {
            let pos = calc.try_calculate_position(measurement, std::slice::from_ref(&scenario));
            assert!(pos.is_some(), "pulse {} did not resolve", measurement.sequence);
        }
    }

    #[test]
    fn calibration_needs_the_whole_triangle() {
        use crate::calibrator_triangle::CalibrationSession;

        let master = DummyMaster::builder().build(EventQueue::new());
        let pulse = |tx: u16| Measurement {
            tx_address: UnitAddress(tx),
            rssi: 40,
            sequence: 0,
            rx_measurements: (1..=3)
                .map(|r| RxMeasurement {
                    receiver: UnitAddress(r),
                    distance_mm: 1500.0,
                })
                .collect(),
        };

        let mut session = Box::new(master.calibration_session(0));
        session.add_measurement(&pulse(TRIANGLE_BASE_ADDRESS));
        session.add_measurement(&pulse(TRIANGLE_BASE_ADDRESS + 1));
        assert!(session.finish().is_none());

        let mut session = Box::new(master.calibration_session(0));
        for i in 0..3 {
            session.add_measurement(&pulse(TRIANGLE_BASE_ADDRESS + i));
        }
        let scenario = session.finish().unwrap();
        assert_eq!(scenario.receivers.len(), 4);
        assert_eq!(scenario, master.calibrated_scenario(0));
    }

    #[test]
    fn calibrates_every_group() {
        use crate::calibrator_triangle::ReservedRangeDetector;

        let queue = EventQueue::new();
        let master = DummyMaster::builder()
            .receiver_groups(2)
            .rate(100.0)
            .build(queue.clone());
        let calc = master.calculator();
        let mut dispatcher = Dispatcher::new(master, calc, ReservedRangeDetector::default());
        dispatcher.connect().unwrap();

        let ids = calibrate(&mut dispatcher, &queue, 2).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(dispatcher.scenarios().len(), 2);
        assert!(!dispatcher.is_calibrating());

        assert!(dispatcher.drain_until(&queue, Duration::from_secs(5), |d| !d.history().is_empty()));
        dispatcher.close();
    }
}
