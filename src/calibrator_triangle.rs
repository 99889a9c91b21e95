//! The calibrator triangle: three transmitters at known relative positions
//! used to calibrate a scenario, and the session that collects measurements
//! while a calibration is running.

use crate::master::{Measurement, UnitAddress};
use crate::scenario::Scenario;
use std::ops::RangeInclusive;

/// The three transmitters of a calibrator triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibratorTriangle {
    /// Origin corner, X corner, XY corner.
    pub transmitter_addresses: [UnitAddress; 3],
}

/// Knows which transmitters belong to calibrator triangles.
pub trait TriangleDetector {
    /// True if `address` is reserved for a calibrator triangle transmitter.
    fn is_triangle_address(&self, address: UnitAddress) -> bool;

    /// Looks for a complete triangle among `addresses`.
    fn try_find(&self, addresses: &[UnitAddress]) -> Option<CalibratorTriangle>;
}

/// Triangle transmitters are shipped with addresses from a reserved range.
/// The three lowest reserved addresses present form the triangle.
#[derive(Debug, Clone)]
pub struct ReservedRangeDetector {
    range: RangeInclusive<u16>,
}

impl ReservedRangeDetector {
    /// Treats every address in `range` as a triangle transmitter.
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self { range }
    }
}

impl Default for ReservedRangeDetector {
    fn default() -> Self {
        Self::new(0xFF00..=0xFFFF)
    }
}

impl TriangleDetector for ReservedRangeDetector {
    fn is_triangle_address(&self, address: UnitAddress) -> bool {
        self.range.contains(&address.0)
    }

    fn try_find(&self, addresses: &[UnitAddress]) -> Option<CalibratorTriangle> {
        let mut reserved: Vec<UnitAddress> = addresses
            .iter()
            .copied()
            .filter(|a| self.is_triangle_address(*a))
            .collect();
        reserved.sort();
        reserved.dedup();

        match reserved[..] {
            [a, b, c, ..] => Some(CalibratorTriangle {
                transmitter_addresses: [a, b, c],
            }),
            _ => None,
        }
    }
}

/// A calibration in progress. While one is active every raw measurement goes
/// here instead of through position resolution.
pub trait CalibrationSession {
    /// Feed one raw measurement.
    fn add_measurement(&mut self, measurement: &Measurement);

    /// Ends the session. `None` means the user cancelled or there was not
    /// enough data.
    fn finish(self: Box<Self>) -> Option<Scenario>;
}

type ScenarioBuilder = Box<dyn FnOnce(&[Measurement]) -> Option<Scenario>>;

/// Stores every measurement it gets, and hands them to a builder when done.
pub struct RecordingSession {
    measurements: Vec<Measurement>,
    builder: ScenarioBuilder,
}

impl RecordingSession {
    /// `builder` turns the recorded measurements into a scenario.
    pub fn new<F>(builder: F) -> Self
    where
        F: FnOnce(&[Measurement]) -> Option<Scenario> + 'static,
    {
        Self {
            measurements: Vec::new(),
            builder: Box::new(builder),
        }
    }

    /// Everything recorded so far.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }
}

impl CalibrationSession for RecordingSession {
    fn add_measurement(&mut self, measurement: &Measurement) {
        self.measurements.push(measurement.clone());
    }

    fn finish(self: Box<Self>) -> Option<Scenario> {
        let RecordingSession {
            measurements,
            builder,
        } = *self;
        builder(&measurements)
    }
}
