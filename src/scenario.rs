//! Calibrated scenarios: where the receivers are, how big the calibrator
//! triangle was, and how the scenario is placed relative to the others
//! when merging.

use crate::master::UnitAddress;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A point in millimetres.
#[derive(Debug, Default, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Point3 {
    /// Millimetres along the triangle's X leg.
    pub x: f64,
    /// Millimetres along the triangle's Y leg.
    pub y: f64,
    /// Millimetres up from the floor.
    pub z: f64,
}

impl Point3 {
    /// A point from its coordinates, in millimetres.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

impl Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Stable identifier of a scenario within a [`ScenarioList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioId(pub u32);

/// A receiver and where the calibration put it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverPlacement {
    /// The receiver.
    pub address: UnitAddress,
    /// Where it hangs, in scenario coordinates.
    pub position: Point3,
}

/// Rigid placement of a scenario in the shared frame, edited while merging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTransform {
    /// Offset in millimetres.
    pub translation: Point3,
    /// Rotation about the z axis, in radians.
    pub yaw: f64,
}

impl ScenarioTransform {
    /// Moves a point from scenario coordinates into the shared frame.
    pub fn apply(&self, p: Point3) -> Point3 {
        let (sin, cos) = self.yaw.sin_cos();
        Point3 {
            x: p.x * cos - p.y * sin + self.translation.x,
            y: p.x * sin + p.y * cos + self.translation.y,
            z: p.z + self.translation.z,
        }
    }
}

/// Display colour of a scenario. Derived from the list index, never stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DisplayColor {
    /// First scenario.
    Red,
    /// Second scenario.
    Blue,
    /// Third scenario.
    Green,
    /// Fourth scenario.
    Black,
    /// Fifth scenario.
    Orange,
    /// Sixth scenario.
    SlateGray,
    /// Everything after the sixth, and scenarios not in a list.
    #[default]
    White,
}

impl DisplayColor {
    /// The colour a scenario gets at position `index` of the list.
    pub fn for_index(index: usize) -> Self {
        match index {
            0 => DisplayColor::Red,
            1 => DisplayColor::Blue,
            2 => DisplayColor::Green,
            3 => DisplayColor::Black,
            4 => DisplayColor::Orange,
            5 => DisplayColor::SlateGray,
            _ => DisplayColor::White,
        }
    }
}

/// A named calibration result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Assigned by [`ScenarioList::push`].
    pub id: ScenarioId,
    /// Shown to the user.
    pub name: String,
    /// Where each receiver of the scenario hangs.
    pub receivers: Vec<ReceiverPlacement>,
    /// Triangle side from the origin corner to the X corner.
    pub size_00_to_x0: f64,
    /// Triangle side from the X corner to the XY corner.
    pub size_x0_to_xy: f64,
    /// Triangle side from the XY corner back to the origin.
    pub size_xy_to_00: f64,
    #[serde(default)]
    /// Placement in the shared frame, edited while merging.
    pub transform: ScenarioTransform,
    #[serde(skip)]
    /// Follows the list index, see [`DisplayColor::for_index`].
    pub display_color: DisplayColor,
}

impl Scenario {
    /// A scenario that has not been added to a list yet.
    pub fn new(name: impl Into<String>, receivers: Vec<ReceiverPlacement>, sides: [f64; 3]) -> Self {
        Self {
            id: ScenarioId(0),
            name: name.into(),
            receivers,
            size_00_to_x0: sides[0],
            size_x0_to_xy: sides[1],
            size_xy_to_00: sides[2],
            transform: ScenarioTransform::default(),
            display_color: DisplayColor::default(),
        }
    }

    /// Where `address` sits, if this scenario knows that receiver.
    pub fn receiver_position(&self, address: UnitAddress) -> Option<Point3> {
        self.receivers
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.position)
    }

    /// True if the receiver was part of this calibration.
    pub fn has_receiver(&self, address: UnitAddress) -> bool {
        self.receiver_position(address).is_some()
    }
}

/// Ordered scenarios. Colours follow the index and are recomputed for every
/// entry after each mutation, so a colour does not identify a scenario.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScenarioList {
    scenarios: Vec<Scenario>,
}

impl ScenarioList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from already identified scenarios, e.g. loaded from disk.
    pub fn from_scenarios(scenarios: Vec<Scenario>) -> Self {
        let mut list = Self { scenarios };
        list.recolor();
        list
    }

    /// Appends a scenario, giving it a fresh id. Returns that id.
    pub fn push(&mut self, mut scenario: Scenario) -> ScenarioId {
        let id = self.next_id();
        scenario.id = id;
        self.scenarios.push(scenario);
        self.recolor();
        id
    }

    /// One past the largest id in use. If that would overflow, the lowest
    /// id nobody uses yet.
    fn next_id(&self) -> ScenarioId {
        let largest = self.scenarios.iter().map(|s| s.id.0).max().unwrap_or(0);
        let next = largest.checked_add(1).unwrap_or_else(|| {
            (1..=u32::MAX)
                .find(|candidate| self.scenarios.iter().all(|s| s.id.0 != *candidate))
                .unwrap_or(largest)
        });
        ScenarioId(next)
    }

    /// Removes the scenario with `id`, if present.
    pub fn remove(&mut self, id: ScenarioId) -> Option<Scenario> {
        let index = self.scenarios.iter().position(|s| s.id == id)?;
        let removed = self.scenarios.remove(index);
        self.recolor();
        Some(removed)
    }

    /// The scenario with `id`.
    pub fn get(&self, id: ScenarioId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// The scenario with `id`, for editing.
    pub fn get_mut(&mut self, id: ScenarioId) -> Option<&mut Scenario> {
        self.scenarios.iter_mut().find(|s| s.id == id)
    }

    /// Scenarios in list order.
    pub fn as_slice(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Iterates in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Scenario> {
        self.scenarios.iter()
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// True if nothing has been calibrated yet.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    fn recolor(&mut self) {
        for (i, scenario) in self.scenarios.iter_mut().enumerate() {
            scenario.display_color = DisplayColor::for_index(i);
        }
    }
}
