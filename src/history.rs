//! The bounded FIFO of recently calculated positions, and the plain-data
//! views a display builds from it.

use crate::master::UnitAddress;
use crate::position_calculator::CalculatedPosition;
use crate::scenario::{Point3, ScenarioId};

use std::collections::VecDeque;

/// How many positions to keep while merging.
pub const MERGE_HISTORY_SIZE: usize = 100;
/// How many positions to keep otherwise.
pub const HISTORY_SIZE: usize = 250;

/// Half the side of the smallest area a display should show, in millimetres.
const MIN_HALF_SPAN: f64 = 2000.0;

/// History capacity for the given mode.
pub fn capacity(is_merging: bool) -> usize {
    if is_merging {
        MERGE_HISTORY_SIZE
    } else {
        HISTORY_SIZE
    }
}

/// Number of oldest entries that have to go so that `len` fits in `capacity`.
pub fn excess(len: usize, capacity: usize) -> usize {
    len.saturating_sub(capacity)
}

/// Positions grouped for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Track {
    /// All positions that a scenario produced, oldest first.
    Scenario {
        /// Scenario that produced these positions.
        scenario: Option<ScenarioId>,
        /// Positions, oldest first.
        points: Vec<Point3>,
    },
    /// All positions of a single transmitter, oldest first.
    Transmitter {
        /// The triangle transmitter that pulsed.
        tx_address: UnitAddress,
        /// Positions, oldest first.
        points: Vec<Point3>,
    },
}

impl Track {
    /// Positions of this track, oldest first.
    pub fn points(&self) -> &[Point3] {
        match self {
            Track::Scenario { points, .. } | Track::Transmitter { points, .. } => points,
        }
    }
}

/// X/Y bounding box, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Left edge.
    pub min_x: f64,
    /// Right edge.
    pub max_x: f64,
    /// Bottom edge.
    pub min_y: f64,
    /// Top edge.
    pub max_y: f64,
}

/// FIFO of [`CalculatedPosition`]s, oldest at the front.
#[derive(Debug, Default, Clone)]
pub struct PositionHistory {
    entries: VecDeque<CalculatedPosition>,
}

impl PositionHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the back. Never evicts; see [`PositionHistory::evict`].
    pub fn push(&mut self, position: CalculatedPosition) {
        self.entries.push_back(position);
    }

    /// Drops the `count` oldest entries.
    pub fn evict(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
    }

    /// Drops oldest entries until at most `capacity` remain.
    pub fn trim_to(&mut self, capacity: usize) {
        self.evict(excess(self.entries.len(), capacity));
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no positions are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &CalculatedPosition> {
        self.entries.iter()
    }

    /// The groups a display draws.
    ///
    /// Outside merge mode the calibrator triangle transmitters are left out
    /// and positions are grouped by the scenario that produced them. While
    /// merging only the triangle transmitters are interesting, grouped per
    /// transmitter, so the scenarios can be lined up against each other.
    /// `place` gives the point drawn for each entry.
    pub fn tracks<F, P>(&self, is_merging: bool, is_triangle_address: F, place: P) -> Vec<Track>
    where
        F: Fn(UnitAddress) -> bool,
        P: Fn(&CalculatedPosition) -> Point3,
    {
        let mut tracks: Vec<Track> = Vec::new();

        for entry in self.iter() {
            let on_triangle = is_triangle_address(entry.tx_address);
            if on_triangle != is_merging {
                continue;
            }

            let existing = tracks.iter_mut().find(|t| match t {
                Track::Scenario { scenario, .. } => !is_merging && *scenario == entry.scenario,
                Track::Transmitter { tx_address, .. } => {
                    is_merging && *tx_address == entry.tx_address
                }
            });

            match existing {
                Some(Track::Scenario { points, .. }) | Some(Track::Transmitter { points, .. }) => {
                    points.push(place(entry))
                }
                None if is_merging => tracks.push(Track::Transmitter {
                    tx_address: entry.tx_address,
                    points: vec![place(entry)],
                }),
                None => tracks.push(Track::Scenario {
                    scenario: entry.scenario,
                    points: vec![place(entry)],
                }),
            }
        }

        tracks
    }

    /// The area covering every stored position as `place` puts it, never
    /// smaller than 4x4 m around the origin.
    pub fn bounds<P>(&self, place: P) -> Bounds
    where
        P: Fn(&CalculatedPosition) -> Point3,
    {
        self.iter().map(place).fold(
            Bounds {
                min_x: -MIN_HALF_SPAN,
                max_x: MIN_HALF_SPAN,
                min_y: -MIN_HALF_SPAN,
                max_y: MIN_HALF_SPAN,
            },
            |b, p| Bounds {
                min_x: b.min_x.min(p.x),
                max_x: b.max_x.max(p.x),
                min_y: b.min_y.min(p.y),
                max_y: b.max_y.max(p.y),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(tx: u16, scenario: u32, x: f64) -> CalculatedPosition {
        CalculatedPosition {
            position: Point3::new(x, 0.0, 0.0),
            tx_address: UnitAddress(tx),
            scenario: Some(ScenarioId(scenario)),
        }
    }

    #[test]
    fn trim_keeps_the_newest() {
        let mut history = PositionHistory::new();
        for i in 0..10 {
            history.push(at(1, 1, i as f64));
        }
        history.trim_to(4);
        let xs: Vec<f64> = history.iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![6.0, 7.0, 8.0, 9.0]);

        // Trimming below the current length is a no-op
        history.trim_to(100);
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn capacity_depends_on_mode() {
        assert_eq!(capacity(true), 100);
        assert_eq!(capacity(false), 250);
        assert_eq!(excess(251, 250), 1);
        assert_eq!(excess(3, 250), 0);
    }

    #[test]
    fn tracks_split_by_mode() {
        let triangle = |a: UnitAddress| a.0 >= 100;
        let mut history = PositionHistory::new();
        history.push(at(1, 1, 0.0));
        history.push(at(100, 1, 1.0));
        history.push(at(2, 2, 2.0));
        history.push(at(1, 1, 3.0));
        history.push(at(101, 2, 4.0));
        history.push(at(100, 2, 5.0));

        let single = history.tracks(false, triangle, |e| e.position);
        assert_eq!(single.len(), 2);
        assert_eq!(
            single[0],
            Track::Scenario {
                scenario: Some(ScenarioId(1)),
                points: vec![Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 0.0, 0.0)],
            }
        );

        let merged = history.tracks(true, triangle, |e| e.position);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0],
            Track::Transmitter {
                tx_address: UnitAddress(100),
                points: vec![Point3::new(1.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)],
            }
        );
        assert_eq!(merged[1].points().len(), 1);
    }

    #[test]
    fn bounds_grow_past_the_default_area() {
        let mut history = PositionHistory::new();
        assert_eq!(history.bounds(|e| e.position).max_x, 2000.0);

        history.push(at(1, 1, 3500.0));
        history.push(at(1, 1, -4100.0));
        let b = history.bounds(|e| e.position);
        assert_eq!(b.max_x, 3500.0);
        assert_eq!(b.min_x, -4100.0);
        assert_eq!(b.min_y, -2000.0);
    }

    #[test]
    fn bounds_follow_the_placed_points() {
        let mut history = PositionHistory::new();
        history.push(at(1, 1, 1000.0));
        let shifted = history.bounds(|e| Point3::new(e.position.x + 5000.0, 0.0, 0.0));
        assert_eq!(shifted.max_x, 6000.0);
        assert_eq!(shifted.min_x, -2000.0);
    }
}
