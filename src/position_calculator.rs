//! The seam between measurements and whatever solver turns them into positions.

use crate::master::{Measurement, UnitAddress};
use crate::scenario::{Point3, Scenario, ScenarioId};

/// A resolved position of one transmitter pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedPosition {
    /// Position in millimetres, in the frame of the producing scenario.
    pub position: Point3,
    /// The transmitter that pulsed.
    pub tx_address: UnitAddress,
    /// The scenario the position was resolved in, if the resolver says so.
    pub scenario: Option<ScenarioId>,
}

/// `PositionCalculator`
///
/// Turns distances into a position. The solver lives outside this crate,
/// implementations of this trait wrap it.
pub trait PositionCalculator {
    /// Resolve `measurement` using whichever of `scenarios` fits best.
    /// `scenarios` has one element when resolving against a single scenario.
    fn try_calculate_position(
        &self,
        measurement: &Measurement,
        scenarios: &[Scenario],
    ) -> Option<CalculatedPosition>;
}

impl<F> PositionCalculator for F
where
    F: Fn(&Measurement, &[Scenario]) -> Option<CalculatedPosition>,
{
    fn try_calculate_position(
        &self,
        measurement: &Measurement,
        scenarios: &[Scenario],
    ) -> Option<CalculatedPosition> {
        self(measurement, scenarios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_calculators() {
        let calc = |m: &Measurement, s: &[Scenario]| -> Option<CalculatedPosition> {
            s.first().map(|scenario| CalculatedPosition {
                position: Point3::new(1.0, 2.0, 3.0),
                tx_address: m.tx_address,
                scenario: Some(scenario.id),
            })
        };
        let m = Measurement {
            tx_address: UnitAddress(9),
            rssi: 10,
            sequence: 1,
            rx_measurements: vec![],
        };

        assert_eq!(calc.try_calculate_position(&m, &[]), None);

        let scenario = Scenario::new("s", vec![], [1.0, 1.0, 1.0]);
        let pos = calc.try_calculate_position(&m, &[scenario]).unwrap();
        assert_eq!(pos.tx_address, UnitAddress(9));
        assert_eq!(pos.scenario, Some(ScenarioId(0)));
    }
}
