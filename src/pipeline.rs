//! The measurement pipeline as pure functions.
//!
//! Nothing in here mutates state. Each function looks at a
//! [`PipelineContext`] and a measurement or address and returns what should
//! happen, as [`Effect`]s or plain values. The
//! [`Dispatcher`](crate::dispatcher::Dispatcher) applies them in order.

use crate::calibrator_triangle::TriangleDetector;
use crate::external::ErrorCode;
use crate::history;
use crate::master::{Measurement, TransmitterState, UltrasonicLevel, UnitAddress};
use crate::position_calculator::{CalculatedPosition, PositionCalculator};
use crate::scenario::Scenario;

/// Receivers that must hear a pulse for it to be resolvable.
pub const MIN_ULTRASOUND_RECEIVERS: usize = 3;

/// Ultrasonic level every transmitter is driven at.
pub const TRANSMITTER_LEVEL: UltrasonicLevel = UltrasonicLevel::High;

/// Read-only view of the state a pipeline pass depends on.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    /// Every calibrated scenario, in list order.
    pub scenarios: &'a [Scenario],
    /// Whether merge mode is on.
    pub is_merging: bool,
    /// Current history length, before this pass.
    pub history_len: usize,
}

/// Something a pipeline pass wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send an error code to every external connection.
    EmitError {
        /// What went wrong.
        code: ErrorCode,
        /// The transmitter whose pulse it was.
        tx_address: UnitAddress,
    },
    /// Append to history and send to every external connection.
    EmitPosition(CalculatedPosition),
    /// Drop this many of the oldest history entries.
    Evict(usize),
}

/// The state a transmitter should be in. Triangle transmitters only take
/// part in the measurement loop while merging.
pub fn desired_state(
    address: UnitAddress,
    is_merging: bool,
    detector: &dyn TriangleDetector,
) -> TransmitterState {
    if detector.is_triangle_address(address) && !is_merging {
        TransmitterState::Deactivated
    } else {
        TransmitterState::ActiveHigh
    }
}

/// Every error that applies to `measurement`. The checks are independent,
/// so more than one can fire for the same pulse.
pub fn classify(measurement: &Measurement, scenario_count: usize) -> Vec<ErrorCode> {
    let mut codes = Vec::new();
    if scenario_count == 0 {
        codes.push(ErrorCode::NoCalibration);
    }
    if measurement.rssi == 0 {
        codes.push(ErrorCode::TransmitterRadioLost);
    }
    if measurement.valid_distance_count() < MIN_ULTRASOUND_RECEIVERS {
        codes.push(ErrorCode::NoUltraSound);
    }
    codes
}

/// Runs the resolver. Outside merge mode it is asked once with every
/// scenario and picks the best one itself. While merging it is asked once
/// per scenario, so a single pulse may produce one position per scenario.
pub fn resolve(
    measurement: &Measurement,
    ctx: &PipelineContext,
    calculator: &dyn PositionCalculator,
) -> Vec<Effect> {
    let outcome = |res: Option<CalculatedPosition>| match res {
        Some(pos) => Effect::EmitPosition(pos),
        None => Effect::EmitError {
            code: ErrorCode::Other,
            tx_address: measurement.tx_address,
        },
    };

    if ctx.is_merging {
        ctx.scenarios
            .iter()
            .map(|s| outcome(calculator.try_calculate_position(measurement, std::slice::from_ref(s))))
            .collect()
    } else {
        vec![outcome(calculator.try_calculate_position(measurement, ctx.scenarios))]
    }
}

/// One full pass for a measurement outside calibration: advisory errors
/// first, then resolution, then eviction down to the mode's capacity.
pub fn process_measurement(
    measurement: &Measurement,
    ctx: &PipelineContext,
    calculator: &dyn PositionCalculator,
) -> Vec<Effect> {
    let mut effects: Vec<Effect> = classify(measurement, ctx.scenarios.len())
        .into_iter()
        .map(|code| Effect::EmitError {
            code,
            tx_address: measurement.tx_address,
        })
        .collect();

    effects.extend(resolve(measurement, ctx, calculator));

    let added = effects
        .iter()
        .filter(|e| matches!(e, Effect::EmitPosition(_)))
        .count();
    let evict = history::excess(ctx.history_len + added, history::capacity(ctx.is_merging));
    if evict > 0 {
        effects.push(Effect::Evict(evict));
    }

    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrator_triangle::ReservedRangeDetector;
    use crate::master::RxMeasurement;
    use crate::scenario::{Point3, ScenarioId};

    fn measurement(rssi: u8, distances: &[f64]) -> Measurement {
        Measurement {
            tx_address: UnitAddress(5),
            rssi,
            sequence: 0,
            rx_measurements: distances
                .iter()
                .enumerate()
                .map(|(i, d)| RxMeasurement {
                    receiver: UnitAddress(i as u16 + 1),
                    distance_mm: *d,
                })
                .collect(),
        }
    }

    fn scenarios(n: u32) -> Vec<Scenario> {
        (1..=n)
            .map(|i| Scenario {
                id: ScenarioId(i),
                ..Scenario::new(format!("s{}", i), vec![], [1.0, 1.0, 1.0])
            })
            .collect()
    }

    /// Succeeds for any scenario whose id is not in `failing`.
    fn calculator(failing: &'static [u32]) -> impl PositionCalculator {
        move |m: &Measurement, s: &[Scenario]| -> Option<CalculatedPosition> {
            s.iter()
                .find(|s| !failing.contains(&s.id.0))
                .map(|s| CalculatedPosition {
                    position: Point3::new(s.id.0 as f64, 0.0, 0.0),
                    tx_address: m.tx_address,
                    scenario: Some(s.id),
                })
        }
    }

    fn errors(effects: &[Effect]) -> Vec<ErrorCode> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::EmitError { code, .. } => Some(*code),
                _ => None,
            })
            .collect()
    }

    fn positions(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::EmitPosition(_)))
            .count()
    }

    #[test]
    fn triangle_transmitters_only_active_while_merging() {
        let detector = ReservedRangeDetector::new(100..=102);
        assert_eq!(
            desired_state(UnitAddress(101), false, &detector),
            TransmitterState::Deactivated
        );
        assert_eq!(
            desired_state(UnitAddress(101), true, &detector),
            TransmitterState::ActiveHigh
        );
        assert_eq!(
            desired_state(UnitAddress(7), false, &detector),
            TransmitterState::ActiveHigh
        );
        assert_eq!(
            desired_state(UnitAddress(7), true, &detector),
            TransmitterState::ActiveHigh
        );
        // Same inputs, same answer
        assert_eq!(
            desired_state(UnitAddress(101), false, &detector),
            desired_state(UnitAddress(101), false, &detector)
        );
    }

    #[test]
    fn classification_checks_are_independent() {
        let m = measurement(0, &[10.0, 20.0, 30.0]);
        assert_eq!(
            classify(&m, 0),
            vec![ErrorCode::NoCalibration, ErrorCode::TransmitterRadioLost]
        );

        let m = measurement(0, &[10.0, 0.0, 30.0]);
        assert_eq!(
            classify(&m, 0),
            vec![
                ErrorCode::NoCalibration,
                ErrorCode::TransmitterRadioLost,
                ErrorCode::NoUltraSound
            ]
        );

        let m = measurement(50, &[10.0, 20.0, 30.0, 0.0]);
        assert!(classify(&m, 1).is_empty());
    }

    #[test]
    fn errors_do_not_stop_resolution() {
        let m = measurement(0, &[10.0]);
        let s = scenarios(1);
        let ctx = PipelineContext {
            scenarios: &s,
            is_merging: false,
            history_len: 0,
        };
        let effects = process_measurement(&m, &ctx, &calculator(&[]));
        assert_eq!(
            errors(&effects),
            vec![ErrorCode::TransmitterRadioLost, ErrorCode::NoUltraSound]
        );
        assert_eq!(positions(&effects), 1);
    }

    #[test]
    fn single_mode_asks_once() {
        let m = measurement(10, &[1.0, 2.0, 3.0]);
        let s = scenarios(3);
        let ctx = PipelineContext {
            scenarios: &s,
            is_merging: false,
            history_len: 0,
        };

        let effects = resolve(&m, &ctx, &calculator(&[1]));
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::EmitPosition(p) => assert_eq!(p.scenario, Some(ScenarioId(2))),
            other => panic!("expected a position, got {:?}", other),
        }

        let effects = resolve(&m, &ctx, &calculator(&[1, 2, 3]));
        assert_eq!(errors(&effects), vec![ErrorCode::Other]);
    }

    #[test]
    fn merge_mode_asks_every_scenario() {
        let m = measurement(10, &[1.0, 2.0, 3.0]);
        let s = scenarios(3);
        let ctx = PipelineContext {
            scenarios: &s,
            is_merging: true,
            history_len: 0,
        };

        let effects = process_measurement(&m, &ctx, &calculator(&[2]));
        assert_eq!(positions(&effects), 2);
        assert_eq!(errors(&effects), vec![ErrorCode::Other]);
    }

    #[test]
    fn no_scenarios_means_no_merge_calls() {
        let m = measurement(10, &[1.0, 2.0, 3.0]);
        let ctx = PipelineContext {
            scenarios: &[],
            is_merging: true,
            history_len: 0,
        };
        let effects = process_measurement(&m, &ctx, &calculator(&[]));
        assert_eq!(errors(&effects), vec![ErrorCode::NoCalibration]);
        assert_eq!(positions(&effects), 0);
    }

    #[test]
    fn eviction_counts_the_new_positions() {
        let m = measurement(10, &[1.0, 2.0, 3.0]);
        let s = scenarios(3);
        let ctx = PipelineContext {
            scenarios: &s,
            is_merging: true,
            history_len: 150,
        };
        let effects = process_measurement(&m, &ctx, &calculator(&[]));
        assert_eq!(effects.last(), Some(&Effect::Evict(53)));

        let ctx = PipelineContext {
            is_merging: false,
            ..ctx
        };
        let effects = process_measurement(&m, &ctx, &calculator(&[]));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Evict(_))));
    }
}
