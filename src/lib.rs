//! UltraTrack is the host side of an ultrasonic positioning system. A Master
//! device talks to a set of receivers hanging from the ceiling and a set of
//! transmitters moving around below them. For every ultrasonic pulse it
//! reports how far each receiver thinks the transmitter is.
//!
//! This crate turns those reports into positions. It keeps track of which
//! units are connected and which transmitters should be pulsing, checks
//! every measurement for the usual problems (no calibration, lost radio, too
//! few receivers), hands good ones to a [position
//! calculator](position_calculator::PositionCalculator), keeps a short
//! history for display, and forwards positions and errors to [external
//! connections](external).
//!
//! Receiver placements come from calibrating against a calibrator triangle:
//! three transmitters at known positions. Each calibration is a
//! [scenario](scenario::Scenario). Scenarios are saved to a [calibration
//! file](scenario_file) and can be lined up against each other by merging.
//!
//! Everything is driven by the [`Dispatcher`](dispatcher::Dispatcher), which
//! consumes [`MasterEvent`](master::MasterEvent)s from an
//! [`EventQueue`](event_queue::EventQueue). There are two Masters in this
//! crate that do not need hardware: a [simulation](dummy_master) and a
//! [replay](replay_master) of a recorded session.

#![warn(missing_docs)]
pub mod args;
pub mod calibrator_triangle;
pub mod dispatcher;
pub mod dummy_master;
pub mod event_queue;
pub mod external;
pub mod gui;
pub mod history;
pub mod master;
pub mod message_decoder;
pub mod pipeline;
pub mod position_calculator;
pub mod replay_master;
pub mod scenario;
pub mod scenario_file;
