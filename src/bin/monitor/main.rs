//! Shows where the simulated transmitters really are next to where the
//! measurement pipeline put them.

mod gui;

use std::time::Duration;

use gui::engage_gui;
use log::error;
use ultratrack::calibrator_triangle::ReservedRangeDetector;
use ultratrack::dispatcher::Dispatcher;
use ultratrack::dummy_master::{self, DummyMaster};
use ultratrack::event_queue::EventQueue;

fn main() {
    env_logger::init();

    let queue = EventQueue::new();
    let master = DummyMaster::builder()
        .num_transmitters(3)
        .range(1500.0)
        .noise(20.0)
        .build(queue.clone());
    let calculator = master.calculator();
    let mut dispatcher = Dispatcher::new(master, calculator, ReservedRangeDetector::default());

    let ready = dispatcher
        .connect()
        .and_then(|_| dummy_master::calibrate(&mut dispatcher, &queue, 1));
    if let Err(e) = ready {
        error!("{}", e);
        return;
    }

    let tick_rate = Duration::from_millis(100);
    if let Err(e) = engage_gui(&mut dispatcher, queue, tick_rate) {
        error!("{}", e);
    }

    dispatcher.close();
}
