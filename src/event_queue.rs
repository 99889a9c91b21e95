//! The thread-safe buffer where Master implementations store their
//! [`MasterEvent`]s until the dispatcher gets to them.

use crate::master::MasterEvent;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// A cloneable handle to a shared FIFO of [`MasterEvent`]s. Hardware threads
/// push, the dispatcher drains by iterating.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: Arc<Mutex<VecDeque<MasterEvent>>>,
}

impl EventQueue {
    /// Instantiate a new, empty [`EventQueue`].
    pub fn new() -> Self {
        EventQueue {
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Append an event at the back of the queue.
    pub fn push(&self, event: MasterEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every waiting event.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Iterator for EventQueue {
    type Item = MasterEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.lock().unwrap().pop_front()
    }
}
