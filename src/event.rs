//! Event handling.
//!
//! This library exposes an event-based interface for reacting
//! to the state changes of the machine in real-time. [EventListeners](EventListener)
//! can be registered on the [Machine](crate::emulator::Machine) with the
//! [add_listener](crate::emulator::Machine::add_listener) method.
//!
//! A blanket implementation of [EventListener] for all `Fn(&Event)` is provided.

use crate::device::Port;
use crate::error::Fault;

/// Represents an event that occurred while executing a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The program modified a memory location.
    MemoryChange {
        /// The address of the changed memory location.
        address: u16,

        /// New value of the changed memory location.
        value: u8,
    },

    /// The program wrote a device register.
    DeviceWrite {
        port: Port,
        value: u8,
    },

    /// The program read a device register.
    DeviceRead {
        port: Port,
    },

    /// An instruction failed and the machine halted.
    Fault(Fault),
}

/// Trait for consuming events.
pub trait EventListener {
    /// Called whenever a new event has been created.
    fn event(&mut self, event: &Event);
}

impl<F> EventListener for F where F: FnMut(&Event) {
    fn event(&mut self, event: &Event) {
        self(event)
    }
}

#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> EventDispatcher {
        EventDispatcher {
            listeners: Vec::new(),
        }
    }

    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener) as Box<dyn EventListener>)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: Event) {
        for listener in &mut self.listeners {
            listener.event(&event);
        }
    }
}
