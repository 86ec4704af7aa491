//! The device bus and host supplied peripherals.
//!
//! The bus has 16 devices with 16 byte-wide registers each. A port address is a single byte: the
//! high nibble selects the device, the low nibble the register. Every device slot can hold a
//! handler implementing [Device] that is notified when a register is read or written by the
//! `DEI` and `DEO` instructions. The bus itself never interprets register contents.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::emulator::Machine;

/// Number of devices on the bus.
pub const DEVICE_COUNT: usize = 16;

/// A register of a device on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Port {
    /// Index of the device, `0x0`-`0xF`.
    pub device: u8,

    /// Index of the register within the device, `0x0`-`0xF`.
    pub register: u8,
}

impl Port {
    pub fn from_address(address: u8) -> Port {
        Port {
            device: address >> 4,
            register: address & 0x0F,
        }
    }

    pub fn address(&self) -> u8 {
        (self.device << 4) | (self.register & 0x0F)
    }

    /// The following register of the same device. Wraps from `0xF` to `0x0`.
    pub fn next(&self) -> Port {
        Port {
            device: self.device,
            register: (self.register + 1) & 0x0F,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}", self.address())
    }
}

/// Interface of the peripherals attached to the bus.
///
/// Both callbacks receive the machine that executed the instruction. A handler may inspect or
/// modify any machine state, including re-entering [Machine::run] with another vector. While a
/// handler runs it is detached from its slot, so accesses the nested run makes to the same
/// device only touch the registers.
pub trait Device {
    /// Called by `DEI` before the register value is returned. The handler can refresh the
    /// register here.
    fn on_read(&mut self, _machine: &mut Machine, _port: Port) {}

    /// Called by `DEO` after the value was stored into the register.
    fn on_write(&mut self, _machine: &mut Machine, _port: Port) {}
}

struct DeviceSlot {
    registers: [u8; 16],
    handler: Option<Box<dyn Device>>,
}

/// Register storage and handler registry of the 16 devices.
pub struct DeviceBus {
    slots: Vec<DeviceSlot>,
}

impl Default for DeviceBus {
    fn default() -> DeviceBus {
        DeviceBus::new()
    }
}

impl DeviceBus {
    pub fn new() -> DeviceBus {
        DeviceBus {
            slots: (0..DEVICE_COUNT)
                .map(|_| DeviceSlot {
                    registers: [0; 16],
                    handler: None,
                })
                .collect(),
        }
    }

    fn slot(&self, device: u8) -> &DeviceSlot {
        &self.slots[(device & 0x0F) as usize]
    }

    fn slot_mut(&mut self, device: u8) -> &mut DeviceSlot {
        &mut self.slots[(device & 0x0F) as usize]
    }

    /// Installs a handler for `device`.
    ///
    /// # Returns
    /// The previously installed handler.
    pub fn attach<D: Device + 'static>(&mut self, device: u8, handler: D) -> Option<Box<dyn Device>> {
        self.slot_mut(device).handler.replace(Box::new(handler))
    }

    pub fn detach(&mut self, device: u8) -> Option<Box<dyn Device>> {
        self.slot_mut(device).handler.take()
    }

    pub fn is_attached(&self, device: u8) -> bool {
        self.slot(device).handler.is_some()
    }

    pub(crate) fn take_handler(&mut self, device: u8) -> Option<Box<dyn Device>> {
        self.slot_mut(device).handler.take()
    }

    /// Puts a handler taken with [take_handler](DeviceBus::take_handler) back, unless a new one
    /// was attached in the meantime.
    pub(crate) fn restore_handler(&mut self, device: u8, handler: Box<dyn Device>) {
        let slot = self.slot_mut(device);

        if slot.handler.is_none() {
            slot.handler = Some(handler);
        }
    }

    pub fn registers(&self, device: u8) -> &[u8; 16] {
        &self.slot(device).registers
    }

    pub fn registers_mut(&mut self, device: u8) -> &mut [u8; 16] {
        &mut self.slot_mut(device).registers
    }

    /// Reads a register without notifying the device.
    pub fn peek(&self, port: Port) -> u8 {
        self.slot(port.device).registers[(port.register & 0x0F) as usize]
    }

    /// Writes a register without notifying the device.
    pub fn poke(&mut self, port: Port, value: u8) {
        self.slot_mut(port.device).registers[(port.register & 0x0F) as usize] = value;
    }

    /// Reads the big-endian short stored in registers `register` and `register + 1`.
    pub fn peek16(&self, port: Port) -> u16 {
        u16::from_be_bytes([self.peek(port), self.peek(port.next())])
    }

    /// The vector of a device, by convention the short in its first two registers.
    pub fn vector(&self, device: u8) -> u16 {
        self.peek16(Port { device, register: 0 })
    }

    /// Zeroes the registers of every device. Handlers stay attached.
    pub fn clear_registers(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.registers = [0; 16];
        }
    }
}

impl fmt::Debug for DeviceBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let attached: Vec<usize> = self.slots.iter()
            .enumerate()
            .filter(|(_, slot)| slot.handler.is_some())
            .map(|(i, _)| i)
            .collect();

        f.debug_struct("DeviceBus")
            .field("attached", &attached)
            .finish()
    }
}

/// Register receiving bytes written to the standard output.
pub const CONSOLE_WRITE: u8 = 0x8;

/// Register receiving bytes written to the standard error.
pub const CONSOLE_ERROR: u8 = 0x9;

/// A text console. Bytes written to register `0x8` go to `out`, bytes written to register `0x9`
/// go to `err`. Reads are no-ops.
pub struct Console<O, E> {
    pub out: O,
    pub err: E,
}

impl Console<std::io::Stdout, std::io::Stderr> {
    /// A console writing into the standard output and error of the process.
    pub fn stdio() -> Self {
        Console {
            out: std::io::stdout(),
            err: std::io::stderr(),
        }
    }
}

impl<O: Write, E: Write> Console<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Console { out, err }
    }
}

impl<O: Write, E: Write> Device for Console<O, E> {
    fn on_write(&mut self, machine: &mut Machine, port: Port) {
        let byte = machine.bus.peek(port);

        // A closed pipe is not the program's fault.
        let _ = match port.register {
            CONSOLE_WRITE => self.out.write_all(&[byte]).and_then(|_| self.out.flush()),
            CONSOLE_ERROR => self.err.write_all(&[byte]).and_then(|_| self.err.flush()),
            _ => Ok(()),
        };
    }
}

/// The kind of a device callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A device callback recorded by [Recorder].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub access: Access,
    pub register: u8,

    /// The register value after the callback.
    pub value: u8,
}

#[derive(Default)]
struct RecorderState {
    calls: Vec<Call>,
    input: HashMap<u8, u8>,
}

/// A mock device that records every callback it receives.
///
/// Clones share the same log, so a clone can be attached to the bus while the original is kept
/// for inspecting the calls. Values registered with [Recorder::with_input] are stored into the
/// register on every read.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Rc<RefCell<RecorderState>>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn with_input(self, register: u8, value: u8) -> Recorder {
        self.state.borrow_mut().input.insert(register & 0x0F, value);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Values of all register writes, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().calls.iter()
            .filter(|call| call.access == Access::Write)
            .map(|call| call.value)
            .collect()
    }
}

impl Device for Recorder {
    fn on_read(&mut self, machine: &mut Machine, port: Port) {
        let mut state = self.state.borrow_mut();

        if let Some(value) = state.input.get(&port.register).copied() {
            machine.bus.poke(port, value);
        }

        state.calls.push(Call {
            access: Access::Read,
            register: port.register,
            value: machine.bus.peek(port),
        });
    }

    fn on_write(&mut self, machine: &mut Machine, port: Port) {
        self.state.borrow_mut().calls.push(Call {
            access: Access::Write,
            register: port.register,
            value: machine.bus.peek(port),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_address() {
        let port = Port::from_address(0x3F);

        assert_eq!(port, Port { device: 3, register: 0xF });
        assert_eq!(port.address(), 0x3F);
        assert_eq!(port.next(), Port { device: 3, register: 0 });
    }

    #[test]
    fn test_vector() {
        let mut bus = DeviceBus::new();

        bus.registers_mut(2)[0] = 0x12;
        bus.registers_mut(2)[1] = 0x34;

        assert_eq!(bus.vector(2), 0x1234);

        bus.clear_registers();
        assert_eq!(bus.vector(2), 0);
    }

    #[test]
    fn test_attach_detach() {
        let mut bus = DeviceBus::new();

        assert!(bus.attach(1, Recorder::new()).is_none());
        assert!(bus.is_attached(1));
        assert!(bus.attach(1, Recorder::new()).is_some());
        assert!(bus.detach(1).is_some());
        assert!(!bus.is_attached(1));
    }
}
