//! The [Machine] and the execution of [instructions](crate::instruction::Instruction).
//!
//! A machine is driven by the host: it loads a program, attaches [devices](crate::device::Device)
//! and then calls [Machine::run] with a vector whenever something happens, for example once at
//! boot and then on every frame or input event. Each run executes instructions until the program
//! halts.

use std::fmt;

use slog::{error, o, trace, Discard, Logger};

use crate::device::{Device, DeviceBus, Port};
use crate::error::{Fault, FaultKind, StackKind};
use crate::event::{Event, EventDispatcher, EventListener};
use crate::instruction::{Instruction, Operation};
use crate::memory::{AddressSpace, PAGE_PROGRAM};
use crate::stack::{Stack, StackError, STACK_CAPACITY};

/// Outcome of a [bounded run](Machine::run_bounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The program halted on its own.
    Halted,

    /// The instruction budget ran out before the program halted. The machine can be resumed with
    /// [Machine::resume].
    BudgetExhausted,
}

/// Utility struct for implementing methods in the context of emulating a single instruction.
struct InstructionEmulationContext<'e, 'i> {
    /// The machine in whose context the instruction is being emulated.
    machine: &'e mut Machine,

    /// The instruction that we are currently emulating.
    instruction: &'i Instruction,
}

impl<'e, 'i> InstructionEmulationContext<'e, 'i> {
    fn source(&mut self) -> &mut Stack {
        if self.instruction.ret {
            &mut self.machine.rst
        } else {
            &mut self.machine.wst
        }
    }

    fn other(&mut self) -> &mut Stack {
        if self.instruction.ret {
            &mut self.machine.wst
        } else {
            &mut self.machine.rst
        }
    }

    /// Pops a value of the instruction's width.
    fn pop(&mut self) -> u16 {
        if self.instruction.short {
            self.source().pop16()
        } else {
            self.source().pop8() as u16
        }
    }

    fn pop8(&mut self) -> u8 {
        self.source().pop8()
    }

    fn pop16(&mut self) -> u16 {
        self.source().pop16()
    }

    /// Pushes a value of the instruction's width. Bytes are truncated.
    fn push(&mut self, value: u16) {
        if self.instruction.short {
            self.source().push16(value)
        } else {
            self.source().push8(value as u8)
        }
    }

    fn push8(&mut self, value: u8) {
        self.source().push8(value)
    }

    /// Resolves an offset relative to the program counter.
    fn relative(&self, offset: u8) -> u16 {
        self.machine.pc.wrapping_add(offset as i8 as u16)
    }

    /// Relative jump in byte mode, absolute jump in short mode.
    fn jump(&mut self, target: u16) {
        self.machine.pc = if self.instruction.short {
            target
        } else {
            self.relative(target as u8)
        };
    }

    fn load(&self, address: u16) -> u16 {
        if self.instruction.short {
            self.machine.ram.peek16(address)
        } else {
            self.machine.ram.peek8(address) as u16
        }
    }

    fn store(&mut self, address: u16, value: u16) {
        if self.instruction.short {
            self.machine.ram.poke16(address, value);
            self.machine.memory_changed(address);
            self.machine.memory_changed(address.wrapping_add(1));
        } else {
            self.machine.ram.poke8(address, value as u8);
            self.machine.memory_changed(address);
        }
    }

    /// Execute the instruction.
    ///
    /// All operands are popped before a device is notified, so a handler sees the stacks in
    /// their final state apart from the results.
    fn emulate(&mut self) {
        use Operation::*;

        match self.instruction.operation {
            Break => {
                self.machine.pc = 0;
                self.machine.halted = true;
            },
            Literal => {
                let pc = self.machine.pc;
                let value = self.load(pc);
                self.machine.pc = pc.wrapping_add(self.instruction.width());
                self.push(value);
            },
            NoOperation => (),

            Pop => {
                self.pop();
            },
            Duplicate => {
                let a = self.pop();
                self.push(a);
                self.push(a);
            },
            Swap => {
                let b = self.pop();
                let a = self.pop();
                self.push(b);
                self.push(a);
            },
            Over => {
                let b = self.pop();
                let a = self.pop();
                self.push(a);
                self.push(b);
                self.push(a);
            },
            Rotate => {
                let c = self.pop();
                let b = self.pop();
                let a = self.pop();
                self.push(b);
                self.push(c);
                self.push(a);
            },

            comparison @ Equal | comparison @ NotEqual
                | comparison @ GreaterThan | comparison @ LessThan =>
            {
                let b = self.pop();
                let a = self.pop();

                let flag = match comparison {
                    Equal => a == b,
                    NotEqual => a != b,
                    GreaterThan => a > b,
                    _ => a < b,
                };

                self.push8(flag as u8);
            },

            Jump => {
                let target = self.pop();
                self.jump(target);
            },
            JumpConditional => {
                let target = self.pop();
                let condition = self.pop8();

                if condition != 0 {
                    self.jump(target);
                }
            },
            JumpStash => {
                let target = self.pop();
                let pc = self.machine.pc;
                self.other().push16(pc);
                self.jump(target);
            },
            Stash => {
                let value = self.pop();

                if self.instruction.short {
                    self.other().push16(value);
                } else {
                    self.other().push8(value as u8);
                }
            },

            LoadZeroPage => {
                let address = self.pop8() as u16;
                let value = self.load(address);
                self.push(value);
            },
            StoreZeroPage => {
                let address = self.pop8() as u16;
                let value = self.pop();
                self.store(address, value);
            },
            LoadRelative => {
                let offset = self.pop8();
                let value = self.load(self.relative(offset));
                self.push(value);
            },
            StoreRelative => {
                let offset = self.pop8();
                let value = self.pop();
                let address = self.relative(offset);
                self.store(address, value);
            },
            LoadAbsolute => {
                let address = self.pop16();
                let value = self.load(address);
                self.push(value);
            },
            StoreAbsolute => {
                let address = self.pop16();
                let value = self.pop();
                self.store(address, value);
            },

            DeviceIn => {
                let port = Port::from_address(self.pop8());

                if self.instruction.short {
                    let high = self.machine.device_read(port);
                    let low = self.machine.device_read(port.next());
                    self.push(u16::from_be_bytes([high, low]));
                } else {
                    let value = self.machine.device_read(port);
                    self.push8(value);
                }
            },
            DeviceOut => {
                let port = Port::from_address(self.pop8());
                let value = self.pop();

                if self.instruction.short {
                    let [high, low] = value.to_be_bytes();
                    self.machine.device_write(port, high);
                    self.machine.device_write(port.next(), low);
                } else {
                    self.machine.device_write(port, value as u8);
                }
            },

            Shift => {
                let shift = self.pop8() as u16;
                let a = self.pop();
                self.push((a >> (shift & 0x0F)) << (shift >> 4));
            },

            arithmetic_operation => {
                let b = self.pop();
                let a = self.pop();

                let c = match arithmetic_operation {
                    Add => a.wrapping_add(b),
                    Subtract => a.wrapping_sub(b),
                    Multiply => a.wrapping_mul(b),
                    Divide => a.checked_div(b).unwrap_or(0),
                    And => a & b,
                    Or => a | b,
                    _ => a ^ b,
                };

                self.push(c);
            },
        }
    }
}

/// A snapshot of the complete state of a [Machine], see [Machine::snapshot].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub pc: u16,
    pub wst: Stack,
    pub rst: Stack,
    pub ram: AddressSpace,

    /// Registers of every device, indexed by the device number.
    pub registers: Vec<[u8; 16]>,
}

/// A memory location that differs between two [snapshots](Snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDiff {
    pub address: u16,
    pub before: u8,
    pub after: u8,
}

impl Snapshot {
    /// Lists the locations of the instruction visible bank that differ in `after`.
    pub fn diff(&self, after: &Snapshot) -> Vec<MemoryDiff> {
        self.ram.as_slice().iter()
            .zip(after.ram.as_slice())
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(address, (before, after))| MemoryDiff {
                address: address as u16,
                before: *before,
                after: *after,
            })
            .collect()
    }
}

/// The virtual machine: two stacks, the memory, the device bus and the program counter.
pub struct Machine {
    /// The working stack.
    pub wst: Stack,

    /// The return stack.
    pub rst: Stack,

    pub ram: AddressSpace,
    pub bus: DeviceBus,

    /// Address of the next instruction.
    pub pc: u16,

    /// True if the current run has ended.
    pub halted: bool,

    logger: Logger,
    events: EventDispatcher,
}

impl Default for Machine {
    fn default() -> Machine {
        Machine::new()
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.pc)
            .field("halted", &self.halted)
            .field("wst", &self.wst)
            .field("rst", &self.rst)
            .field("bus", &self.bus)
            .finish()
    }
}

impl Machine {
    /// Creates a machine with empty memory and no devices.
    pub fn new() -> Machine {
        Machine::with_logger(None)
    }

    /// Creates a machine that logs into `logger`. Every executed instruction is logged at the
    /// trace level.
    pub fn with_logger<L: Into<Option<Logger>>>(logger: L) -> Machine {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "emulation"));

        Machine {
            wst: Stack::new(),
            rst: Stack::new(),
            ram: AddressSpace::new(),
            bus: DeviceBus::new(),
            pc: 0,
            halted: false,
            logger,
            events: EventDispatcher::new(),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Registers a listener for the [events](crate::event::Event) of this machine.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.events.add_listener(listener);
    }

    /// Installs the handler of `device`, replacing the previous one.
    pub fn attach<D: Device + 'static>(&mut self, device: u8, handler: D) -> Option<Box<dyn Device>> {
        self.bus.attach(device, handler)
    }

    pub fn detach(&mut self, device: u8) -> Option<Box<dyn Device>> {
        self.bus.detach(device)
    }

    /// Copies a binary image into the memory at the program page.
    ///
    /// # Returns
    /// The number of bytes that fit into the memory.
    pub fn load(&mut self, program: &[u8]) -> usize {
        self.ram.load(PAGE_PROGRAM, program)
    }

    /// Clears the stacks, the memory and the device registers. Attached devices and listeners
    /// are kept.
    pub fn reset(&mut self) {
        self.wst.clear();
        self.rst.clear();
        self.ram.clear();
        self.bus.clear_registers();
        self.pc = 0;
        self.halted = false;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pc: self.pc,
            wst: self.wst.clone(),
            rst: self.rst.clone(),
            ram: self.ram.clone(),
            registers: (0..crate::device::DEVICE_COUNT as u8)
                .map(|device| *self.bus.registers(device))
                .collect(),
        }
    }

    fn memory_changed(&mut self, address: u16) {
        if !self.events.is_empty() {
            let value = self.ram.peek8(address);
            self.events.dispatch(Event::MemoryChange { address, value });
        }
    }

    /// Calls `callback` with the handler of `device` taken out of its slot.
    ///
    /// The program counter, the halt flag and the stack error flags are restored afterwards, so
    /// a handler can start a nested run without disturbing the instruction that called it.
    fn with_handler<F>(&mut self, device: u8, callback: F)
    where
        F: FnOnce(&mut dyn Device, &mut Machine),
    {
        if let Some(mut handler) = self.bus.take_handler(device) {
            let pc = self.pc;
            let halted = self.halted;
            let errors = (self.wst.error(), self.rst.error());

            callback(handler.as_mut(), self);

            self.pc = pc;
            self.halted = halted;
            self.wst.set_error(errors.0);
            self.rst.set_error(errors.1);
            self.bus.restore_handler(device, handler);
        }
    }

    /// Reads a device register the way `DEI` does: the device is notified first, then the
    /// register is returned.
    pub fn device_read(&mut self, port: Port) -> u8 {
        if !self.events.is_empty() {
            self.events.dispatch(Event::DeviceRead { port });
        }

        self.with_handler(port.device, |handler, machine| handler.on_read(machine, port));
        self.bus.peek(port)
    }

    /// Writes a device register the way `DEO` does: the value is stored, then the device is
    /// notified.
    pub fn device_write(&mut self, port: Port, value: u8) {
        self.bus.poke(port, value);

        if !self.events.is_empty() {
            self.events.dispatch(Event::DeviceWrite { port, value });
        }

        self.with_handler(port.device, |handler, machine| handler.on_write(machine, port));
    }

    /// Halts the machine and reports a stack fault.
    fn fault(&mut self, kind: FaultKind, stack: StackKind, ins: &Instruction) -> Fault {
        let fault = Fault {
            kind,
            stack,
            instruction: ins.as_byte(),
            pc: self.pc.wrapping_sub(1),
        };

        let flag = match kind {
            FaultKind::StackUnderflow => StackError::Underflow,
            FaultKind::StackOverflow => StackError::Overflow,
        };

        match stack {
            StackKind::Working => self.wst.set_error(flag),
            StackKind::Return => self.rst.set_error(flag),
        }

        error!(self.logger, "{}", fault; "pc" => format!("{:04x}", fault.pc));

        self.halted = true;
        self.events.dispatch(Event::Fault(fault));

        fault
    }

    /// Checks that the stacks can hold the inputs and the outputs of `ins`.
    fn validate(&mut self, ins: &Instruction) -> Result<(), Fault> {
        let effect = ins.stack_effect();

        let (source, other, source_kind, other_kind) = if ins.ret {
            (&self.rst, &self.wst, StackKind::Return, StackKind::Working)
        } else {
            (&self.wst, &self.rst, StackKind::Working, StackKind::Return)
        };

        let depth = source.len() as u16;
        let remaining = if ins.keep { depth } else { depth.saturating_sub(effect.input as u16) };

        let failure = if depth < effect.input as u16 {
            Some((FaultKind::StackUnderflow, source_kind))
        } else if remaining + effect.output as u16 > STACK_CAPACITY as u16 {
            Some((FaultKind::StackOverflow, source_kind))
        } else if other.len() as u16 + effect.other as u16 > STACK_CAPACITY as u16 {
            Some((FaultKind::StackOverflow, other_kind))
        } else {
            None
        };

        match failure {
            Some((kind, stack)) => Err(self.fault(kind, stack, ins)),
            None => Ok(()),
        }
    }

    /// The stack whose error flag is set, if any.
    fn stack_failure(&self) -> Option<(FaultKind, StackKind)> {
        let flag = |error: StackError| match error {
            StackError::None => None,
            StackError::Underflow => Some(FaultKind::StackUnderflow),
            StackError::Overflow => Some(FaultKind::StackOverflow),
        };

        flag(self.wst.error())
            .map(|kind| (kind, StackKind::Working))
            .or_else(|| flag(self.rst.error()).map(|kind| (kind, StackKind::Return)))
    }

    /// Executes a single instruction.
    ///
    /// Does not fetch anything: the program counter is expected to point past the instruction
    /// byte, the way [step](Machine::step) leaves it.
    ///
    /// # Errors
    /// Returns a [Fault] and halts if a stack can't hold the inputs or the outputs. No stack is
    /// modified in that case. A device handler that changes the stacks while the instruction
    /// runs can still make a push or a pop fail, which is reported the same way.
    pub fn emulate_instruction(&mut self, ins: &Instruction) -> Result<(), Fault> {
        self.validate(ins)?;

        self.wst.clear_error();
        self.rst.clear_error();

        let keep = ins.keep;

        if ins.ret {
            self.rst.begin(keep);
        } else {
            self.wst.begin(keep);
        }

        let mut ctx = InstructionEmulationContext {
            machine: self,
            instruction: ins,
        };

        ctx.emulate();

        if ins.ret {
            self.rst.end();
        } else {
            self.wst.end();
        }

        match self.stack_failure() {
            Some((kind, stack)) => Err(self.fault(kind, stack, ins)),
            None => Ok(()),
        }
    }

    /// Fetches the next instruction, increments the program counter and executes the instruction.
    ///
    /// A zero byte or a program counter of zero halts the machine.
    ///
    /// # Returns
    /// `false` once the machine has halted.
    pub fn step(&mut self) -> Result<bool, Fault> {
        if self.halted || self.pc == 0 {
            self.halted = true;
            return Ok(false);
        }

        let byte = self.ram.peek8(self.pc);
        let ins = Instruction::from_byte(byte);

        trace!(self.logger, "execute";
            "pc" => format!("{:04x}", self.pc),
            "instruction" => %ins,
            "wst" => self.wst.len(),
            "rst" => self.rst.len()
        );

        self.pc = self.pc.wrapping_add(1);

        if byte == 0 {
            self.halted = true;
            return Ok(false);
        }

        self.emulate_instruction(&ins)?;

        if self.pc == 0 {
            self.halted = true;
        }

        Ok(!self.halted)
    }

    fn start(&mut self, vector: u16) {
        self.pc = vector;
        self.halted = false;
        self.wst.clear_error();
        self.rst.clear_error();
    }

    /// Executes the program from `vector` until it halts.
    ///
    /// A vector of zero returns at once. The call is re-entrant: a device handler can call `run`
    /// on the machine it received, and the interrupted run continues after the handler returns.
    ///
    /// # Errors
    /// Returns the [Fault] that halted the program.
    pub fn run(&mut self, vector: u16) -> Result<(), Fault> {
        self.start(vector);

        while self.step()? {}

        Ok(())
    }

    /// Like [run](Machine::run), but executes at most `budget` instructions.
    pub fn run_bounded(&mut self, vector: u16, budget: u64) -> Result<Exit, Fault> {
        self.start(vector);
        self.resume(budget)
    }

    /// Continues a run stopped by an exhausted budget for at most `budget` more instructions.
    pub fn resume(&mut self, budget: u64) -> Result<Exit, Fault> {
        for _ in 0..budget {
            if !self.step()? {
                return Ok(Exit::Halted);
            }
        }

        if self.halted || self.pc == 0 {
            self.halted = true;
            Ok(Exit::Halted)
        } else {
            Ok(Exit::BudgetExhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::device::{Access, Call, Recorder};
    use crate::instruction::{MODE_KEEP, MODE_SHORT};

    fn machine(program: &[u8]) -> Machine {
        let mut machine = Machine::new();
        machine.load(program);
        machine
    }

    fn run(program: &[u8]) -> Machine {
        let mut machine = machine(program);
        machine.run(PAGE_PROGRAM).expect("program faulted");
        machine
    }

    #[test]
    fn test_add_equal() {
        // #01 #02 ADD #03 EQU
        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x18, 0x01, 0x03, 0x08]);
        assert_eq!(machine.wst.as_slice(), &[0x01]);
        assert!(machine.halted);
    }

    #[test]
    fn test_arithmetic_wraps() {
        let machine = run(&[0x01, 0xFF, 0x01, 0x02, 0x18]);
        assert_eq!(machine.wst.as_slice(), &[0x01]);

        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x19]);
        assert_eq!(machine.wst.as_slice(), &[0xFF]);

        let machine = run(&[0x01, 0x10, 0x01, 0x11, 0x1A]);
        assert_eq!(machine.wst.as_slice(), &[0x10]);

        let machine = run(&[0x21, 0xFF, 0xFF, 0x21, 0x00, 0x02, 0x38]);
        assert_eq!(machine.wst.as_slice(), &[0x00, 0x01]);

        let machine = run(&[0x21, 0x00, 0x01, 0x21, 0x00, 0x02, 0x39]);
        assert_eq!(machine.wst.as_slice(), &[0xFF, 0xFF]);
    }

    #[test]
    fn test_divide_by_zero() {
        let machine = run(&[0x01, 0x07, 0x01, 0x00, 0x1B]);
        assert_eq!(machine.wst.as_slice(), &[0x00]);

        let machine = run(&[0x21, 0x12, 0x34, 0x21, 0x00, 0x00, 0x3B]);
        assert_eq!(machine.wst.as_slice(), &[0x00, 0x00]);
    }

    #[test]
    fn test_shift() {
        let machine = run(&[0x01, 0x34, 0x01, 0x10, 0x1F]);
        assert_eq!(machine.wst.as_slice(), &[0x68]);

        let machine = run(&[0x01, 0x34, 0x01, 0x01, 0x1F]);
        assert_eq!(machine.wst.as_slice(), &[0x1A]);

        let machine = run(&[0x01, 0x34, 0x01, 0x80, 0x1F]);
        assert_eq!(machine.wst.as_slice(), &[0x00]);

        let machine = run(&[0x21, 0x12, 0x34, 0x01, 0x04, 0x3F]);
        assert_eq!(machine.wst.as_slice(), &[0x01, 0x23]);
    }

    #[test]
    fn test_dup_pop_identity() {
        let machine = run(&[0x01, 0x12, 0x01, 0x34, 0x04, 0x03]);
        assert_eq!(machine.wst.as_slice(), &[0x12, 0x34]);
    }

    #[test]
    fn test_stack_operations() {
        // ROT
        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x01, 0x03, 0x07]);
        assert_eq!(machine.wst.as_slice(), &[0x02, 0x03, 0x01]);

        // OVR2
        let machine = run(&[0x21, 0x00, 0x01, 0x21, 0x00, 0x02, 0x26]);
        assert_eq!(machine.wst.as_slice(), &[0x00, 0x01, 0x00, 0x02, 0x00, 0x01]);

        // SWP
        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x05]);
        assert_eq!(machine.wst.as_slice(), &[0x02, 0x01]);
    }

    #[test]
    fn test_keep_mode() {
        // #01 #02 ADDk
        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x98]);
        assert_eq!(machine.wst.as_slice(), &[0x01, 0x02, 0x03]);

        // #05 POPk
        let machine = run(&[0x01, 0x05, 0x83]);
        assert_eq!(machine.wst.as_slice(), &[0x05]);
    }

    /// Executes `byte` once with `inputs` on the working stack.
    fn single(byte: u8, inputs: &[u8]) -> Machine {
        let mut machine = Machine::new();
        machine.ram.load(0x0200, &[0x12, 0x34, 0x56]);
        machine.pc = 0x0201;

        for input in inputs {
            machine.wst.push8(*input);
        }

        machine.emulate_instruction(&Instruction::from_byte(byte)).unwrap();
        machine
    }

    #[test]
    fn test_keep_mode_every_operation() {
        let operations = Operation::ALL.iter().filter(|op| **op != Operation::Break);

        for operation in operations {
            for &width in &[0x00, MODE_SHORT] {
                let byte = operation.as_byte() | width;
                let effect = Instruction::from_byte(byte).stack_effect();
                let inputs: Vec<u8> = (0..effect.input).map(|i| 0x03 + i).collect();

                let consumed = single(byte, &inputs);
                let kept = single(byte | MODE_KEEP, &inputs);
                let name = Instruction::from_byte(byte | MODE_KEEP).to_string();

                let (below, above) = kept.wst.as_slice().split_at(inputs.len());

                assert_eq!(below, &inputs[..], "{}", name);
                assert_eq!(above, consumed.wst.as_slice(), "{}", name);
                assert_eq!(consumed.wst.len(), effect.output, "{}", name);
                assert_eq!(kept.rst.as_slice(), consumed.rst.as_slice(), "{}", name);
                assert_eq!(kept.pc, consumed.pc, "{}", name);
                assert!(kept.ram.as_slice() == consumed.ram.as_slice(), "{}", name);
            }
        }
    }

    #[test]
    fn test_underflow() {
        let mut machine = machine(&[0x01, 0x01, 0x18]);
        let fault = machine.run(PAGE_PROGRAM).unwrap_err();

        assert_eq!(fault, Fault {
            kind: FaultKind::StackUnderflow,
            stack: StackKind::Working,
            instruction: 0x18,
            pc: 0x0102,
        });

        assert!(machine.halted);
        assert_eq!(machine.wst.as_slice(), &[0x01]);
        assert_eq!(machine.wst.error(), StackError::Underflow);
    }

    #[test]
    fn test_overflow() {
        let mut machine = machine(&[0x01, 0x01]);

        for _ in 0..STACK_CAPACITY {
            machine.wst.push8(0xAA);
        }

        let fault = machine.run(PAGE_PROGRAM).unwrap_err();

        assert_eq!(fault.kind, FaultKind::StackOverflow);
        assert_eq!(fault.stack, StackKind::Working);
        assert_eq!(machine.wst.len(), STACK_CAPACITY);
        assert!(machine.wst.as_slice().iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_return_stack_overflow() {
        // #01 STH with a full return stack
        let mut machine = machine(&[0x01, 0x01, 0x0F]);

        for _ in 0..STACK_CAPACITY {
            machine.rst.push8(0);
        }

        let fault = machine.run(PAGE_PROGRAM).unwrap_err();

        assert_eq!(fault.stack, StackKind::Return);
        assert_eq!(fault.pc, 0x0102);
        assert_eq!(machine.wst.as_slice(), &[0x01]);
    }

    #[test]
    fn test_stash_and_return_mode() {
        // #05 STH LITr 07 ADDr
        let machine = run(&[0x01, 0x05, 0x0F, 0x41, 0x07, 0x58]);
        assert!(machine.wst.is_empty());
        assert_eq!(machine.rst.as_slice(), &[0x0C]);
    }

    #[test]
    fn test_relative_jump() {
        // #02 JMP #11 #22
        let machine = run(&[0x01, 0x02, 0x0C, 0x01, 0x11, 0x01, 0x22]);
        assert_eq!(machine.wst.as_slice(), &[0x22]);
    }

    #[test]
    fn test_conditional_jump() {
        // #00 #02 JCN #11 #22
        let machine = run(&[0x01, 0x00, 0x01, 0x02, 0x0D, 0x01, 0x11, 0x01, 0x22]);
        assert_eq!(machine.wst.as_slice(), &[0x11, 0x22]);

        // #01 #02 JCN #11 #22
        let machine = run(&[0x01, 0x01, 0x01, 0x02, 0x0D, 0x01, 0x11, 0x01, 0x22]);
        assert_eq!(machine.wst.as_slice(), &[0x22]);
    }

    #[test]
    fn test_jump_stash() {
        // ;0108 JSR2 BRK ... 0108: #2a JMP2r
        let mut program = vec![0x21, 0x01, 0x08, 0x2E, 0x00, 0x00, 0x00, 0x00];
        program.extend(&[0x01, 0x2A, 0x6C]);

        let machine = run(&program);

        assert_eq!(machine.wst.as_slice(), &[0x2A]);
        assert!(machine.rst.is_empty());
        assert_eq!(machine.pc, 0x0105);
    }

    #[test]
    fn test_memory_access() {
        // #ab #10 STZ #10 LDZ
        let machine = run(&[0x01, 0xAB, 0x01, 0x10, 0x11, 0x01, 0x10, 0x10]);
        assert_eq!(machine.wst.as_slice(), &[0xAB]);
        assert_eq!(machine.ram.peek8(0x10), 0xAB);

        // #1234 ;ffff STA2 ;ffff LDA2
        let machine = run(&[0x21, 0x12, 0x34, 0x21, 0xFF, 0xFF, 0x35, 0x21, 0xFF, 0xFF, 0x34]);
        assert_eq!(machine.wst.as_slice(), &[0x12, 0x34]);
        assert_eq!(machine.ram.peek8(0x0000), 0x34);

        // LIT 01 LDR reads the byte after the LDR
        let machine = run(&[0x01, 0x01, 0x12, 0x00, 0x77]);
        assert_eq!(machine.wst.as_slice(), &[0x77]);
    }

    #[test]
    fn test_break_with_modifiers_halts() {
        let machine = run(&[0x01, 0x01, 0x20, 0x01, 0x02]);
        assert_eq!(machine.wst.as_slice(), &[0x01]);
        assert_eq!(machine.pc, 0);
    }

    #[test]
    fn test_device_out() {
        let recorder = Recorder::new();
        let mut machine = machine(&[0x01, 0x42, 0x01, 0x3F, 0x17]);
        machine.attach(3, recorder.clone());

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(recorder.calls(), vec![Call { access: Access::Write, register: 0xF, value: 0x42 }]);
        assert_eq!(machine.bus.registers(3)[0xF], 0x42);
        assert!(machine.wst.is_empty());
    }

    #[test]
    fn test_device_out_short() {
        let recorder = Recorder::new();
        let mut machine = machine(&[0x21, 0x12, 0x34, 0x01, 0x30, 0x37]);
        machine.attach(3, recorder.clone());

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(recorder.calls(), vec![
            Call { access: Access::Write, register: 0x0, value: 0x12 },
            Call { access: Access::Write, register: 0x1, value: 0x34 },
        ]);
        assert_eq!(machine.bus.vector(3), 0x1234);
    }

    #[test]
    fn test_device_in() {
        let recorder = Recorder::new().with_input(0x2, 0x55);
        let mut machine = machine(&[0x01, 0x12, 0x16, 0x01, 0x12, 0x36]);
        machine.attach(1, recorder.clone());
        machine.bus.registers_mut(1)[0x3] = 0x66;

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(machine.wst.as_slice(), &[0x55, 0x55, 0x66]);
        assert_eq!(recorder.calls().len(), 3);
    }

    /// Runs the vector in its first two registers whenever register `0x2` is written.
    struct Interrupt;

    impl Device for Interrupt {
        fn on_write(&mut self, machine: &mut Machine, port: Port) {
            if port.register == 0x2 {
                let vector = machine.bus.vector(port.device);
                machine.run(vector).unwrap();
            }
        }
    }

    #[test]
    fn test_reentrant_run() {
        // ;0200 #20 DEO2 #01 #22 DEO #77
        let mut machine = machine(&[
            0x21, 0x02, 0x00, 0x01, 0x20, 0x37,
            0x01, 0x01, 0x01, 0x22, 0x17,
            0x01, 0x77,
        ]);

        // 0200: #99 #00 STZ BRK
        machine.ram.load(0x0200, &[0x01, 0x99, 0x01, 0x00, 0x11, 0x00]);
        machine.attach(2, Interrupt);

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(machine.ram.peek8(0x0000), 0x99);
        assert_eq!(machine.wst.as_slice(), &[0x77]);
        assert!(machine.bus.is_attached(2));
    }

    /// Fills the working stack from a nested run whenever its register `0x0` is read.
    struct Flood;

    impl Device for Flood {
        fn on_read(&mut self, machine: &mut Machine, port: Port) {
            if port.register == 0x0 {
                machine.run(0x0200).unwrap();
            }
        }
    }

    #[test]
    fn test_nested_run_overflows_outer_instruction() {
        // #20 DEI POP BRK
        let mut machine = machine(&[0x01, 0x20, 0x16, 0x02, 0x00]);

        // 0200: LIT aa, 255 times
        let flood: Vec<u8> = (0..STACK_CAPACITY)
            .flat_map(|_| vec![0x01, 0xAA])
            .collect();

        machine.ram.load(0x0200, &flood);
        machine.attach(2, Flood);

        let fault = machine.run(PAGE_PROGRAM).unwrap_err();

        assert_eq!(fault, Fault {
            kind: FaultKind::StackOverflow,
            stack: StackKind::Working,
            instruction: 0x16,
            pc: 0x0102,
        });

        assert!(machine.halted);
        assert_eq!(machine.wst.len(), STACK_CAPACITY);
        assert_eq!(machine.wst.error(), StackError::Overflow);
    }

    /// Starts a nested run that faults and ignores the fault.
    struct Careless;

    impl Device for Careless {
        fn on_write(&mut self, machine: &mut Machine, _port: Port) {
            // 0200: POP
            assert!(machine.run(0x0200).is_err());
        }
    }

    #[test]
    fn test_nested_fault_stays_in_handler() {
        // #01 #20 DEO #77 BRK
        let mut machine = machine(&[0x01, 0x01, 0x01, 0x20, 0x17, 0x01, 0x77, 0x00]);
        machine.ram.load(0x0200, &[0x02]);
        machine.attach(2, Careless);

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(machine.wst.as_slice(), &[0x77]);
        assert_eq!(machine.wst.error(), StackError::None);
    }

    #[test]
    fn test_run_zero_vector() {
        let mut machine = machine(&[0x01, 0x01]);
        machine.run(0).unwrap();

        assert!(machine.halted);
        assert!(machine.wst.is_empty());
    }

    #[test]
    fn test_budget() {
        // LIT fd JMP
        let mut machine = machine(&[0x01, 0xFD, 0x0C]);

        assert_eq!(machine.run_bounded(PAGE_PROGRAM, 100), Ok(Exit::BudgetExhausted));
        assert!(!machine.halted);
        assert!(machine.wst.is_empty());

        let mut machine = self::machine(&[0x01, 0x01]);
        assert_eq!(machine.run_bounded(PAGE_PROGRAM, 100), Ok(Exit::Halted));
    }

    #[test]
    fn test_memory_events() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();

        let mut machine = machine(&[0x21, 0xAB, 0xCD, 0x01, 0x10, 0x31]);
        machine.add_listener(move |event: &Event| sink.borrow_mut().push(event.clone()));

        machine.run(PAGE_PROGRAM).unwrap();

        assert_eq!(*events.borrow(), vec![
            Event::MemoryChange { address: 0x10, value: 0xAB },
            Event::MemoryChange { address: 0x11, value: 0xCD },
        ]);
    }

    #[test]
    fn test_fault_event() {
        let faults = Rc::new(RefCell::new(0));
        let sink = faults.clone();

        let mut machine = machine(&[0x03]);
        machine.add_listener(move |event: &Event| {
            if let Event::Fault(_) = event {
                *sink.borrow_mut() += 1;
            }
        });

        assert!(machine.run(PAGE_PROGRAM).is_err());
        assert_eq!(*faults.borrow(), 1);
    }

    #[test]
    fn test_snapshot_diff() {
        let mut machine = machine(&[0x01, 0x07, 0x01, 0x20, 0x11]);
        let before = machine.snapshot();

        machine.run(PAGE_PROGRAM).unwrap();
        let after = machine.snapshot();

        assert_eq!(before.diff(&after), vec![MemoryDiff { address: 0x20, before: 0, after: 7 }]);
        assert_ne!(before, after);
    }

    #[test]
    fn test_reset() {
        let mut machine = run(&[0x01, 0x07]);
        machine.attach(1, Recorder::new());
        machine.reset();

        assert!(machine.wst.is_empty());
        assert_eq!(machine.ram.peek8(0x0100), 0);
        assert!(machine.bus.is_attached(1));
    }
}
