use std::cell::RefCell;
use std::rc::Rc;

use slog::{o, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use uxn::{
    device::Recorder,
    emulator::Machine,
    error::{FaultKind, StackKind},
    event::Event,
    memory::PAGE_PROGRAM,
    symbolic,
};

fn logger() -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn compile_program() -> uxn::Rom {
    let source_code = include_str!("subroutine.tal");

    let program = symbolic::Program::parse_with_logger(source_code, logger())
        .expect("could not parse the source code");

    program.compile_with_logger(logger())
        .expect("could not assemble the source code")
}

#[test]
fn test_subroutine_symbols() {
    let rom = compile_program();

    assert!(rom.symbol("print-hex/digit").is_some());

    // Constants are not memory resident.
    assert_eq!(rom.symbol("first"), None);
    assert_eq!(rom.symbol_table.get_symbol_by_label("first").map(|l| l.address), Some(0x03));

    let unused: Vec<_> = rom.unused_macros().collect();
    assert!(unused.is_empty());

    // LIT 03 LIT2 square JSR2
    assert_eq!(&rom.bytes()[..3], &[0x01, 0x03, 0x21]);
}

#[test]
fn test_subroutine_emulate() {
    let rom = compile_program();

    let console = Recorder::new();

    let mut machine = Machine::with_logger(logger());
    machine.attach(0x1, console.clone());
    rom.load_into(&mut machine);

    machine.run(PAGE_PROGRAM).expect("subroutine.tal faulted");

    assert_eq!(console.written(), b"09\n90\n".to_vec());
    assert!(machine.wst.is_empty());
    assert!(machine.rst.is_empty());
}

#[test]
fn test_subroutine_fault() {
    let rom = compile_program();
    let square = rom.symbol("square").expect("square is defined");

    let faults = Rc::new(RefCell::new(Vec::new()));
    let log = faults.clone();

    let mut machine = Machine::new();
    machine.add_listener(move |event: &Event| {
        if let Event::Fault(fault) = event {
            log.borrow_mut().push(*fault);
        }
    });

    rom.load_into(&mut machine);

    // Calling the subroutine with an empty stack underflows on the first DUP.
    let fault = machine.run(square).unwrap_err();

    assert_eq!(fault.kind, FaultKind::StackUnderflow);
    assert_eq!(fault.stack, StackKind::Working);
    assert_eq!(fault.pc, square);
    assert!(machine.halted);
    assert_eq!(*faults.borrow(), vec![fault]);
}
