use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use uxn::{
    assemble,
    device::Console,
    emulator::Machine,
    memory::PAGE_PROGRAM,
    symbolic,
};

/// A sink whose clones share the written bytes.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_hello_symbols() {
    let rom = assemble(include_str!("hello.tal"))
        .expect("could not assemble hello.tal");

    assert_eq!(rom.symbol("Console/write"), Some(0x0018));
    assert_eq!(rom.symbol("on-reset"), Some(0x0100));
    assert_eq!(&rom.bytes()[..3], &[0x21, 0x01, 0x15]);
    assert_eq!(rom.symbol("text"), Some(0x0115));
    assert_eq!(&rom.bytes()[0x15..], &b"Hello, world!\0"[..]);
}

#[test]
fn test_hello_emulate() {
    let rom = assemble(include_str!("hello.tal"))
        .expect("could not assemble hello.tal");

    let out = SharedBuffer::default();
    let err = SharedBuffer::default();

    let mut machine = Machine::new();
    machine.attach(0x1, Console::new(out.clone(), err.clone()));
    rom.load_into(&mut machine);

    machine.run(PAGE_PROGRAM).expect("hello.tal faulted");

    assert_eq!(out.contents(), b"Hello, world!".to_vec());
    assert!(err.contents().is_empty());
    assert!(machine.wst.is_empty());
    assert!(machine.rst.is_empty());
}

#[test]
fn test_hello_sourcemap() {
    let source = include_str!("hello.tal");

    let compiled = symbolic::Program::parse(source)
        .and_then(symbolic::Program::compile_sourcemap)
        .expect("could not assemble hello.tal");

    let lines = compiled.source_map.into_line_based(source);
    let line = |addr: usize| lines.get_source_span(addr).map(|span| span.start.line);

    // `;text`
    assert_eq!(line(0x0100), Some(6));
    // `LDAk`
    assert_eq!(line(0x0103), Some(8));
    // `#0001 ADD2`
    assert_eq!(line(0x010e), Some(13));
    // the text
    assert_eq!(line(0x0115), Some(15));
}
