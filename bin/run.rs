use std::path::Path;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use uxn::{
    bytecode::{parse_symbols, ParseError, Rom},
    compiler::SourceMap,
    device::Console,
    emulator::{Exit, Machine},
    error::{AssemblyError, Fault, RomError, VerboseAssemblyError},
    memory::PAGE_PROGRAM,
    symbolic,
};

enum Error {
    Assembly(VerboseAssemblyError),
    Rom(RomError),
    Symbols(ParseError),
    Execution(Fault, Option<String>),
    Budget(u64),
    Argument(String),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<RomError> for Error {
    fn from(e: RomError) -> Error {
        Error::Rom(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("uxnrun")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for assembling and executing programs")
        .arg(Arg::with_name("source")
             .help("File containing assembly source (.tal) or a binary image")
             .value_name("FILE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("budget")
             .help("Stops the program after this many instructions")
             .long("budget")
             .value_name("N")
             .takes_value(true))
        .arg(Arg::with_name("verbose")
             .help("Enables verbose logging")
             .long("verbose")
             .short("v"))
        .get_matches()
}

fn logger(verbose: bool) -> Logger {
    if verbose {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    }
}

fn main() {
    let args = parse_arguments();

    let file_path = args.value_of("source").unwrap_or_default();
    let logger = logger(args.is_present("verbose"));

    let result = args.value_of("budget")
        .map(|budget| budget.parse::<u64>().map_err(|_| Error::Argument(budget.to_string())))
        .transpose()
        .and_then(|budget| run(file_path, budget, logger));

    let message = match result {
        Ok(()) => return,
        Err(Error::IO(io)) => format!("IO error: {}", io),
        Err(Error::Assembly(err)) => format!("Assembly error {}", err),
        Err(Error::Rom(err)) => format!("Invalid image: {}", err),
        Err(Error::Symbols(err)) => format!("Invalid symbol file: {}", err),
        Err(Error::Execution(fault, None)) => format!("Execution error: {}", fault),
        Err(Error::Execution(fault, Some(location))) => format!("Execution error: {} ({})", fault, location),
        Err(Error::Budget(budget)) => format!("Program did not halt within {} instructions", budget),
        Err(Error::Argument(budget)) => format!("Invalid budget: {}", budget),
    };

    eprintln!("{}", message);
    std::process::exit(1);
}

/// Describes where the faulted instruction came from.
type Locate = Box<dyn Fn(u16) -> Option<String>>;

fn assemble(file_path: &str, logger: Logger) -> Result<(Rom, Locate), Error> {
    let source = std::fs::read_to_string(file_path)?;

    let compiled: SourceMap<Rom> = symbolic::Program::parse_with_logger(&source, logger.clone())
        .and_then(|program| uxn::compiler::compile_with_logger(program, logger))
        .map_err(|err: AssemblyError| Error::Assembly(err.verbose(&source)))?;

    let lines = compiled.source_map.into_line_based(&source);

    let locate: Locate = Box::new(move |pc: u16| {
        lines.get_source_span(pc as usize)
            .map(|span| format!("line {}", span))
    });

    Ok((compiled.compiled, locate))
}

fn load(file_path: &str) -> Result<(Rom, Locate), Error> {
    let rom = Rom::from_bytes(&std::fs::read(file_path)?)?;

    let symbols_path = format!("{}.sym", file_path);

    if !Path::new(&symbols_path).exists() {
        let locate: Locate = Box::new(|_: u16| None);
        return Ok((rom, locate));
    }

    let mut symbols = parse_symbols(&std::fs::read(symbols_path)?)
        .map_err(Error::Symbols)?;

    symbols.sort();

    let locate: Locate = Box::new(move |pc: u16| {
        symbols.iter()
            .rev()
            .find(|(address, _)| *address <= pc)
            .map(|(address, name)| format!("{}+{:x}", name, pc - address))
    });

    Ok((rom, locate))
}

fn run(file_path: &str, budget: Option<u64>, logger: Logger) -> Result<(), Error> {
    let (rom, locate) = if file_path.ends_with(".tal") {
        assemble(file_path, logger.clone())?
    } else {
        load(file_path)?
    };

    let mut machine = Machine::with_logger(logger);
    machine.attach(0x1, Console::stdio());
    rom.load_into(&mut machine);

    let result = match budget {
        Some(budget) => machine.run_bounded(PAGE_PROGRAM, budget),
        None => machine.run(PAGE_PROGRAM).map(|_| Exit::Halted),
    };

    match result {
        Ok(Exit::Halted) => Ok(()),
        Ok(Exit::BudgetExhausted) => Err(Error::Budget(budget.unwrap_or_default())),
        Err(fault) => Err(Error::Execution(fault, locate(fault.pc))),
    }
}
