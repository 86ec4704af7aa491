use std::fs::File;
use std::io::BufWriter;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use uxn::{
    error::{AssemblyError, VerboseAssemblyError},
    symbolic::Program,
};

enum Error {
    Assembly(VerboseAssemblyError),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("uxnasm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assembles source files into binary images")
        .arg(Arg::with_name("source")
             .help("File containing the assembly source")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("output")
             .help("Path of the written image; the symbols are written next to it with a .sym suffix")
             .value_name("OUTPUT")
             .required(true)
             .index(2))
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

    // Both are required arguments.
    let source = args.value_of("source").unwrap_or_default();
    let output = args.value_of("output").unwrap_or_default();

    let logger = logger(args.is_present("verbose"));

    match assemble(source, output, logger) {
        Ok(()) => (),
        Err(Error::IO(io)) => {
            eprintln!("IO error: {}", io);
            std::process::exit(1);
        },
        Err(Error::Assembly(err)) => {
            eprintln!("Assembly error {}", err);
            std::process::exit(1);
        },
    }
}

fn assemble(source_path: &str, output_path: &str, logger: Logger) -> Result<(), Error> {
    let source = std::fs::read_to_string(source_path)?;

    let verbose = |err: AssemblyError| Error::Assembly(err.verbose(&source));

    let rom = Program::parse_with_logger(&source, logger.clone())
        .and_then(|program| program.compile_with_logger(logger))
        .map_err(verbose)?;

    std::fs::write(output_path, rom.bytes())?;

    let symbols = File::create(format!("{}.sym", output_path))?;
    rom.write_symbols(BufWriter::new(symbols))?;

    for label in rom.unused_labels() {
        eprintln!("-- Unused label: {}", label.name);
    }

    for mac in rom.unused_macros() {
        eprintln!("-- Unused macro: {}", mac.name);
    }

    println!("Assembled {} in {} bytes.", output_path, rom.len());

    Ok(())
}
