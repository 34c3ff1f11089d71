use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use memoracle_core::prelude::*;
use memoracle_utils::{default_log_file, info, init_logging, init_logging_with_file, init_logging_with_level, LogFormat, LogLevel, LoggingGuard};

mod fixture;

use fixture::{Fixture, Loaded};

/// Snapshot the live memory graph of a stopped debuggee.
#[derive(Parser, Debug)]
#[command(name = "memoracle")]
#[command(version)]
#[command(about = "Snapshot the live memory graph of a stopped debuggee", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); `RUST_LOG` applies otherwise
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Also log to this file; `--log-file` alone picks ~/.memoracle/<date>-memoracle.log
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Snapshot a simulated process described by a JSON fixture
    Snapshot
    {
        /// Path to the fixture file
        fixture: PathBuf,
        /// Which block of symbols to start from
        #[arg(long, value_enum, default_value_t = Mode::Locals)]
        mode: Mode,
        /// Frame depth, 0 being the newest frame
        #[arg(long, default_value_t = 0)]
        frame: usize,
        /// Write after the snapshot, then replay the mutations (ADDR=INT:SIZE, ADDR may be a label)
        #[arg(long = "write", value_parser = parse_write)]
        writes: Vec<WriteArg>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Output::Summary)]
        output: Output,
        /// Traversal configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Execution identifier recorded on every exported entry
        #[arg(long)]
        execution: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode
{
    /// Locals of the selected frame
    Locals,
    /// Global variables
    Globals,
    /// Locals of the selected frame and every older frame
    Upward,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Output
{
    /// One JSON object per entry
    Json,
    /// Human-readable pass reports and entries
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteArg
{
    target: String,
    value: i64,
    size: usize,
}

fn parse_write(arg: &str) -> Result<WriteArg, String>
{
    let (target, rest) = arg.split_once('=').ok_or("expected ADDR=INT:SIZE")?;
    let (value, size) = rest.split_once(':').unwrap_or((rest, "4"));
    let value = i64::from_str(value.trim()).map_err(|e| format!("invalid value `{value}`: {e}"))?;
    let size = usize::from_str(size.trim()).map_err(|e| format!("invalid size `{size}`: {e}"))?;
    if !matches!(size, 1 | 2 | 4 | 8) {
        return Err(format!("size must be 1, 2, 4 or 8, got {size}"));
    }
    Ok(WriteArg {
        target: target.trim().to_string(),
        value,
        size,
    })
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn setup_logging(cli: &Cli) -> Result<LoggingGuard, Box<dyn std::error::Error>>
{
    let level = cli.log_level.as_deref().map(LogLevel::from_str).transpose()?;
    let guard = match (&cli.log_file, level) {
        (Some(path), level) => {
            let path = match path {
                Some(path) => path.clone(),
                None => default_log_file()?,
            };
            init_logging_with_file(level, LogFormat::Pretty, path)?
        }
        (None, Some(level)) => init_logging_with_level(level, LogFormat::Pretty)?,
        (None, None) => init_logging()?,
    };
    Ok(guard)
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Snapshot {
            fixture,
            mode,
            frame,
            writes,
            output,
            config,
            execution,
        } => {
            info!("Loading fixture {}", fixture.display());
            let loaded = Fixture::from_file(&fixture)?.load()?;
            let config = match config {
                Some(path) => TraversalConfig::from_file(path)?,
                None => TraversalConfig::default(),
            };
            snapshot(loaded, mode, frame, &writes, output, config, execution)?;
            Ok(())
        }
    }
}

fn snapshot(
    loaded: Loaded,
    mode: Mode,
    depth: usize,
    writes: &[WriteArg],
    output: Output,
    config: TraversalConfig,
    execution: Option<String>,
) -> OracleResult<()>
{
    let frame = loaded.frame(depth)?;
    let mut session = Session::new(loaded.process, config);
    if let Some(execution) = execution {
        session = session.with_execution(execution);
    }

    let mut reports = vec![match mode {
        Mode::Locals => session.serialize_locals(frame)?,
        Mode::Globals => session.serialize_globals(frame)?,
        Mode::Upward => session.serialize_upward(frame)?,
    }];

    for write in writes {
        let address = match loaded.labels.get(&write.target) {
            Some(address) => *address,
            None => Address::parse(&write.target)?,
        };
        info!(%address, value = write.value, size = write.size, "Writing to debuggee");
        session.debuggee_mut().write_int(address, write.value, write.size)?;
    }
    if !writes.is_empty() {
        reports.extend(session.process_mutations()?);
    }

    let stdout = io::stdout();
    match output {
        Output::Json => {
            let mut sink = JsonLinesSink::new(stdout.lock());
            session.export(&mut sink)?;
        }
        Output::Summary => print_summary(&mut stdout.lock(), &session, &reports)?,
    }
    Ok(())
}

fn print_summary(out: &mut impl io::Write, session: &Session<SimProcess>, reports: &[PassReport]) -> io::Result<()>
{
    for report in reports {
        writeln!(
            out,
            "{:?} pass: {} root(s), {} created, {} expanded, {} revisited",
            report.kind,
            report.roots.len(),
            report.created,
            report.expanded,
            report.revisited
        )?;
        for failure in &report.failures {
            writeln!(out, "  failed `{}` in {}: {}", failure.name, failure.frame, failure.error)?;
        }
    }

    let repository = session.repository();
    writeln!(out)?;
    writeln!(out, "{} entries, {} observed address(es)", repository.len(), session.watches().len())?;
    for entry in repository.iter() {
        write!(
            out,
            "  {:<9} {:<12} {}",
            entry.kind.to_string(),
            entry.address.to_string(),
            entry.name
        )?;
        if let Some(value) = &entry.value {
            write!(out, " = {}", value)?;
        }
        if let EntryStatus::Invalid { reason } = &entry.status {
            write!(out, " [invalid: {}]", reason)?;
        }
        writeln!(out)?;
    }
    for conflict in repository.conflicts() {
        writeln!(
            out,
            "  conflict at {}: `{}` vs `{}`",
            conflict.address, conflict.existing, conflict.incoming
        )?;
    }
    out.flush()
}
