//! Runs the Alto microcode engine headless: load the microcode and
//! PROM images, run for a while, and report what happened.
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::time::Duration;

use clap::ArgAction::Set;
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use cpu::{
    constant_words_from_bytes, microcode_words_from_bytes, Alto, Configuration, StoreLayout,
    TaskState,
};

mod pace;

use pace::Pacer;

/// How much simulated time passes between checks of the wall clock.
const PACING_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Fail(String);

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for Fail {}

/// Run Xerox Alto microcode without any peripherals
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// Microcode image: every page of the control store, ROM first,
    /// as big-endian 32-bit words.
    #[clap(action = Set)]
    microcode: OsString,

    /// Constant PROM image (256 big-endian 16-bit words).
    #[clap(action = Set, long)]
    constants: OsString,

    /// Instruction dispatch PROM image (256 bytes).
    #[clap(action = Set, long)]
    dispatch: OsString,

    /// Control store layout: 1k1k, 2k1k or 1k3k.
    #[clap(action = Set, long, default_value = "1k1k")]
    layout: String,

    /// Number of S register banks (1 or 8).
    #[clap(action = Set, long, default_value_t = 1)]
    s_banks: usize,

    /// Additional tasks (octal) which may use the control RAM.
    #[clap(long = "ram-task", value_parser = parse_task)]
    ram_tasks: Vec<TaskNumber>,

    /// Simulated time to run for, in milliseconds.
    #[clap(action = Set, long, default_value_t = 100)]
    run_ms: u64,

    /// Ethernet host address (octal), as read by RSNF.
    #[clap(action = Set, long, default_value = "42", value_parser = parse_serial)]
    ethernet_serial: u8,

    /// Run this many times faster than real-time ('MAX' for
    /// as-fast-as-possible).
    #[clap(action = Set, long, default_value = "MAX")]
    speed_multiplier: String,

    /// Write a snapshot of the final machine state (as JSON) here.
    #[clap(action = Set, long)]
    snapshot: Option<OsString>,
}

fn parse_serial(s: &str) -> Result<u8, String> {
    u8::from_str_radix(s, 8).map_err(|e| format!("'{s}' is not an octal byte: {e}"))
}

fn parse_task(s: &str) -> Result<TaskNumber, String> {
    let n = u8::from_str_radix(s, 8).map_err(|e| format!("'{s}' is not an octal number: {e}"))?;
    TaskNumber::try_from(n).map_err(|e| e.to_string())
}

fn parse_multiplier(s: &str) -> Result<Option<f64>, Fail> {
    if s == "MAX" {
        event!(Level::INFO, "--speed-multiplier=MAX, running at maximum speed");
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(x) if x > 0.0 => {
            event!(
                Level::INFO,
                "--speed-multiplier={}, running at speed multiplier {}",
                s,
                x
            );
            Ok(Some(x))
        }
        Ok(_) => Err(Fail(format!("speed multiplier {s} must be positive"))),
        Err(e) => Err(Fail(format!("bad speed multiplier {s}: {e}"))),
    }
}

fn read_file(what: &str, name: &OsString) -> Result<Vec<u8>, Fail> {
    fs::read(name).map_err(|e| Fail(format!("failed to read {what} file {name:?}: {e}")))
}

fn report(alto: &Alto) {
    let cpu = alto.cpu();
    event!(
        Level::INFO,
        "stopped after {} microcycles ({:?} simulated); task {} at micro-PC {}",
        cpu.cycles,
        alto.now(),
        cpu.task,
        cpu.mpc
    );
    for task in TaskNumber::all() {
        let elapsed = cpu.tasks[task.index()].elapsed;
        if elapsed.is_zero() {
            continue;
        }
        let state = match cpu.task_state(task) {
            TaskState::Active => "active",
            TaskState::Requesting => "requesting",
            TaskState::Idle => "idle",
        };
        event!(
            Level::INFO,
            "task {} ({}): {:?} of processor time, now {}",
            task,
            task.name(),
            elapsed,
            state
        );
    }
    event!(
        Level::INFO,
        "emulator: IR={:06o} carry={} skip={}; {} timer event(s) pending",
        cpu.emulator.ir,
        u8::from(cpu.emulator.carry),
        u8::from(cpu.emulator.skip),
        alto.timer().len()
    );
}

fn run_simulator() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let layout = StoreLayout::try_from(cli.layout.as_str())?;
    let config = Configuration {
        layout,
        s_banks: cli.s_banks,
        ram_tasks: cli.ram_tasks.clone(),
        ethernet_serial: cli.ethernet_serial,
    };
    let microcode = microcode_words_from_bytes(&read_file("microcode", &cli.microcode)?)?;
    let constants = constant_words_from_bytes(&read_file("constant PROM", &cli.constants)?)?;
    let dispatch = read_file("dispatch PROM", &cli.dispatch)?;
    let multiplier = parse_multiplier(&cli.speed_multiplier)?;

    let mut alto = Alto::new(config, &microcode, &constants, &dispatch)?;
    event!(Level::DEBUG, "initial CPU state is {:?}", alto.cpu());

    let run_time = Duration::from_millis(cli.run_ms);
    let pacer = Pacer::new(multiplier);
    {
        let span = span!(Level::INFO, "run", limit=?run_time);
        let _enter = span.enter();
        while alto.now() < run_time {
            let chunk = PACING_INTERVAL.min(run_time - alto.now());
            alto.run_for(chunk);
            pacer.wait_until(alto.now());
        }
    }
    report(&alto);

    if let Some(name) = cli.snapshot.as_ref() {
        let json = serde_json::to_string(&alto.snapshot())?;
        fs::write(name, json)
            .map_err(|e| Fail(format!("failed to write snapshot file {name:?}: {e}")))?;
        event!(Level::INFO, "wrote snapshot to {:?}", name);
    }
    Ok(())
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
