//! Check the process pool of a Phusion Passenger server
//!
//! Reads every status pipe that passenger-status exposes and alerts on the
//! first pool that is too busy, or that has a process hogging sessions.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use structopt::clap::ErrorKind;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use passenger_plugins::passenger::check::{CheckMode, Outcome, Thresholds};
use passenger_plugins::probe::Probe;
use passenger_plugins::Status;

/// Check the process pool of a Phusion Passenger server
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-passenger (part of passenger-plugins)",
    setting = structopt::clap::AppSettings::ColoredHelp,
    after_help = "Check Modes:

    maxproc   Compare active processes to the configured max. Thresholds
              are ratios, so '-w 0.8 -c 0.95' warns at 80% busy.

    spike     Compare the sessions of every process to the average sessions
              of the processes serving the same application. Thresholds are
              multipliers, so '-w 2 -c 3' goes critical when a process has
              more than three times the average.

    sessions  Compare the sessions of every process to an absolute count.

Examples:

    Go critical when more than 95% of the pool is busy:

        check-passenger --mode maxproc -w 0.8 -c 0.95

    Warn about any process with more than 20 sessions:

        check-passenger --mode sessions -w 20 -c 50"
)]
struct Args {
    #[structopt(
        short = "m",
        long = "mode",
        default_value = "maxproc",
        help = "What to check. One of: maxproc spike sessions"
    )]
    mode: CheckMode,
    #[structopt(
        short = "w",
        long = "warn",
        default_value = "0.8",
        help = "Threshold to warn at, see Check Modes for units"
    )]
    warn: f64,
    #[structopt(
        short = "c",
        long = "crit",
        default_value = "0.9",
        help = "Threshold to go critical at, see Check Modes for units"
    )]
    crit: f64,
    #[structopt(
        long = "dir",
        default_value = "/tmp",
        parse(from_os_str),
        help = "Directory containing the passenger status pipes"
    )]
    dir: PathBuf,
    #[structopt(
        long = "pattern",
        default_value = r"^passenger_status\..*\.fifo$",
        help = "Regex that status pipe file names must match"
    )]
    pattern: String,
    #[structopt(
        long = "timeout",
        name = "SECONDS",
        default_value = "10",
        help = "How long to wait for passenger to write each pipe"
    )]
    timeout: u64,
    #[structopt(
        long = "no-feeds",
        default_value = "unknown",
        help = "Status when no pipes are found. One of: ok warning critical unknown"
    )]
    no_feeds: Status,
    #[structopt(
        short = "v",
        long = "verbose",
        help = "Log what was parsed to stderr"
    )]
    verbose: bool,
}

impl Args {
    /// Turn the arguments into a probe, or explain why we can't
    fn probe(&self) -> Result<(Probe, Regex), Outcome> {
        if !self.warn.is_finite() || !self.crit.is_finite() {
            return Err(Outcome::new(
                Status::Unknown,
                format!(
                    "thresholds must be finite numbers, got --warn {} --crit {}",
                    self.warn, self.crit
                ),
            ));
        }
        let pattern = Regex::new(&self.pattern).map_err(|e| {
            Outcome::new(
                Status::Unknown,
                format!("invalid --pattern '{}': {}", self.pattern, e),
            )
        })?;
        let probe = Probe {
            mode: self.mode,
            thresholds: Thresholds {
                warn: self.warn,
                crit: self.crit,
            },
            no_feeds: self.no_feeds,
        };
        Ok((probe, pattern))
    }
}

/// Parse the command line into a ready to run probe
///
/// Bad arguments come back as an UNKNOWN outcome so that they are reported
/// on stdout with exit code 3 like every other failure. `--help` and
/// `--version` still print and exit 0.
fn parse_args<I, T>(argv: I) -> Result<(Args, Probe, Regex), Outcome>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::from_iter_safe(argv) {
        Ok(args) => args,
        Err(e) => match e.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => e.exit(),
            _ => return Err(Outcome::new(Status::Unknown, usage_error(&e.message))),
        },
    };
    let (probe, pattern) = args.probe()?;
    Ok((args, probe, pattern))
}

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[0-9;]*m").unwrap();
}

/// The first line of a clap error, without colors or its `error:` prefix
fn usage_error(message: &str) -> String {
    let plain = ANSI_ESCAPE.replace_all(message, "");
    let first = plain.lines().next().unwrap_or("invalid arguments").trim();
    first.trim_start_matches("error:").trim().to_owned()
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let (args, probe, pattern) = match parse_args(env::args_os()) {
        Ok(parsed) => parsed,
        Err(outcome) => outcome.print_and_exit(),
    };
    init_logging(args.verbose);

    probe
        .check_pipes(&args.dir, &pattern, Duration::from_secs(args.timeout))
        .print_and_exit();
}
