//! Decide how healthy a `PoolStatus` is
//!
//! There are three independent ways of looking at a pool, selected with
//! `CheckMode`. Each one compares against a warning and a critical threshold,
//! critical is always tested first so it wins when both are crossed.

use std::fmt;
use std::str::FromStr;

use crate::passenger::{Instance, PoolStatus, ProcessEntry};
use crate::Status;

/// What to compare the thresholds against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// `active / max`, thresholds are ratios (0.9 is 90%)
    MaxProc,
    /// Sessions of each process against a multiple of its instance's average
    Spike,
    /// Sessions of each process against an absolute count
    Sessions,
}

impl CheckMode {
    pub fn str_values() -> [&'static str; 3] {
        ["maxproc", "spike", "sessions"]
    }
}

#[derive(Debug, PartialEq)]
pub struct InvalidCheckMode(String);

impl fmt::Display for InvalidCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Invalid check mode '{}', expected one of: {}",
            self.0,
            CheckMode::str_values().join(", ")
        )
    }
}

impl FromStr for CheckMode {
    type Err = InvalidCheckMode;

    fn from_str(s: &str) -> Result<CheckMode, InvalidCheckMode> {
        match s {
            "maxproc" => Ok(CheckMode::MaxProc),
            "spike" => Ok(CheckMode::Spike),
            "sessions" => Ok(CheckMode::Sessions),
            _ => Err(InvalidCheckMode(s.to_owned())),
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            CheckMode::MaxProc => "maxproc",
            CheckMode::Spike => "spike",
            CheckMode::Sessions => "sessions",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warn: f64,
    pub crit: f64,
}

/// A status and the line explaining it
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub message: String,
}

impl Outcome {
    pub fn new<S: Into<String>>(status: Status, message: S) -> Outcome {
        Outcome {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CheckError {
    /// The pool reports a max of zero processes
    DivisionByZero,
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CheckError::DivisionByZero => {
                f.write_str("passenger reports a max pool size of 0, cannot compute usage")
            }
        }
    }
}

impl std::error::Error for CheckError {}

impl PoolStatus {
    /// `active / max`, from the header rather than the instance records
    pub fn load_ratio(&self) -> Result<f64, CheckError> {
        if self.max_capacity == 0 {
            return Err(CheckError::DivisionByZero);
        }
        Ok(self.active_count as f64 / self.max_capacity as f64)
    }
}

/// Run the check selected by `mode` against `status`
pub fn evaluate(status: &PoolStatus, mode: CheckMode, thresholds: Thresholds) -> Outcome {
    match mode {
        CheckMode::MaxProc => check_max_proc(status, thresholds),
        CheckMode::Spike => check_spike(status, thresholds),
        CheckMode::Sessions => check_sessions(status, thresholds),
    }
}

fn check_max_proc(status: &PoolStatus, Thresholds { warn, crit }: Thresholds) -> Outcome {
    let ratio = match status.load_ratio() {
        Ok(ratio) => ratio,
        Err(e) => return Outcome::new(Status::Unknown, e.to_string()),
    };
    let usage = format!(
        "{} of {} processes active ({:.1}%)",
        status.active_count,
        status.max_capacity,
        ratio * 100.0
    );
    if ratio > crit {
        Outcome::new(
            Status::Critical,
            format!("{} (greater than {:.1}%)", usage, crit * 100.0),
        )
    } else if ratio > warn {
        Outcome::new(
            Status::Warning,
            format!("{} (greater than {:.1}%)", usage, warn * 100.0),
        )
    } else {
        Outcome::new(Status::Ok, usage)
    }
}

/// The first process, in status order, with more sessions than `factor`
/// times its instance's average
fn first_spike(status: &PoolStatus, factor: f64) -> Option<(&Instance, &ProcessEntry, f64)> {
    status.instances.iter().find_map(|instance| {
        let avg = instance.average_sessions()?;
        instance
            .processes
            .iter()
            .find(|p| p.sessions as f64 > avg * factor)
            .map(|p| (instance, p, avg))
    })
}

fn check_spike(status: &PoolStatus, Thresholds { warn, crit }: Thresholds) -> Outcome {
    let found = first_spike(status, crit)
        .map(|spike| (Status::Critical, crit, spike))
        .or_else(|| first_spike(status, warn).map(|spike| (Status::Warning, warn, spike)));
    match found {
        Some((level, factor, (instance, process, avg))) => Outcome::new(
            level,
            format!(
                "pid {} in {} has {} sessions, more than {}x the instance average of {:.1}",
                process.pid, instance.directory, process.sessions, factor, avg
            ),
        ),
        None => Outcome::new(
            Status::Ok,
            format!(
                "no process in {} instances has more than {}x its instance average sessions",
                status.instances.len(),
                warn
            ),
        ),
    }
}

fn check_sessions(status: &PoolStatus, Thresholds { warn, crit }: Thresholds) -> Outcome {
    let mut warning = None;
    for (instance, process) in status.processes() {
        let sessions = process.sessions as f64;
        if sessions > crit {
            return Outcome::new(
                Status::Critical,
                format!(
                    "pid {} in {} has {} sessions (greater than {})",
                    process.pid, instance.directory, process.sessions, crit
                ),
            );
        } else if sessions > warn && warning.is_none() {
            warning = Some((instance, process));
        }
    }
    match warning {
        Some((instance, process)) => Outcome::new(
            Status::Warning,
            format!(
                "pid {} in {} has {} sessions (greater than {})",
                process.pid, instance.directory, process.sessions, warn
            ),
        ),
        None => Outcome::new(
            Status::Ok,
            format!(
                "all {} processes have at most {} sessions",
                status.processes().count(),
                warn
            ),
        ),
    }
}
