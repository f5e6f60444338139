//! Passenger plugins: strongly typed checks for Phusion Passenger pools
//!
//! Checks in here follow the Nagios plugin convention that Sensu also
//! understands: print a single line describing what was found, and exit with
//! the numeric value of a [`Status`].
//!
//! The interesting parts live in [`passenger`], which turns the text that
//! `passenger-status` writes into its pipes into a [`passenger::PoolStatus`],
//! and [`passenger::check`], which decides how worried to be about it. The
//! [`feeds`] and [`probe`] modules glue those together for the
//! `check-passenger` binary.
//!
//! See the [`scripts`] module for the `--help` output of each check.

use std::fmt;
use std::process;
use std::str::FromStr;

pub mod feeds;
pub mod passenger;
pub mod probe;
pub mod scripts;

/// All possible exit statuses of a check
///
/// Statuses are ordered by how bad they are, so `max` picks the worst one.
#[must_use]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    /// Exit the process with the exit code that monitoring systems expect
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }

    /// The numeric value of this status, as used for the exit code
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    /// The strings that `from_str` accepts
    pub fn str_values() -> [&'static str; 4] {
        ["ok", "warning", "critical", "unknown"]
    }
}

#[derive(Debug, PartialEq)]
pub struct InvalidStatus(String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}', expected one of: {}",
            self.0,
            Status::str_values().join(", ")
        )
    }
}

impl std::error::Error for InvalidStatus {}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Status, InvalidStatus> {
        match s {
            "ok" => Ok(Status::Ok),
            "warning" | "warn" => Ok(Status::Warning),
            "critical" | "crit" => Ok(Status::Critical),
            "unknown" => Ok(Status::Unknown),
            _ => Err(InvalidStatus(s.to_owned())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}
