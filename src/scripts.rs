//! Documentation about the various scripts contained herein
//!
//! - [check-passenger](#check-passenger)
//!
//! # check-passenger
//!
//! Unix only. Reads the named pipes that `passenger-status` writes to.
//!
//! ```plain
//! $ check-passenger --help
//! check-passenger (part of passenger-plugins) 0.1.0
//! Check the process pool of a Phusion Passenger server
//!
//! USAGE:
//!     check-passenger [FLAGS] [OPTIONS]
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!     -v, --verbose    Log what was parsed to stderr
//!
//! OPTIONS:
//!     -c, --crit <crit>              Threshold to go critical at, see Check Modes for units [default: 0.9]
//!         --dir <dir>                Directory containing the passenger status pipes [default: /tmp]
//!     -m, --mode <mode>              What to check. One of: maxproc spike sessions [default: maxproc]
//!         --no-feeds <no-feeds>      Status when no pipes are found. One of: ok warning critical unknown
//!                                    [default: unknown]
//!         --pattern <pattern>        Regex that status pipe file names must match
//!                                    [default: ^passenger_status\..*\.fifo$]
//!         --timeout <SECONDS>        How long to wait for passenger to write each pipe [default: 10]
//!     -w, --warn <warn>              Threshold to warn at, see Check Modes for units [default: 0.8]
//!
//! Check Modes:
//!
//!     maxproc   Compare active processes to the configured max. Thresholds
//!               are ratios, so '-w 0.8 -c 0.95' warns at 80% busy.
//!
//!     spike     Compare the sessions of every process to the average sessions
//!               of the processes serving the same application. Thresholds are
//!               multipliers, so '-w 2 -c 3' goes critical when a process has
//!               more than three times the average.
//!
//!     sessions  Compare the sessions of every process to an absolute count.
//!
//! Examples:
//!
//!     Go critical when more than 95% of the pool is busy:
//!
//!         check-passenger --mode maxproc -w 0.8 -c 0.95
//!
//!     Warn about any process with more than 20 sessions:
//!
//!         check-passenger --mode sessions -w 20 -c 50
//! ```
//!
//! The check prints a single line, for example
//!
//! ```plain
//! PASSENGER WARNING - 8 of 10 processes active (80.0%) (greater than 75.0%)
//! ```
//!
//! and exits 0, 1, 2 or 3 for OK, WARNING, CRITICAL or UNKNOWN.
