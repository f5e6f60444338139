//! Structs for the status that Passenger writes into its status pipes
//!
//! The format is a small fixed header followed by one record per application
//! directory:
//!
//! ```text
//! ----------- General information -----------
//! max      = 6
//! count    = 2
//! active   = 1
//! inactive = 1
//! Using global queue: no
//! Waiting on global queue: 0
//!
//! ----------- Applications -----------
//! /var/www/shop/current:
//!   PID: 2301    Sessions: 1
//!   PID: 2302    Sessions: 0
//! ```
//!
//! The header is parsed strictly, anything missing there is a
//! `ParseStatusError`. Process lines are parsed leniently: lines that don't
//! look like `PID: <n> Sessions: <n>` are dropped.

use std::fmt;
use std::result::Result as StdResult;
use std::str::{FromStr, Lines};

use lazy_static::lazy_static;
use regex::Regex;

pub mod check;

lazy_static! {
    static ref PROCESS_LINE: Regex =
        Regex::new(r"^\s*PID:\s+(\d+)\s+Sessions:\s+(\d+)\s*$").unwrap();
}

/// The header of the status is missing something, or has something that
/// isn't a number where a number belongs
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatusError {
    /// The input ended before we got to this field
    MissingLine { field: &'static str },
    /// The line for this field doesn't contain its delimiter
    MissingDelimiter {
        field: &'static str,
        delimiter: char,
        line: String,
    },
    /// The value of a numeric field couldn't be parsed
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        use self::ParseStatusError::*;
        match self {
            MissingLine { field } => write!(f, "status ended before the '{}' line", field),
            MissingDelimiter {
                field,
                delimiter,
                line,
            } => write!(
                f,
                "expected '{}' in the '{}' line, got '{}'",
                delimiter, field, line
            ),
            InvalidNumber { field, value } => {
                write!(f, "unable to parse '{}' as a number for '{}'", value, field)
            }
        }
    }
}

impl std::error::Error for ParseStatusError {}

pub type Result<T> = StdResult<T, ParseStatusError>;

/// Everything `passenger-status` told us about one process pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// The most processes passenger is allowed to spawn
    pub max_capacity: u64,
    /// Processes currently spawned
    pub current_count: u64,
    /// Processes handling requests right now
    pub active_count: u64,
    /// Spawned but idle processes
    pub inactive_count: u64,
    pub global_queue_enabled: bool,
    /// Requests waiting for a free process in the global queue
    pub global_queue_waiting: u64,
    /// In the order they appear in the status
    pub instances: Vec<Instance>,
}

/// One application directory and the processes serving it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub directory: String,
    pub processes: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub sessions: u64,
}

impl PoolStatus {
    /// Iterate over every process of every instance, in status order
    pub fn processes(&self) -> impl Iterator<Item = (&Instance, &ProcessEntry)> {
        self.instances
            .iter()
            .flat_map(|instance| instance.processes.iter().map(move |p| (instance, p)))
    }
}

impl FromStr for PoolStatus {
    type Err = ParseStatusError;

    /// Parse the full contents of a status pipe
    fn from_str(contents: &str) -> Result<PoolStatus> {
        let mut lines = contents.lines();
        next_line(&mut lines, "banner")?;

        let max_capacity = parse_count("max", &read_attribute(&mut lines, "max", '=')?)?;
        let current_count = parse_count("count", &read_attribute(&mut lines, "count", '=')?)?;
        let active_count = parse_count("active", &read_attribute(&mut lines, "active", '=')?)?;
        let inactive_count =
            parse_count("inactive", &read_attribute(&mut lines, "inactive", '=')?)?;
        let global_queue_enabled = read_attribute(&mut lines, "global queue", ':')? != "no";
        let global_queue_waiting = parse_count(
            "global queue waiting",
            &read_attribute(&mut lines, "global queue waiting", ':')?,
        )?;

        next_line(&mut lines, "section separator")?;
        next_line(&mut lines, "section header")?;

        let instances = split_records(lines)
            .into_iter()
            .map(Instance::from_record)
            .collect();

        Ok(PoolStatus {
            max_capacity,
            current_count,
            active_count,
            inactive_count,
            global_queue_enabled,
            global_queue_waiting,
            instances,
        })
    }
}

impl Instance {
    /// Build an instance from the lines of one record, the first of which
    /// names the directory
    fn from_record(record: Vec<&str>) -> Instance {
        let mut lines = record.into_iter();
        let directory = lines.next().map(str::trim).unwrap_or_default().to_owned();
        let processes = lines.filter_map(ProcessEntry::from_line).collect();
        Instance {
            directory,
            processes,
        }
    }

    /// All sessions handled by this instance's processes
    pub fn total_sessions(&self) -> u64 {
        self.processes.iter().map(|p| p.sessions).sum()
    }

    /// Mean sessions per process, `None` if there are no processes
    pub fn average_sessions(&self) -> Option<f64> {
        if self.processes.is_empty() {
            None
        } else {
            Some(self.total_sessions() as f64 / self.processes.len() as f64)
        }
    }
}

impl ProcessEntry {
    /// `None` for anything that isn't a `PID: <n> Sessions: <n>` line with a
    /// positive pid
    fn from_line(line: &str) -> Option<ProcessEntry> {
        let caps = PROCESS_LINE.captures(line)?;
        let pid: u32 = caps[1].parse().ok()?;
        let sessions = caps[2].parse().ok()?;
        if pid == 0 {
            return None;
        }
        Some(ProcessEntry { pid, sessions })
    }
}

fn next_line<'a>(lines: &mut Lines<'a>, field: &'static str) -> Result<&'a str> {
    lines.next().ok_or(ParseStatusError::MissingLine { field })
}

/// The value of a `<label> <delim> <value>` line: everything after the last
/// delimiter
fn read_attribute(lines: &mut Lines<'_>, field: &'static str, delimiter: char) -> Result<String> {
    let line = next_line(lines, field)?.trim_end();
    match line.rfind(delimiter) {
        Some(idx) => Ok(line[idx + delimiter.len_utf8()..].trim().to_owned()),
        None => Err(ParseStatusError::MissingDelimiter {
            field,
            delimiter,
            line: line.to_owned(),
        }),
    }
}

fn parse_count(field: &'static str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| ParseStatusError::InvalidNumber {
        field,
        value: value.to_owned(),
    })
}

/// Group the remaining lines into blank-line separated records
///
/// Runs of blank lines never produce an empty record.
fn split_records(lines: Lines<'_>) -> Vec<Vec<&str>> {
    let mut records = Vec::new();
    let mut current = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(current);
                current = Vec::new();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}


#[cfg(test)]
mod unit {
    use super::fixtures::status_text;
    use super::*;

    #[rustfmt::skip]
    const TWO_APPS: &str =
"----------- General information -----------
max      = 6
count    = 3
active   = 2
inactive = 1
Using global queue: yes
Waiting on global queue: 4

----------- Applications -----------
/var/www/shop/current:
  PID: 2301    Sessions: 1
  PID: 2302    Sessions: 0

/var/www/blog/current:
  PID: 4410    Sessions: 7
";

    #[test]
    fn can_parse_full_status() {
        let status: PoolStatus = TWO_APPS.parse().unwrap();
        assert_eq!(
            status,
            PoolStatus {
                max_capacity: 6,
                current_count: 3,
                active_count: 2,
                inactive_count: 1,
                global_queue_enabled: true,
                global_queue_waiting: 4,
                instances: vec![
                    Instance {
                        directory: "/var/www/shop/current:".to_owned(),
                        processes: vec![
                            ProcessEntry { pid: 2301, sessions: 1 },
                            ProcessEntry { pid: 2302, sessions: 0 },
                        ],
                    },
                    Instance {
                        directory: "/var/www/blog/current:".to_owned(),
                        processes: vec![ProcessEntry { pid: 4410, sessions: 7 }],
                    },
                ],
            }
        );
    }

    #[test]
    fn instance_and_process_counts_follow_records() {
        let shape: &[(&str, &[(u32, u64)])] = &[
            ("/a", &[(1, 0), (2, 0), (3, 0)][..]),
            ("/b", &[][..]),
            ("/c", &[(4, 1)][..]),
        ];
        let status: PoolStatus = status_text(10, 1, shape).parse().unwrap();
        let counts: Vec<usize> = status
            .instances
            .iter()
            .map(|i| i.processes.len())
            .collect();
        assert_eq!(counts, vec![3, 0, 1]);
        assert_eq!(status.instances[1].directory, "/b:");
    }

    #[test]
    fn garbage_lines_are_dropped() {
        let clean: PoolStatus = TWO_APPS.parse().unwrap();
        let dirty = TWO_APPS.replace(
            "  PID: 2302",
            "  this is not a process\n  PID: abc    Sessions: 2\n  PID: 0    Sessions: 3\n  PID: 2302",
        );
        let dirty: PoolStatus = dirty.parse().unwrap();
        assert_eq!(dirty.instances[0].processes, clean.instances[0].processes);
    }

    #[test]
    fn trailing_whitespace_is_ignored() {
        let clean: PoolStatus = TWO_APPS.parse().unwrap();
        let padded = TWO_APPS
            .lines()
            .map(|l| format!("{}   \t", l))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(padded.parse::<PoolStatus>().unwrap(), clean);
    }

    #[test]
    fn crlf_line_endings_parse() {
        let clean: PoolStatus = TWO_APPS.parse().unwrap();
        let crlf = TWO_APPS.replace('\n', "\r\n");
        assert_eq!(crlf.parse::<PoolStatus>().unwrap(), clean);
    }

    #[test]
    fn parsing_is_repeatable() {
        let first: PoolStatus = TWO_APPS.parse().unwrap();
        let second: PoolStatus = TWO_APPS.parse().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn global_queue_no_means_disabled() {
        let status: PoolStatus = status_text(4, 1, &[]).parse().unwrap();
        assert_eq!(status.global_queue_enabled, false);
        assert!(status.instances.is_empty());
    }

    #[test]
    fn extra_blank_lines_do_not_create_instances() {
        let text = TWO_APPS.replace("\n/var/www/blog", "\n\n\n/var/www/blog");
        let status: PoolStatus = text.parse().unwrap();
        assert_eq!(status.instances.len(), 2);
    }

    #[test]
    fn truncated_header_is_an_error() {
        let truncated = TWO_APPS.lines().take(3).collect::<Vec<_>>().join("\n");
        assert_eq!(
            truncated.parse::<PoolStatus>(),
            Err(ParseStatusError::MissingLine { field: "active" })
        );
        assert_eq!(
            "".parse::<PoolStatus>(),
            Err(ParseStatusError::MissingLine { field: "banner" })
        );
    }

    #[test]
    fn missing_separators_is_an_error() {
        let truncated = TWO_APPS.lines().take(7).collect::<Vec<_>>().join("\n");
        assert_eq!(
            truncated.parse::<PoolStatus>(),
            Err(ParseStatusError::MissingLine {
                field: "section separator"
            })
        );
    }

    #[test]
    fn missing_delimiter_is_an_error() {
        let broken = TWO_APPS.replace("count    = 3", "count 3");
        match broken.parse::<PoolStatus>() {
            Err(ParseStatusError::MissingDelimiter {
                field, delimiter, ..
            }) => {
                assert_eq!(field, "count");
                assert_eq!(delimiter, '=');
            }
            other => panic!("expected a missing delimiter, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_header_is_an_error() {
        let broken = TWO_APPS.replace("max      = 6", "max      = lots");
        assert_eq!(
            broken.parse::<PoolStatus>(),
            Err(ParseStatusError::InvalidNumber {
                field: "max",
                value: "lots".to_owned()
            })
        );
    }

    #[test]
    fn average_sessions_uses_floats() {
        let instance = Instance {
            directory: "/a".to_owned(),
            processes: vec![
                ProcessEntry { pid: 1, sessions: 1 },
                ProcessEntry { pid: 2, sessions: 2 },
            ],
        };
        assert_eq!(instance.total_sessions(), 3);
        assert_eq!(instance.average_sessions(), Some(1.5));

        let empty = Instance {
            directory: "/b".to_owned(),
            processes: vec![],
        };
        assert_eq!(empty.average_sessions(), None);
    }
}
