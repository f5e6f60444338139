//! Run a check over every status feed and report the result
//!
//! Feeds are checked in order and the first one that isn't OK decides the
//! outcome of the whole run. Feeds that can't be read or parsed are UNKNOWN,
//! and stop the run just the same.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use derive_more::From;
use regex::Regex;
use tracing::{debug, warn};

use crate::feeds::{Feed, FeedError, FifoFeeds};
use crate::passenger::check::{evaluate, CheckMode, Outcome, Thresholds};
use crate::passenger::{ParseStatusError, PoolStatus};
use crate::Status;

/// Identifies this check in its status line
pub const LABEL: &str = "PASSENGER";

/// Anything that stops us from checking a feed at all
#[derive(Debug, From)]
pub enum ProbeError {
    Feed(FeedError),
    Parse(ParseStatusError),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeError::Feed(e) => write!(f, "{}", e),
            ProbeError::Parse(e) => write!(f, "malformed passenger status: {}", e),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Everything needed to decide the health of the feeds
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub mode: CheckMode,
    pub thresholds: Thresholds,
    /// Reported when there are no feeds at all
    pub no_feeds: Status,
}

impl Probe {
    pub fn new(mode: CheckMode, thresholds: Thresholds) -> Probe {
        Probe {
            mode,
            thresholds,
            no_feeds: Status::Unknown,
        }
    }

    /// Find the status pipes in `dir` and check each of them
    pub fn check_pipes(&self, dir: &Path, pattern: &Regex, timeout: Duration) -> Outcome {
        match FifoFeeds::discover(dir, pattern, timeout) {
            Ok(feeds) => self.run(feeds),
            Err(e) => {
                warn!(error = %e, "unable to discover status pipes");
                Outcome::new(Status::Unknown, e.to_string())
            }
        }
    }

    /// Check each feed in turn, stopping at the first one that isn't OK
    pub fn run<I>(&self, feeds: I) -> Outcome
    where
        I: IntoIterator<Item = Result<Feed, FeedError>>,
    {
        let mut last_ok = None;
        let mut checked = 0;
        for feed in feeds {
            let outcome = match self.check_feed(feed) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "unable to check feed");
                    return Outcome::new(Status::Unknown, e.to_string());
                }
            };
            checked += 1;
            if outcome.status != Status::Ok {
                return outcome;
            }
            last_ok = Some(outcome);
        }

        match last_ok {
            None => Outcome::new(self.no_feeds, "no passenger status pipe found"),
            Some(outcome) if checked > 1 => Outcome::new(
                Status::Ok,
                format!("{} ({} pools checked)", outcome.message, checked),
            ),
            Some(outcome) => outcome,
        }
    }

    fn check_feed(&self, feed: Result<Feed, FeedError>) -> Result<Outcome, ProbeError> {
        let feed = feed?;
        let status: PoolStatus = feed.contents.parse()?;
        debug!(
            feed = %feed.name,
            max = status.max_capacity,
            active = status.active_count,
            instances = status.instances.len(),
            "parsed passenger status"
        );
        let outcome = evaluate(&status, self.mode, self.thresholds);
        debug!(feed = %feed.name, mode = %self.mode, status = %outcome.status, "evaluated feed");
        Ok(outcome)
    }
}

impl Outcome {
    /// The single line that monitoring systems read
    pub fn status_line(&self) -> String {
        format!("{} {} - {}", LABEL, self.status, self.message)
    }

    /// Print the status line and exit with the status' code
    pub fn print_and_exit(self) -> ! {
        println!("{}", self.status_line());
        self.status.exit()
    }
}
