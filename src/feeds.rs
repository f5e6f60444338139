//! Find and read the pipes that `passenger-status` writes into
//!
//! Passenger exposes its status through named pipes, one per server
//! instance, e.g. `/tmp/passenger_status.1234.fifo`. Reading a pipe blocks
//! until passenger writes the status, so every read gets a deadline.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use std::vec;

use derive_more::From;
use regex::Regex;
use tracing::debug;

pub const DEFAULT_PATTERN: &str = r"^passenger_status\..*\.fifo$";

/// The full contents of one status pipe
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub name: String,
    pub contents: String,
}

/// Feed errors
///
/// Every error from discovering or reading a feed is one of these
#[derive(Debug, From)]
pub enum FeedError {
    /// The directory holding the pipes couldn't be listed
    Discovery(DiscoveryError),
    /// A pipe couldn't be opened or read
    Read(ReadError),
    /// Nothing finished writing to a pipe before the deadline
    Timeout(ReadTimeout),
}

#[derive(Debug)]
pub struct DiscoveryError {
    pub dir: PathBuf,
    pub source: io::Error,
}

#[derive(Debug)]
pub struct ReadError {
    pub path: PathBuf,
    pub source: io::Error,
}

#[derive(Debug)]
pub struct ReadTimeout {
    pub path: PathBuf,
    pub waited: Duration,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::FeedError::*;
        match self {
            Discovery(e) => write!(f, "unable to list {}: {}", e.dir.display(), e.source),
            Read(e) => write!(f, "unable to read {}: {}", e.path.display(), e.source),
            Timeout(e) => write!(
                f,
                "timed out after {}s waiting for {}",
                e.waited.as_secs_f64(),
                e.path.display()
            ),
        }
    }
}

impl std::error::Error for FeedError {}

pub type Result<T> = ::std::result::Result<T, FeedError>;

/// The status pipes in a directory, read one at a time as they're iterated
///
/// Pipes are yielded sorted by path. Nothing is opened until `next` is
/// called, so stopping early leaves the remaining pipes alone.
#[derive(Debug)]
pub struct FifoFeeds {
    paths: vec::IntoIter<PathBuf>,
    timeout: Duration,
}

impl FifoFeeds {
    /// Collect every file in `dir` whose name matches `pattern`
    pub fn discover(dir: &Path, pattern: &Regex, timeout: Duration) -> Result<FifoFeeds> {
        let entries = fs::read_dir(dir).map_err(|source| DiscoveryError {
            dir: dir.to_owned(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            // entries can vanish while we're listing, that's fine
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let matches = entry
                .file_name()
                .to_str()
                .map_or(false, |name| pattern.is_match(name));
            if matches {
                paths.push(entry.path());
            }
        }
        paths.sort();
        debug!(dir = %dir.display(), found = paths.len(), "discovered status pipes");
        Ok(FifoFeeds {
            paths: paths.into_iter(),
            timeout,
        })
    }

    /// The number of pipes not yet read
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for FifoFeeds {
    type Item = Result<Feed>;

    fn next(&mut self) -> Option<Result<Feed>> {
        let path = self.paths.next()?;
        Some(read_with_deadline(path, self.timeout))
    }
}

/// Read the whole file at `path`, giving up after `timeout`
///
/// The read happens on its own thread because opening a pipe with no writer
/// blocks forever. On timeout that thread is abandoned.
pub fn read_with_deadline(path: PathBuf, timeout: Duration) -> Result<Feed> {
    let (tx, rx) = channel();
    let reader_path = path.clone();
    thread::spawn(move || {
        // the receiver is gone if we already timed out
        let _ = tx.send(fs::read(&reader_path));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => {
            debug!(path = %path.display(), bytes = bytes.len(), "read status pipe");
            Ok(Feed {
                name: path.display().to_string(),
                contents: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
        Ok(Err(source)) => Err(ReadError { path, source }.into()),
        Err(RecvTimeoutError::Timeout) => Err(ReadTimeout {
            path,
            waited: timeout,
        }
        .into()),
        Err(RecvTimeoutError::Disconnected) => Err(ReadError {
            path,
            source: io::Error::new(io::ErrorKind::Other, "reader thread exited unexpectedly"),
        }
        .into()),
    }
}

#[cfg(test)]
mod unit {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use regex::Regex;
    use tempfile::tempdir;

    use super::*;

    fn pattern() -> Regex {
        Regex::new(DEFAULT_PATTERN).unwrap()
    }

    #[test]
    fn discovers_matching_files_in_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("passenger_status.200.fifo"), "second").unwrap();
        fs::write(dir.path().join("passenger_status.100.fifo"), "first").unwrap();
        fs::write(dir.path().join("passenger_status.100.fifo.bak"), "nope").unwrap();
        fs::write(dir.path().join("unrelated.fifo"), "nope").unwrap();

        let feeds = FifoFeeds::discover(dir.path(), &pattern(), Duration::from_secs(5)).unwrap();
        assert_eq!(feeds.len(), 2);
        let contents: Vec<String> = feeds.map(|feed| feed.unwrap().contents).collect();
        assert_eq!(contents, vec!["first".to_owned(), "second".to_owned()]);
    }

    #[test]
    fn empty_directory_has_no_feeds() {
        let dir = tempdir().unwrap();
        let mut feeds =
            FifoFeeds::discover(dir.path(), &pattern(), Duration::from_secs(5)).unwrap();
        assert!(feeds.is_empty());
        assert!(feeds.next().is_none());
    }

    #[test]
    fn missing_directory_is_a_discovery_error() {
        let missing = Path::new("/this/directory/does/not/exist");
        match FifoFeeds::discover(missing, &pattern(), Duration::from_secs(5)) {
            Err(FeedError::Discovery(e)) => assert_eq!(e.dir, missing),
            other => panic!("expected a discovery error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passenger_status.1.fifo");
        match read_with_deadline(path.clone(), Duration::from_secs(5)) {
            Err(FeedError::Read(e)) => assert_eq!(e.path, path),
            other => panic!("expected a read error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_is_read_lossily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passenger_status.1.fifo");
        fs::write(&path, b"max = \xff6").unwrap();
        let feed = read_with_deadline(path, Duration::from_secs(5)).unwrap();
        assert_eq!(feed.contents, "max = \u{fffd}6");
    }

    #[cfg(unix)]
    #[test]
    fn pipe_without_writer_times_out() {
        use nix::sys::stat::Mode;
        use nix::unistd::mkfifo;

        let dir = tempdir().unwrap();
        let path = dir.path().join("passenger_status.1.fifo");
        mkfifo(&path, Mode::S_IRWXU).unwrap();

        match read_with_deadline(path.clone(), Duration::from_millis(50)) {
            Err(FeedError::Timeout(e)) => {
                assert_eq!(e.path, path);
                assert_eq!(e.waited, Duration::from_millis(50));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }
}
