//! Time and host name sources.
//!
//! The relay never reads the wall clock or the host name directly; both are
//! injected so that buffering and session behaviour can be tested
//! deterministically.

use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeDelta, Utc};

pub type Timestamp = DateTime<FixedOffset>;

/// Abstraction over the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Local wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let local_time_now = Local::now();
        local_time_now.with_timezone(local_time_now.offset())
    }
}

/// A clock that only moves when told to.
///
/// ```
/// use mogidigest::clock::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::default();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!((clock.now() - start).num_seconds(), 5);
/// ```
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<Timestamp>,
}

impl MockClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    pub fn set(&self, timestamp: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = timestamp;
    }
}

impl Default for MockClock {
    /// Starts at the Unix epoch, UTC
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH.fixed_offset())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time elapsed between two timestamps, clamped at zero
pub fn elapsed(since: Timestamp, now: Timestamp) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Host name of the machine
pub fn system_hostname() -> io::Result<String> {
    whoami::fallible::hostname()
}

/// Build `name@host`, falling back to `localhost` when the host name is
/// unavailable
pub fn default_from_address<F>(name: &str, hostname: F) -> String
where
    F: FnOnce() -> io::Result<String>,
{
    let host = hostname().unwrap_or_else(|_| "localhost".to_string());
    format!("{name}@{host}")
}
