//! Time-windowed buffering of received messages

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::clock::{Clock, Timestamp, elapsed};
use crate::digest::group::GroupBy;
use crate::digest::summary::{SummaryMessage, summarize};
use crate::smtp::ReceivedMessage;

/// How long a batch may stay buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Idle time after the latest message before a batch is flushed
    pub soft: Duration,
    /// Age of the first message after which a batch is flushed regardless
    pub hard: Duration,
}

#[derive(Debug)]
struct Batch {
    first_seen: Timestamp,
    last_seen: Timestamp,
    messages: Vec<ReceivedMessage>,
}

/// Holds received messages until their batch is ready to be summarized.
///
/// A batch is kept while it is both younger than the hard limit and has
/// seen a message within the soft limit. Bursts therefore keep a batch
/// open, but never for longer than the hard limit.
///
/// The buffer is shared between connection threads calling
/// [`add`](Self::add) and a timer calling [`flush`](Self::flush); one lock
/// covers the whole key set, so each call is atomic with respect to the
/// others.
pub struct MessageBuffer {
    limits: BufferLimits,
    /// Decides which digest a message goes into
    batch: GroupBy,
    /// Decides how messages are counted inside a digest
    group: GroupBy,
    clock: Arc<dyn Clock>,
    batches: Mutex<HashMap<String, Batch>>,
}

impl MessageBuffer {
    pub fn new(limits: BufferLimits, batch: GroupBy, group: GroupBy, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            batch,
            group,
            clock,
            batches: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Batch>> {
        // A panicking connection thread must not wedge the relay.
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message to its batch, returning the batch key
    pub fn add(&self, msg: ReceivedMessage) -> String {
        let key = self.batch.key(&msg);
        let now = self.clock.now();

        let mut batches = self.lock();
        let batch = batches.entry(key.clone()).or_insert_with(|| Batch {
            first_seen: now,
            last_seen: now,
            messages: Vec::new(),
        });
        batch.last_seen = now;
        batch.messages.push(msg);

        key
    }

    /// Summarize and remove every batch that is due
    pub fn flush(&self, from: &str) -> Vec<SummaryMessage> {
        let now = self.clock.now();
        let limits = self.limits;
        self.flush_where(from, now, |batch| {
            elapsed(batch.first_seen, now) >= limits.hard
                || elapsed(batch.last_seen, now) >= limits.soft
        })
    }

    /// Summarize and remove every batch, due or not
    pub fn flush_all(&self, from: &str) -> Vec<SummaryMessage> {
        let now = self.clock.now();
        self.flush_where(from, now, |_| true)
    }

    fn flush_where<P>(&self, from: &str, now: Timestamp, due: P) -> Vec<SummaryMessage>
    where
        P: Fn(&Batch) -> bool,
    {
        let mut batches = self.lock();

        let keys: Vec<String> = batches
            .iter()
            .filter(|(_, batch)| due(batch))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| batches.remove(&key).map(|batch| (key, batch)))
            .map(|(key, batch)| {
                debug!(batch = %key, messages = batch.messages.len(), "Flushing batch");
                summarize(&self.group, from, batch.messages, now)
            })
            .collect()
    }

    /// Number of batches currently buffered
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of messages currently buffered, across all batches
    pub fn message_count(&self) -> usize {
        self.lock().values().map(|batch| batch.messages.len()).sum()
    }
}
