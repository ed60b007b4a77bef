//! Wiring of the SMTP server, the message buffer and the upstream

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::clock::Clock;
use crate::digest::{BufferLimits, GroupBy, MessageBuffer, SummaryMessage, Upstream};
use crate::smtp::{SmtpError, SmtpServer};

/// Everything needed to run a relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the SMTP server listens on
    pub bind: String,
    /// Name announced in the greeting and HELO responses
    pub hostname: String,
    /// Sender address of the digests
    pub from: String,
    pub limits: BufferLimits,
    /// Time between two flush checks
    pub flush_interval: Duration,
    pub read_timeout: Option<Duration>,
    /// Which digest a message goes into
    pub batch: GroupBy,
    /// How messages are counted inside a digest
    pub group: GroupBy,
}

/// Periodically moves due batches from the buffer to the upstream
pub struct Flusher {
    buffer: Arc<MessageBuffer>,
    upstream: Arc<dyn Upstream>,
    from: String,
}

impl Flusher {
    pub fn new(buffer: Arc<MessageBuffer>, upstream: Arc<dyn Upstream>, from: &str) -> Self {
        Self {
            buffer,
            upstream,
            from: from.to_owned(),
        }
    }

    /// Deliver every due batch, returning how many digests were sent
    pub fn flush(&self) -> usize {
        let summaries = self.buffer.flush(&self.from);
        self.deliver(summaries)
    }

    /// Deliver every batch regardless of the limits
    pub fn drain(&self) -> usize {
        let summaries = self.buffer.flush_all(&self.from);
        self.deliver(summaries)
    }

    fn deliver(&self, summaries: Vec<SummaryMessage>) -> usize {
        let mut delivered = 0;
        for summary in &summaries {
            match self.upstream.send(summary) {
                Ok(()) => delivered += 1,
                Err(e) => error!(subject = %summary.subject, "Failed to deliver digest: {e}"),
            }
        }
        if !summaries.is_empty() {
            info!(delivered, total = summaries.len(), "Flushed digests");
        }
        delivered
    }

    /// Flush every `interval` until `stop` fires or is dropped, then drain
    pub fn run(self, interval: Duration, stop: Receiver<()>) {
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.flush();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.drain();
    }
}

/// A running relay: SMTP server in front, digests out the back
pub struct Relay {
    config: RelayConfig,
    clock: Arc<dyn Clock>,
    upstream: Arc<dyn Upstream>,
}

impl Relay {
    pub fn new(config: RelayConfig, clock: Arc<dyn Clock>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config,
            clock,
            upstream,
        }
    }

    /// Bind the configured address and serve until the listener fails
    pub fn run(self) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(&self.config.bind)?;
        self.run_with_listener(listener)
    }

    /// Serve on an existing listener (blocking).
    ///
    /// Buffered messages are drained to the upstream when the server stops.
    pub fn run_with_listener(self, listener: TcpListener) -> Result<(), SmtpError> {
        let config = self.config;
        let buffer = Arc::new(MessageBuffer::new(
            config.limits,
            config.batch,
            config.group,
            Arc::clone(&self.clock),
        ));

        let flusher = Flusher::new(Arc::clone(&buffer), self.upstream, &config.from);
        let (stop, stopped) = mpsc::channel();
        let interval = config.flush_interval;
        let flush_thread = thread::spawn(move || flusher.run(interval, stopped));

        info!(
            from = %config.from,
            soft_limit = ?config.limits.soft,
            hard_limit = ?config.limits.hard,
            "Relay started"
        );

        let server = SmtpServer::new(&config.hostname, buffer, self.clock)
            .with_read_timeout(config.read_timeout);
        let result = server.start_with_listener(listener);

        drop(stop);
        if flush_thread.join().is_err() {
            error!("Flush thread panicked");
        }
        result
    }
}
