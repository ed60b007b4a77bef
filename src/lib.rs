//! # Mogidigest
//!
//! Mogidigest is an SMTP relay that turns floods of near-identical mail into
//! periodic digests.
//!
//! Alerting systems tend to send the same notification over and over again.
//! Point them at Mogidigest instead of your real mail server: messages are
//! buffered, similar ones are counted together, and a single summary per
//! batch is relayed upstream once the batch goes quiet (or gets too old).
//!
//! ## Quick Start
//!
//! ```rust
//! use mogidigest::clock::SystemClock;
//! use mogidigest::digest::{BufferLimits, GroupBy, MessageBuffer};
//! use mogidigest::smtp::SmtpServer;
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let buffer = Arc::new(MessageBuffer::new(
//!     BufferLimits {
//!         soft: Duration::from_secs(30),
//!         hard: Duration::from_secs(300),
//!     },
//!     GroupBy::header("X-Mogidigest-Batch", ""),
//!     GroupBy::replaced_subject(r"\d+", "#").unwrap(),
//!     Arc::new(SystemClock),
//! ));
//! let server = SmtpServer::new("relay.local", Arc::clone(&buffer), Arc::new(SystemClock));
//!
//! thread::spawn(move || {
//!     server.start("127.0.0.1:2525").unwrap();
//! });
//!
//! // Later, from a timer:
//! for digest in buffer.flush("mogidigest@relay.local") {
//!     println!("{}", digest.render());
//! }
//! ```
//!
//! [`relay::Relay`] bundles the server, the buffer and a periodic flusher.
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address (once per transaction)
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `NOOP` - Do nothing
//! - `VRFY` - Always answered with 252
//! - `RSET` - Rejected with 502
//! - `QUIT` - Close connection
//!
//! ## Batching
//!
//! Two classifiers are involved. The *batch* classifier decides which digest
//! a message ends up in; the *group* classifier decides which messages are
//! counted together inside a digest. A batch is flushed once no message has
//! arrived for the soft limit, or once its first message is older than the
//! hard limit.
//!
//! ## Notes
//!
//! - Runs in-memory only. Buffered messages are lost on restart.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.

pub mod clock;
pub mod digest;
pub mod relay;
pub mod smtp;

pub use digest::{BufferLimits, GroupBy, MessageBuffer, SummaryMessage};
pub use relay::{Relay, RelayConfig};
pub use smtp::{ReceivedMessage, SmtpError, SmtpResponse, SmtpServer, SmtpSession, SmtpState};
