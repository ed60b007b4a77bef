//! SMTP session state management

use std::io;
use std::mem;
use std::sync::Arc;

use crate::clock::Clock;
use crate::smtp::commands::Command;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::message::ReceivedMessage;
use crate::smtp::response::SmtpResponse;

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Greeting sent, nothing received yet
    Start,
    /// HELO/EHLO received
    Greeted,
    /// MAIL FROM accepted
    SenderSet,
    /// At least one RCPT TO accepted
    RecipientSet,
    /// DATA accepted; the payload must be read with [`SmtpSession::read_data`]
    Data,
    /// QUIT received
    Closed,
}

/// Drives one client connection from greeting to QUIT.
///
/// The session never touches the network itself: the caller feeds it parsed
/// command lines through [`advance`](Self::advance) and, once a response
/// [needs data](SmtpResponse::needs_data), hands it a line source through
/// [`read_data`](Self::read_data).
pub struct SmtpSession {
    hostname: String,
    clock: Arc<dyn Clock>,
    state: SmtpState,
    greeted: bool,
    received: ReceivedMessage,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(hostname: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            hostname: hostname.to_owned(),
            clock,
            state: SmtpState::Start,
            greeted: false,
            received: ReceivedMessage::new(),
        }
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// The transaction currently being assembled
    pub fn received(&self) -> &ReceivedMessage {
        &self.received
    }

    /// Begin the session and return the greeting
    pub fn start(&mut self) -> SmtpResponse {
        self.state = SmtpState::Start;
        self.greeted = false;
        self.received = ReceivedMessage::new();
        SmtpResponse::greeting(&self.hostname)
    }

    /// Apply one command and return the response for it.
    ///
    /// A command that is rejected leaves the session exactly as it was.
    pub fn advance(&mut self, command: Result<Command, SmtpError>) -> SmtpResponse {
        let result = command.and_then(|command| self.apply(command));
        match result {
            Ok(response) => response,
            Err(e) => SmtpResponse::error(&e),
        }
    }

    fn apply(&mut self, command: Command) -> Result<SmtpResponse, SmtpError> {
        self.check_sequence(&command)?;

        match command {
            Command::Helo(domain) | Command::Ehlo(domain) => {
                self.greeted = true;
                if self.state == SmtpState::Start {
                    self.state = SmtpState::Greeted;
                }
                Ok(SmtpResponse::helo(&self.hostname, &domain))
            }
            Command::Noop => Ok(SmtpResponse::ok()),
            Command::MailFrom(sender) => {
                self.received.from = sender;
                self.state = SmtpState::SenderSet;
                Ok(SmtpResponse::ok())
            }
            Command::RcptTo(recipient) => {
                if self.received.to.len() >= SmtpLimits::MAX_RECIPIENTS {
                    return Err(SmtpError::TooManyRecipients {
                        max: SmtpLimits::MAX_RECIPIENTS,
                    });
                }
                self.received.to.push(recipient);
                self.state = SmtpState::RecipientSet;
                Ok(SmtpResponse::ok())
            }
            Command::Data => {
                self.state = SmtpState::Data;
                Ok(SmtpResponse::data_start())
            }
            Command::Rset => Err(SmtpError::NotImplemented("RSET")),
            Command::Vrfy(_) => Ok(SmtpResponse::cannot_verify()),
            Command::Quit => {
                self.state = SmtpState::Closed;
                Ok(SmtpResponse::quit())
            }
        }
    }

    /// Check that a command is allowed in the current state
    fn check_sequence(&self, command: &Command) -> Result<(), SmtpError> {
        use SmtpState::*;

        let allowed = match (command, self.state) {
            (_, Closed) => false,
            // The payload has to be read before anything else happens.
            (_, Data) => false,
            (Command::MailFrom(_), Start | Greeted) => true,
            (Command::MailFrom(_), _) => false,
            (Command::RcptTo(_), SenderSet | RecipientSet) => true,
            (Command::RcptTo(_), _) => false,
            (Command::Data, RecipientSet) => true,
            (Command::Data, _) => false,
            _ => true,
        };

        if allowed {
            return Ok(());
        }

        let verb = command.verb();
        let reason = match (command, self.state) {
            (_, Closed) => format!("{verb} after QUIT"),
            (_, Data) => format!("{verb} while message data is expected"),
            (Command::MailFrom(_), _) => "sender already specified".to_string(),
            (Command::RcptTo(_), _) => "RCPT requires MAIL first".to_string(),
            (Command::Data, _) => "DATA requires RCPT first".to_string(),
            _ => format!("{verb} not allowed now"),
        };
        Err(SmtpError::BadSequence(reason))
    }

    /// Read the message payload after a 354 response.
    ///
    /// `next_line` must return one line per call, including its line ending.
    /// Reading stops at a line holding a single `.`; other lines starting
    /// with `.` lose one leading dot.
    ///
    /// On success the completed message is returned with a 250 and the
    /// session is ready for the next transaction. An invalid line discards
    /// the transaction entirely and yields a 451 once the terminator has been
    /// read; a read error or end of input yields the 451 right away.
    pub fn read_data<F>(&mut self, mut next_line: F) -> (SmtpResponse, Option<ReceivedMessage>)
    where
        F: FnMut() -> io::Result<Vec<u8>>,
    {
        if self.state != SmtpState::Data {
            let e = SmtpError::BadSequence("DATA must be accepted first".to_string());
            return (SmtpResponse::error(&e), None);
        }

        match read_payload(&mut next_line) {
            Ok(payload) => {
                let mut received = self.finish_transaction();
                received.complete(payload, self.clock.now());
                (SmtpResponse::ok(), Some(received))
            }
            Err(e) => {
                self.finish_transaction();
                (SmtpResponse::local_error(&e), None)
            }
        }
    }

    /// Hand back the current transaction and start a fresh one
    fn finish_transaction(&mut self) -> ReceivedMessage {
        self.state = if self.greeted {
            SmtpState::Greeted
        } else {
            SmtpState::Start
        };
        mem::take(&mut self.received)
    }
}

fn read_payload<F>(next_line: &mut F) -> Result<String, SmtpError>
where
    F: FnMut() -> io::Result<Vec<u8>>,
{
    let mut payload = String::new();
    let mut failure: Option<SmtpError> = None;

    loop {
        let line = next_line()?;
        if line.is_empty() {
            return Err(SmtpError::ConnectionClosed);
        }
        if is_terminator(&line) {
            return match failure {
                Some(e) => Err(e),
                None => Ok(payload),
            };
        }

        // Once a line is rejected, the rest of the payload is still
        // swallowed so that none of it is taken for a command.
        if failure.is_some() {
            continue;
        }
        if let Err(e) = append_line(&mut payload, line) {
            payload.clear();
            failure = Some(e);
        }
    }
}

fn is_terminator(line: &[u8]) -> bool {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &line[..end] == b"."
}

/// Validate one payload line and append it without its stuffed dot
fn append_line(payload: &mut String, line: Vec<u8>) -> Result<(), SmtpError> {
    if line.len() > SmtpLimits::TEXT_LINE_MAX_LENGTH {
        return Err(SmtpError::LineTooLong {
            max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
        });
    }

    let line = String::from_utf8(line).map_err(|_| SmtpError::NonTextData)?;
    if line
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\r' | '\n'))
    {
        return Err(SmtpError::NonTextData);
    }

    let line = line.strip_prefix('.').unwrap_or(&line);
    if payload.len() + line.len() > SmtpLimits::MAX_DATA_SIZE {
        return Err(SmtpError::TooMuchData {
            max: SmtpLimits::MAX_DATA_SIZE,
        });
    }
    payload.push_str(line);
    Ok(())
}
