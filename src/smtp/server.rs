//! SMTP server implementation

use crate::clock::Clock;
use crate::digest::MessageBuffer;
use crate::smtp::commands::parse_command;
use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Accepts SMTP connections and pushes every completed message into a
/// shared [`MessageBuffer`]
#[derive(Clone)]
pub struct SmtpServer {
    /// Server hostname
    hostname: String,
    buffer: Arc<MessageBuffer>,
    clock: Arc<dyn Clock>,
    read_timeout: Option<Duration>,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(hostname: &str, buffer: Arc<MessageBuffer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hostname: hostname.to_owned(),
            buffer,
            clock,
            read_timeout: None,
        }
    }

    /// Give up on clients that stay silent for longer than `timeout`
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Start the server with an existing listener (blocking).
    ///
    /// Every connection is served on its own thread.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(addr = %listener.local_addr()?, "SMTP server listening");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    thread::spawn(move || {
                        let peer = stream.peer_addr().ok();
                        if let Err(e) = server.handle_client(stream) {
                            warn!(?peer, "Error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(&self, mut stream: TcpStream) -> Result<(), SmtpError> {
        let peer: Option<SocketAddr> = stream.peer_addr().ok();
        debug!(?peer, "Connection accepted");

        stream.set_read_timeout(self.read_timeout)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut session = SmtpSession::new(&self.hostname, Arc::clone(&self.clock));

        session.start().write_to(&mut stream)?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();
            if reader.read_until(b'\n', &mut line_buffer)? == 0 {
                break; // Connection closed
            }

            let line = String::from_utf8_lossy(&line_buffer);
            if line.trim().is_empty() {
                continue;
            }

            let response = session.advance(parse_command(&line));
            response.write_to(&mut stream)?;

            if response.is_close() {
                break;
            }
            if !response.needs_data() {
                continue;
            }

            let (response, received) = session.read_data(|| read_line(&mut reader));

            // Buffer before acknowledging, so a 250 means the message is held.
            let accepted = match received {
                Some(msg) => {
                    let from = msg.from.clone();
                    let recipients = msg.to.len();
                    let batch = self.buffer.add(msg);
                    info!(?peer, %from, recipients, %batch, "Message accepted");
                    true
                }
                None => false,
            };
            response.write_to(&mut stream)?;

            if !accepted && !stream_alive(&mut reader) {
                break;
            }
        }

        debug!(?peer, "Connection closed");
        Ok(())
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    Ok(line)
}

/// Whether more input may still arrive on the connection
fn stream_alive<R: BufRead>(reader: &mut R) -> bool {
    matches!(reader.fill_buf(), Ok(buf) if !buf.is_empty())
}
