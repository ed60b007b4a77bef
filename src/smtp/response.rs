//! SMTP response handling

use std::io::{self, Write};

use crate::smtp::error::SmtpError;

/// Represents an SMTP response that can be sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP response code (e.g. 250, 354, 500)
    pub code: u16,
    /// The human-readable message
    pub message: String,
}

impl SmtpResponse {
    /// Create a new SMTP response
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// Create a success response (250 OK)
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// Create a greeting response (220)
    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, &format!("{hostname} Mogidigest ready"))
    }

    /// Create a HELO/EHLO response (250)
    pub fn helo(hostname: &str, client_domain: &str) -> Self {
        Self::new(250, &format!("{hostname} Hello {client_domain}"))
    }

    /// Create a DATA intermediate response (354)
    pub fn data_start() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    /// Create a VRFY response (252)
    pub fn cannot_verify() -> Self {
        Self::new(252, "Cannot VRFY user, but will accept message and attempt delivery")
    }

    /// Create a QUIT response (221)
    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// Create an error response from an error
    pub fn error(error: &SmtpError) -> Self {
        Self::new(error.to_response_code(), &error.to_response_message())
    }

    /// Create a local processing error response (451)
    pub fn local_error(error: &SmtpError) -> Self {
        Self::new(451, &format!("Local error in processing: {error}"))
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        format!("{} {}\r\n", self.code, self.message)
    }

    /// Write the formatted response and flush the writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.format().as_bytes())?;
        writer.flush()
    }

    /// The connection should be closed after this response is sent
    pub fn is_close(&self) -> bool {
        self.code == 221
    }

    /// The client is expected to send the message payload next
    pub fn needs_data(&self) -> bool {
        self.code == 354
    }
}
