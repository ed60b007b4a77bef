//! Error types for the SMTP front end

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid syntax")]
    InvalidSyntax(String),

    #[error("Bad sequence of commands")]
    BadSequence(String),

    #[error("Command not implemented")]
    NotImplemented(&'static str),

    #[error("Line too long (max {max} characters)")]
    LineTooLong { max: usize },

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },

    #[error("Non-text data encountered")]
    NonTextData,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// SMTP size limits as defined in RFC 821
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a path (reverse-path or forward-path)
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a command line including CRLF
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a text line including CRLF
    pub const TEXT_LINE_MAX_LENGTH: usize = 1000;

    /// Maximum number of recipients per message
    pub const MAX_RECIPIENTS: usize = 100;

    /// Maximum total size of a buffered message
    pub const MAX_DATA_SIZE: usize = 10 * 1024 * 1024; // 10MB
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    pub fn to_response_code(&self) -> u16 {
        match self {
            SmtpError::InvalidCommand
            | SmtpError::InvalidSyntax(_)
            | SmtpError::LineTooLong { .. }
            | SmtpError::PathTooLong { .. } => 500,
            SmtpError::BadSequence(_) => 503,
            SmtpError::NotImplemented(_) => 502,
            SmtpError::TooManyRecipients { .. } => 452,
            SmtpError::Io(_)
            | SmtpError::TooMuchData { .. }
            | SmtpError::NonTextData
            | SmtpError::ConnectionClosed => 451,
        }
    }

    pub fn to_response_message(&self) -> String {
        match self {
            SmtpError::Io(_) => "Local error in processing".to_string(),
            SmtpError::InvalidCommand => "Syntax error, command unrecognized".to_string(),
            SmtpError::InvalidSyntax(msg) => format!("Syntax error: {msg}"),
            SmtpError::BadSequence(msg) => format!("Bad sequence of commands: {msg}"),
            SmtpError::NotImplemented(cmd) => format!("{cmd} not implemented"),
            SmtpError::LineTooLong { max } => format!("Line too long (max {max} characters)"),
            SmtpError::PathTooLong { max } => format!("Path too long (max {max} characters)"),
            SmtpError::TooManyRecipients { max } => format!("Too many recipients (max {max})"),
            SmtpError::TooMuchData { max } => format!("Too much mail data (max {max} bytes)"),
            SmtpError::NonTextData => "Invalid message data".to_string(),
            SmtpError::ConnectionClosed => "Connection closed".to_string(),
        }
    }
}
