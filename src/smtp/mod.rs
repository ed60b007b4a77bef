//! Inbound SMTP front end

pub mod commands;
pub mod error;
pub mod message;
pub mod response;
pub mod server;
pub mod session;

pub use commands::{Command, parse_command};
pub use error::{SmtpError, SmtpLimits};
pub use message::{Headers, ReceivedMessage};
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
