//! Delivery of digests

use std::time::Duration;

use lettre::address::{AddressError, Envelope};
use lettre::{Address, SmtpTransport, Transport};
use thiserror::Error;
use tracing::info;

use crate::digest::summary::SummaryMessage;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        source: AddressError,
    },

    #[error("Invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Somewhere to send finished digests
pub trait Upstream: Send + Sync {
    fn send(&self, summary: &SummaryMessage) -> Result<(), DeliveryError>;
}

/// Relays digests to an SMTP server
pub struct SmtpUpstream {
    transport: SmtpTransport,
    /// Replaces the digest's own recipients when not empty
    recipients: Vec<String>,
}

impl SmtpUpstream {
    /// Plain-text SMTP relay at `host:port`
    pub fn new(host: &str, port: u16, recipients: Vec<String>) -> Self {
        let transport = SmtpTransport::builder_dangerous(host)
            .port(port)
            .timeout(Some(Duration::from_secs(30)))
            .build();
        Self {
            transport,
            recipients,
        }
    }

    fn envelope(&self, summary: &SummaryMessage) -> Result<Envelope, DeliveryError> {
        let recipients = if self.recipients.is_empty() {
            &summary.to
        } else {
            &self.recipients
        };

        let to = recipients
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Envelope::new(Some(parse_address(&summary.from)?), to)?)
    }
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .parse()
        .map_err(|source| DeliveryError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

impl Upstream for SmtpUpstream {
    fn send(&self, summary: &SummaryMessage) -> Result<(), DeliveryError> {
        let envelope = self.envelope(summary)?;
        self.transport.send_raw(&envelope, &summary.to_bytes())?;
        info!(
            subject = %summary.subject,
            recipients = envelope.to().len(),
            "Digest delivered"
        );
        Ok(())
    }
}

/// Writes digests to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUpstream;

impl Upstream for LogUpstream {
    fn send(&self, summary: &SummaryMessage) -> Result<(), DeliveryError> {
        info!(
            subject = %summary.subject,
            to = %summary.to.join(", "),
            "Digest ready\n{}",
            summary.render()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::digest::group::GroupBy;
    use crate::digest::summary::summarize;
    use crate::smtp::ReceivedMessage;

    fn summary(to: &[&str]) -> SummaryMessage {
        let mut msg = ReceivedMessage::new();
        msg.to = to.iter().map(|s| s.to_string()).collect();
        msg.complete("Subject: s\r\n\r\n".to_string(), MockClock::default().now());
        summarize(
            &GroupBy::same_subject(),
            "relay@example.com",
            vec![msg],
            MockClock::default().now(),
        )
    }

    #[test]
    fn test_envelope_uses_digest_recipients() {
        let upstream = SmtpUpstream::new("localhost", 25, Vec::new());
        let envelope = upstream.envelope(&summary(&["b@example.com", "a@example.com"])).unwrap();

        let to: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        assert_eq!(to, ["a@example.com", "b@example.com"]);
        assert_eq!(
            envelope.from().map(ToString::to_string),
            Some("relay@example.com".to_string())
        );
    }

    #[test]
    fn test_envelope_recipient_override() {
        let upstream = SmtpUpstream::new("localhost", 25, vec!["oncall@example.com".to_string()]);
        let envelope = upstream.envelope(&summary(&["a@example.com"])).unwrap();

        let to: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        assert_eq!(to, ["oncall@example.com"]);
    }

    #[test]
    fn test_envelope_invalid_address() {
        let upstream = SmtpUpstream::new("localhost", 25, Vec::new());
        let result = upstream.envelope(&summary(&["not an address"]));
        assert!(matches!(result, Err(DeliveryError::InvalidAddress { .. })));
    }

    #[test]
    fn test_envelope_without_recipients() {
        let upstream = SmtpUpstream::new("localhost", 25, Vec::new());
        let result = upstream.envelope(&summary(&[]));
        assert!(matches!(result, Err(DeliveryError::Envelope(_))));
    }

    #[test]
    fn test_log_upstream() {
        assert!(LogUpstream.send(&summary(&["a@example.com"])).is_ok());
    }
}
