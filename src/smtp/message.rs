//! Messages accepted by the SMTP front end

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::DateTime;
use mailparse::MailHeader;

use crate::clock::Timestamp;

/// Case-insensitive, multi-valued header map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any earlier values of the same header
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value of a header, in the order they appeared
    pub fn get_all(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl From<&[MailHeader<'_>]> for Headers {
    fn from(parsed: &[MailHeader<'_>]) -> Self {
        let mut headers = Self::new();
        for header in parsed {
            headers.add(&header.get_key(), header.get_value());
        }
        headers
    }
}

/// Header block and lazily decoded body of a received payload
#[derive(Debug, Clone)]
struct ParsedMessage {
    headers: Headers,
    body_start: usize,
    body: OnceLock<String>,
}

impl ParsedMessage {
    /// A payload without a well-formed header block is all body.
    fn parse(payload: &str) -> Self {
        let (headers, body_start) = match mailparse::parse_headers(payload.as_bytes()) {
            Ok((headers, body_start)) => (Headers::from(headers.as_slice()), body_start),
            Err(_) => (Headers::new(), 0),
        };
        Self {
            headers,
            body_start,
            body: OnceLock::new(),
        }
    }

    fn body(&self, payload: &str) -> &str {
        self.body.get_or_init(|| decode_body(payload, self.body_start))
    }
}

/// Undo the transfer encoding of the body, keeping it verbatim when that fails
fn decode_body(payload: &str, body_start: usize) -> String {
    let verbatim = || payload.get(body_start..).unwrap_or_default().to_string();

    let Ok(mail) = mailparse::parse_mail(payload.as_bytes()) else {
        return verbatim();
    };
    match mail.get_body_raw() {
        Ok(bytes) => String::from_utf8(bytes)
            .or_else(|_| mail.get_body())
            .unwrap_or_else(|_| verbatim()),
        Err(_) => verbatim(),
    }
}

/// One accepted SMTP transaction
#[derive(Debug, Clone, Default)]
pub struct ReceivedMessage {
    /// Envelope sender from `MAIL FROM`
    pub from: String,
    /// Envelope recipients from `RCPT TO`, in the order they were accepted
    pub to: Vec<String>,
    raw: String,
    parsed: Option<ParsedMessage>,
    received_at: Option<Timestamp>,
}

impl ReceivedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the payload read during the data phase.
    ///
    /// Only the first call has any effect.
    pub fn complete(&mut self, raw: String, received_at: Timestamp) {
        if self.parsed.is_some() {
            return;
        }
        self.parsed = Some(ParsedMessage::parse(&raw));
        self.raw = raw;
        self.received_at = Some(received_at);
    }

    /// The de-stuffed data payload
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// When the data phase completed
    pub fn received_at(&self) -> Option<Timestamp> {
        self.received_at
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.parsed.as_ref().map(|parsed| &parsed.headers)
    }

    /// First value of a header, or an empty string
    pub fn header(&self, name: &str) -> &str {
        self.headers()
            .and_then(|headers| headers.get(name))
            .unwrap_or_default()
    }

    pub fn subject(&self) -> &str {
        self.header("Subject")
    }

    /// The `Date` header, if present and parseable
    pub fn date(&self) -> Option<Timestamp> {
        DateTime::parse_from_rfc2822(self.header("Date")).ok()
    }

    /// Body text with any transfer encoding undone, decoded on first use
    pub fn body(&self) -> &str {
        match &self.parsed {
            Some(parsed) => parsed.body(&self.raw),
            None => "[no message body]",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use chrono::TimeZone;

    fn received(raw: &str) -> ReceivedMessage {
        let mut msg = ReceivedMessage::new();
        let now = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap();
        msg.complete(raw.to_string(), now);
        msg
    }

    #[test]
    fn test_headers_case_insensitive() {
        let msg = received("Subject: Test\r\nX-Key: a\r\nx-key: b\r\n\r\nbody");
        let headers = msg.headers().unwrap();
        assert_eq!(headers.get("subject"), Some("Test"));
        assert_eq!(headers.get("SUBJECT"), Some("Test"));
        assert_eq!(headers.get_all("X-KEY"), ["a", "b"]);
        assert_eq!(headers.get("Missing"), None);
        assert!(headers.get_all("Missing").is_empty());
    }

    #[test]
    fn test_headers_continuation() {
        let msg = received("Subject: a very\r\n long subject\r\nTo: x\r\n\r\n");
        assert_eq!(msg.subject(), "a very long subject");
        assert_eq!(msg.header("to"), "x");
    }

    #[test]
    fn test_headers_stop_at_blank_line() {
        let msg = received("Subject: s\r\n\r\nNot-A-Header: x\r\n");
        assert_eq!(msg.header("not-a-header"), "");
        assert_eq!(msg.body(), "Not-A-Header: x\r\n");
    }

    #[test]
    fn test_encoded_words_are_decoded() {
        let msg = received("Subject: =?utf-8?b?5Lu25ZCN?=\r\n\r\nbody\r\n");
        assert_eq!(msg.subject(), "件名");
        assert_eq!(msg.raw(), "Subject: =?utf-8?b?5Lu25ZCN?=\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_transfer_encoded_body() {
        let msg = received(
            "Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n\
             5pys5paH\r\n",
        );
        assert_eq!(msg.body(), "本文");
    }

    #[test]
    fn test_complete_only_once() {
        let mut msg = received("Subject: first\r\n\r\n");
        msg.complete("Subject: second\r\n\r\n".to_string(), MockClock::default().now());
        assert_eq!(msg.subject(), "first");
        assert_eq!(msg.raw(), "Subject: first\r\n\r\n");
    }

    #[test]
    fn test_subject_and_body() {
        let msg = received("Subject: test\r\n\r\nHello World\r\nSecond line\r\n");
        assert_eq!(msg.subject(), "test");
        assert_eq!(msg.body(), "Hello World\r\nSecond line\r\n");
    }

    #[test]
    fn test_missing_body() {
        let msg = received("Subject: test\r\n");
        assert_eq!(msg.body(), "");
        assert_eq!(ReceivedMessage::new().body(), "[no message body]");
    }

    #[test]
    fn test_missing_subject() {
        let msg = received("From: someone\r\n\r\nbody\r\n");
        assert_eq!(msg.subject(), "");
        assert_eq!(ReceivedMessage::new().subject(), "");
    }

    #[test]
    fn test_date() {
        let msg = received("Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\r\n");
        let date = msg.date().unwrap();
        assert_eq!(date.to_rfc2822(), "Tue, 1 Jul 2003 10:52:37 +0200");

        let msg = received("Date: yesterday\r\n\r\n");
        assert!(msg.date().is_none());

        let msg = received("Subject: no date\r\n\r\n");
        assert!(msg.date().is_none());
    }
}
