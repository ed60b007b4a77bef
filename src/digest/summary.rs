//! Compaction of buffered messages into digests

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::clock::Timestamp;
use crate::digest::group::GroupBy;
use crate::smtp::ReceivedMessage;

const DATE_FORMAT: &str = "%d %b %y %H:%M %z";
const UTC_DATE_FORMAT: &str = "%d %b %y %H:%M UTC";

/// A group of messages sharing a classification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueMessage {
    /// The classification key
    pub template: String,
    /// Earliest `Date` header seen in the group
    pub start: Option<Timestamp>,
    /// Latest `Date` header seen in the group
    pub end: Option<Timestamp>,
    /// Body of the most recent message in the group
    pub body: String,
    /// Subject of the most recent message in the group
    pub subject: String,
    pub count: usize,
}

impl UniqueMessage {
    fn new(template: String) -> Self {
        Self {
            template,
            start: None,
            end: None,
            body: String::new(),
            subject: String::new(),
            count: 0,
        }
    }

    fn add(&mut self, msg: &ReceivedMessage) {
        if let Some(date) = msg.date() {
            if self.start.is_none_or(|start| date < start) {
                self.start = Some(date);
            }
            if self.end.is_none_or(|end| date > end) {
                self.end = Some(date);
            }
        }
        self.body = msg.body().to_string();
        self.subject = msg.subject().to_string();
        self.count += 1;
    }
}

/// Fold messages into one [`UniqueMessage`] per distinct key, in order of
/// each key's first appearance
pub fn compact(group: &GroupBy, received: &[ReceivedMessage]) -> Vec<UniqueMessage> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut uniques: Vec<UniqueMessage> = Vec::new();

    for msg in received {
        let key = group.key(msg);
        let i = *index.entry(key.clone()).or_insert_with(|| {
            uniques.push(UniqueMessage::new(key));
            uniques.len() - 1
        });
        uniques[i].add(msg);
    }

    uniques
}

/// `1 message`, `2 messages`
pub fn plural(count: usize, singular: &str, plural: &str) -> String {
    let word = if count == 1 { singular } else { plural };
    format!("{count} {word}")
}

/// The digest sent in place of one flushed batch
#[derive(Debug, Clone)]
pub struct SummaryMessage {
    pub from: String,
    /// Every recipient of every message, deduplicated and sorted
    pub to: Vec<String>,
    pub subject: String,
    pub date: Timestamp,
    pub received_messages: Vec<ReceivedMessage>,
    pub unique_messages: Vec<UniqueMessage>,
}

impl SummaryMessage {
    /// Render the digest as an RFC 5322 message
    pub fn to_bytes(&self) -> Vec<u8> {
        self.render().into_bytes()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SummaryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "From: {}\r\n", self.from)?;
        write!(f, "To: {}\r\n", self.to.join(", "))?;
        write!(f, "Subject: {}\r\n", self.subject)?;
        write!(f, "Date: {}\r\n\r\n", format_date(Some(self.date)))?;

        for msg in &self.received_messages {
            write!(f, "{}: {}\r\n", format_date(msg.date()), msg.subject())?;
        }

        for unique in &self.unique_messages {
            write!(f, "\r\n# {} instances\r\n", unique.count)?;
            write!(
                f,
                "* {} - {}\r\n",
                format_date(unique.start),
                format_date(unique.end)
            )?;
            write!(
                f,
                "\r\n{}\r\n- {}\r\n{}\r\n",
                unique.template, unique.subject, unique.body
            )?;
        }

        Ok(())
    }
}

/// `02 Jan 06 15:04 UTC`, with a numeric zone outside UTC
fn format_date(date: Option<Timestamp>) -> String {
    match date {
        Some(d) if d.offset().local_minus_utc() == 0 => d.format(UTC_DATE_FORMAT).to_string(),
        Some(d) => d.format(DATE_FORMAT).to_string(),
        None => "?".to_string(),
    }
}

/// Build the digest for one batch
pub fn summarize(
    group: &GroupBy,
    from: &str,
    received: Vec<ReceivedMessage>,
    date: Timestamp,
) -> SummaryMessage {
    let to: BTreeSet<&str> = received
        .iter()
        .flat_map(|msg| msg.to.iter().map(String::as_str))
        .collect();

    SummaryMessage {
        from: from.to_string(),
        to: to.into_iter().map(str::to_string).collect(),
        subject: format!(
            "[mogidigest] {}",
            plural(received.len(), "message", "messages")
        ),
        date,
        unique_messages: compact(group, &received),
        received_messages: received,
    }
}
