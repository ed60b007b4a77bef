//! Classifiers deciding which messages belong together

use regex::Regex;

use crate::smtp::ReceivedMessage;

/// Maps a message to a key. Messages with equal keys are batched into the
/// same digest, or counted as one entry inside a digest, depending on where
/// the classifier is used.
///
/// Classification never fails: missing headers give an empty or default key.
#[derive(Debug, Clone)]
pub enum GroupBy {
    /// The subject, trimmed
    SameSubject,
    /// The subject with every match of `pattern` replaced
    ReplacedSubject { pattern: Regex, replacement: String },
    /// The value of a header that occurs exactly once, else `default`
    Header { name: String, default: String },
}

impl GroupBy {
    pub fn same_subject() -> Self {
        GroupBy::SameSubject
    }

    /// Collapse variable parts of the subject, e.g. `\d+` → `#`
    pub fn replaced_subject(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(GroupBy::ReplacedSubject {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn header(name: &str, default: &str) -> Self {
        GroupBy::Header {
            name: name.to_string(),
            default: default.to_string(),
        }
    }

    pub fn key(&self, msg: &ReceivedMessage) -> String {
        match self {
            GroupBy::SameSubject => msg.subject().trim().to_string(),
            GroupBy::ReplacedSubject {
                pattern,
                replacement,
            } => pattern
                .replace_all(msg.subject(), replacement.as_str())
                .into_owned(),
            GroupBy::Header { name, default } => match msg.headers().map(|h| h.get_all(name)) {
                Some([value]) => value.clone(),
                _ => default.clone(),
            },
        }
    }
}
