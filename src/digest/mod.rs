//! Batching, compaction and delivery of digests

pub mod buffer;
pub mod group;
pub mod summary;
pub mod upstream;

pub use buffer::{BufferLimits, MessageBuffer};
pub use group::GroupBy;
pub use summary::{SummaryMessage, UniqueMessage, compact, plural, summarize};
pub use upstream::{DeliveryError, LogUpstream, SmtpUpstream, Upstream};
