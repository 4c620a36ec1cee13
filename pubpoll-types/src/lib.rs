//! Core type definitions for PubPoll.
//!
//! This crate defines the models exchanged between a poll host and its
//! attendees:
//! - Poll and host identifiers
//! - Transport publish sequences
//! - Polls, response variants and per-response vote statistics
//! - Draft validation used before a poll is announced
//!
//! Wire encoding, routing and synchronization live in `pubpoll-sync`.

mod draft;
mod ids;
mod poll;
mod sequence;
mod statistic;

pub use draft::{PollDraft, MIN_RESPONSES};
pub use ids::{HostId, PollId};
pub use poll::{Poll, PollResponse};
pub use sequence::Sequence;
pub use statistic::{PollResponseStatistic, PollStatistic};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid poll: {0}")]
    InvalidPoll(String),
}
