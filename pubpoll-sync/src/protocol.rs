//! Poll protocol messages.
//!
//! Four kinds of messages travel between host and attendees:
//! 1. The host announces a poll on the polls channel
//! 2. Attendees submit votes on the votes channel
//! 3. The host broadcasts the full tally on the votes channel after each vote
//! 4. The host announces completion on the polls channel
//!
//! Messages carry no explicit kind tag on the wire; the codec tells them
//! apart by their field shape.

use pubpoll_types::{Poll, PollId, PollResponse, PollStatistic};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the four wire messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Announcement,
    Completion,
    Vote,
    Statistics,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Announcement => "announcement",
            Self::Completion => "completion",
            Self::Vote => "vote",
            Self::Statistics => "statistics",
        };
        f.write_str(name)
    }
}

/// A decoded poll protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollMessage {
    /// A new poll opened by the host.
    Announcement(Poll),

    /// The host closed a poll.
    Completion(PollCompletion),

    /// An attendee chose a response.
    Vote(PollResponse),

    /// Full vote tally from the host.
    Statistics(PollStatistic),
}

impl PollMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Announcement(_) => MessageKind::Announcement,
            Self::Completion(_) => MessageKind::Completion,
            Self::Vote(_) => MessageKind::Vote,
            Self::Statistics(_) => MessageKind::Statistics,
        }
    }

    /// Identifier of the poll the message is about.
    pub fn poll_identifier(&self) -> &PollId {
        match self {
            Self::Announcement(poll) => poll.identifier(),
            Self::Completion(completion) => &completion.identifier,
            Self::Vote(vote) => vote.poll_identifier(),
            Self::Statistics(stats) => stats.poll_identifier(),
        }
    }
}

/// Completion notice. On the wire it is the poll reduced to its identifier
/// and `active: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCompletion {
    pub identifier: PollId,
    pub active: bool,
}

impl PollCompletion {
    /// Completion notice for the given poll.
    pub fn for_poll(poll: &Poll) -> Self {
        Self {
            identifier: poll.identifier().clone(),
            active: false,
        }
    }
}
