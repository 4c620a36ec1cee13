//! Error types for the poll synchronization layer.

use thiserror::Error;

/// Result type for poll operations.
pub type PollResult<T> = Result<T, PollError>;

/// Errors that can occur in poll operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// The engine has no live connection to the real-time network.
    #[error("not connected to the real-time network")]
    NotConnected,

    /// There is no poll to act on.
    #[error("no active poll")]
    NoActivePoll,

    /// The poll has already been completed.
    #[error("poll is no longer active")]
    PollInactive,

    /// The message refers to a poll other than the active one.
    #[error("response refers to a poll that is not the active poll")]
    StalePoll,

    /// The response order is not one of the poll's variants.
    #[error("unknown response order")]
    UnknownOrder,

    /// A payload did not match any known message shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The transport refused or failed to acknowledge a publish.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The operation was abandoned because the engine stopped or reset.
    #[error("operation cancelled")]
    Cancelled,

    /// The poll data cannot be announced.
    #[error("invalid poll: {0}")]
    InvalidPoll(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<pubpoll_types::Error> for PollError {
    fn from(err: pubpoll_types::Error) -> Self {
        match err {
            pubpoll_types::Error::InvalidPoll(reason) => Self::InvalidPoll(reason),
            other => Self::MalformedMessage(other.to_string()),
        }
    }
}
