//! Session configuration.

use pubpoll_types::HostId;
use serde::{Deserialize, Serialize};

/// Default number of messages fetched per channel when restoring a session.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Which side of the session this participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Announces polls and aggregates votes.
    Host,
    /// Receives polls and submits votes.
    #[default]
    Attendee,
}

/// Configuration for a polling session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host whose session this participant belongs to.
    pub host_id: HostId,
    /// Host or attendee.
    pub role: Role,
    /// Suffix of the channel carrying announcements and completions.
    pub polls_suffix: String,
    /// Suffix of the channel carrying votes and statistics.
    pub votes_suffix: String,
    /// Maximum messages fetched per channel during session recovery.
    pub history_depth: usize,
    /// Whether to replay channel history on every (re)connect.
    pub replay_history: bool,
    /// Capacity of the engine's command mailbox.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_id: HostId::new(),
            role: Role::Attendee,
            polls_suffix: "polls".to_string(),
            votes_suffix: "votes".to_string(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            replay_history: true,
            command_buffer: 64,
        }
    }
}

impl SessionConfig {
    /// Configuration for the host of a session.
    pub fn host(host_id: HostId) -> Self {
        Self {
            host_id,
            role: Role::Host,
            ..Default::default()
        }
    }

    /// Configuration for an attendee joining `host_id`'s session.
    pub fn attendee(host_id: HostId) -> Self {
        Self {
            host_id,
            role: Role::Attendee,
            ..Default::default()
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    /// Channel for announcements and completions; presence is counted here.
    pub fn polls_channel(&self) -> String {
        format!("{}-{}", self.host_id, self.polls_suffix)
    }

    /// Channel for votes and statistics.
    pub fn votes_channel(&self) -> String {
        format!("{}-{}", self.host_id, self.votes_suffix)
    }

    /// Both session channels.
    pub fn channels(&self) -> Vec<String> {
        vec![self.polls_channel(), self.votes_channel()]
    }
}
