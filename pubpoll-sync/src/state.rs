//! Poll session state.
//!
//! The single source of truth for what a participant knows about the
//! session: the active poll, its vote tallies, connection flags and the
//! attendee count. The engine owns one instance and mutates it from its
//! worker task only; everyone else sees cloned snapshots.

use crate::aggregator;
use pubpoll_types::{Poll, PollResponse, PollResponseStatistic, PollStatistic};
use serde::Serialize;

/// Everything a participant knows about the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    active_poll: Option<Poll>,
    statistics: Vec<PollResponseStatistic>,
    connected: bool,
    initially_connected: bool,
    restored_session: bool,
    attendees_count: u64,
}

impl SessionState {
    /// Creates an empty, disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Poll ─────────────────────────────────────────────────────

    pub fn active_poll(&self) -> Option<&Poll> {
        self.active_poll.as_ref()
    }

    /// Vote statistics, in response order.
    pub fn statistics(&self) -> &[PollResponseStatistic] {
        &self.statistics
    }

    /// Question of the current poll.
    pub fn poll_question(&self) -> Option<&str> {
        self.active_poll.as_ref().map(Poll::question)
    }

    /// Response texts of the current poll, in order.
    pub fn poll_response_variants(&self) -> Vec<&str> {
        self.active_poll
            .as_ref()
            .map(|poll| poll.responses().iter().map(PollResponse::response).collect())
            .unwrap_or_default()
    }

    /// Whether a poll exists and still accepts votes.
    pub fn has_open_poll(&self) -> bool {
        self.active_poll.as_ref().is_some_and(Poll::is_active)
    }

    /// Replaces the current poll and zeroes the statistics for it.
    pub fn install_poll(&mut self, poll: Poll) {
        self.statistics = aggregator::zeroed_statistics(&poll);
        self.active_poll = Some(poll);
    }

    /// Swaps the current poll for its inactive copy. Returns the completed
    /// poll, or `None` when there was no poll.
    pub fn complete_poll(&mut self) -> Option<&Poll> {
        let completed = self.active_poll.as_ref()?.completed();
        self.active_poll = Some(completed);
        self.active_poll.as_ref()
    }

    /// Replaces all statistics at once.
    pub fn replace_statistics(&mut self, statistics: Vec<PollResponseStatistic>) {
        self.statistics = statistics;
    }

    /// Mutable access for the statistics aggregator.
    pub fn statistics_mut(&mut self) -> &mut [PollResponseStatistic] {
        &mut self.statistics
    }

    /// Snapshot of the current tally, ready to broadcast.
    pub fn statistic_snapshot(&self) -> Option<PollStatistic> {
        self.active_poll
            .as_ref()
            .map(|poll| aggregator::snapshot(poll, &self.statistics))
    }

    /// Forgets the poll and its statistics. Connection flags survive.
    pub fn clear_session(&mut self) {
        self.active_poll = None;
        self.statistics.clear();
        self.restored_session = false;
    }

    // ── Connection ───────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the engine has ever been connected. Never resets.
    pub fn is_initially_connected(&self) -> bool {
        self.initially_connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if connected {
            self.initially_connected = true;
        }
    }

    /// Whether the current poll was recovered from channel history.
    pub fn restored_session(&self) -> bool {
        self.restored_session
    }

    pub fn set_restored_session(&mut self, restored: bool) {
        self.restored_session = restored;
    }

    // ── Presence ─────────────────────────────────────────────────

    pub fn attendees_count(&self) -> u64 {
        self.attendees_count
    }

    /// Attendee count phrased for display.
    pub fn attendees_count_string(&self) -> String {
        match self.attendees_count {
            1 => "1 attendee".to_string(),
            n => format!("{n} attendees"),
        }
    }

    pub fn attendee_joined(&mut self) {
        self.attendees_count = self.attendees_count.saturating_add(1);
    }

    pub fn attendee_left(&mut self) {
        self.attendees_count = self.attendees_count.saturating_sub(1);
    }

    pub fn set_attendees_count(&mut self, count: u64) {
        self.attendees_count = count;
    }
}
