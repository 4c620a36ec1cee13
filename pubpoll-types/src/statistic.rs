//! Vote statistics published by the poll host.

use crate::{Poll, PollId, PollResponse};
use serde::{Deserialize, Serialize};

/// Vote count for one response variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponseStatistic {
    response: String,
    order: u32,
    votes_count: u64,
}

impl PollResponseStatistic {
    /// Creates an empty statistic for a response variant.
    pub fn for_response(response: &PollResponse) -> Self {
        Self::new(response.response(), response.order(), 0)
    }

    /// Creates a statistic with an explicit count.
    pub fn new(response: impl Into<String>, order: u32, votes_count: u64) -> Self {
        Self {
            response: response.into(),
            order,
            votes_count,
        }
    }

    /// Registers one vote.
    pub fn register_vote(&mut self) {
        self.votes_count = self.votes_count.saturating_add(1);
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn votes_count(&self) -> u64 {
        self.votes_count
    }
}

/// Snapshot of all vote counts of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStatistic {
    poll_identifier: PollId,
    responses: Vec<PollResponseStatistic>,
}

impl PollStatistic {
    /// Aggregates the given statistics for a poll.
    pub fn for_poll(poll: &Poll, responses: Vec<PollResponseStatistic>) -> Self {
        Self::new(poll.identifier().clone(), responses)
    }

    pub fn new(poll_identifier: PollId, responses: Vec<PollResponseStatistic>) -> Self {
        Self {
            poll_identifier,
            responses,
        }
    }

    pub fn poll_identifier(&self) -> &PollId {
        &self.poll_identifier
    }

    pub fn responses(&self) -> &[PollResponseStatistic] {
        &self.responses
    }

    /// Consumes the snapshot, returning its per-response statistics.
    pub fn into_responses(self) -> Vec<PollResponseStatistic> {
        self.responses
    }

    /// Sum of votes over all responses.
    pub fn total_votes(&self) -> u64 {
        self.responses.iter().map(PollResponseStatistic::votes_count).sum()
    }
}
