//! Poll and response variant models.
//!
//! A poll is created once by its host and never edited afterwards. Closing a
//! poll derives a new inactive copy through [`Poll::completed`].

use crate::PollId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single response variant of a poll.
///
/// `order` is the position of the variant in the poll and, at the same time,
/// the key attendees use when voting for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    poll_identifier: PollId,
    response: String,
    order: u32,
}

impl PollResponse {
    /// Creates a response variant for the given poll.
    pub fn new(poll_identifier: PollId, response: impl Into<String>, order: u32) -> Self {
        Self {
            poll_identifier,
            response: response.into(),
            order,
        }
    }

    /// Identifier of the poll this variant belongs to.
    pub fn poll_identifier(&self) -> &PollId {
        &self.poll_identifier
    }

    /// Text shown to hosts and attendees.
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Position and vote key.
    pub fn order(&self) -> u32 {
        self.order
    }
}

/// A multiple-choice poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    identifier: PollId,
    active: bool,
    question: String,
    responses: Vec<PollResponse>,
}

impl Poll {
    /// Creates an active poll with a fresh identifier.
    /// Response variants get sequential orders starting at zero.
    pub fn new<I, S>(question: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_identifier(PollId::new(), question, variants)
    }

    /// Creates an active poll with a caller-chosen identifier.
    pub fn with_identifier<I, S>(identifier: PollId, question: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses = variants
            .into_iter()
            .enumerate()
            .map(|(order, text)| PollResponse::new(identifier.clone(), text, order as u32))
            .collect();

        Self {
            identifier,
            active: true,
            question: question.into(),
            responses,
        }
    }

    /// Returns the same poll in its inactive state.
    #[must_use]
    pub fn completed(&self) -> Self {
        Self {
            active: false,
            ..self.clone()
        }
    }

    pub fn identifier(&self) -> &PollId {
        &self.identifier
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn responses(&self) -> &[PollResponse] {
        &self.responses
    }

    /// Looks up a response variant by its order.
    pub fn response_for_order(&self, order: u32) -> Option<&PollResponse> {
        self.responses.iter().find(|r| r.order == order)
    }

    /// Returns whether `order` names one of this poll's variants.
    pub fn has_order(&self, order: u32) -> bool {
        self.response_for_order(order).is_some()
    }

    /// Checks that orders are unique and that every variant points back at
    /// this poll. Decoded polls come from untrusted publishers.
    pub fn check_consistency(&self) -> crate::Result<()> {
        let mut seen = HashSet::with_capacity(self.responses.len());
        for response in &self.responses {
            if response.poll_identifier != self.identifier {
                return Err(crate::Error::InvalidPoll(format!(
                    "response {} belongs to poll {}",
                    response.order, response.poll_identifier
                )));
            }
            if !seen.insert(response.order) {
                return Err(crate::Error::InvalidPoll(format!(
                    "duplicate response order {}",
                    response.order
                )));
            }
        }
        Ok(())
    }
}
