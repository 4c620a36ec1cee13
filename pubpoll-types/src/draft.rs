//! Validation of poll data before announcement.
//!
//! A host assembles the question and its response variants piece by piece;
//! the draft tracks whether what has been entered so far can be announced.

use crate::{Error, Poll, Result};

/// Minimum number of response variants a poll must offer.
pub const MIN_RESPONSES: usize = 2;

/// Question and response texts being prepared for a new poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollDraft {
    question: String,
    responses: Vec<String>,
}

impl PollDraft {
    /// Creates an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a draft from complete data.
    pub fn with_data<I, S>(question: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    pub fn push_response(&mut self, response: impl Into<String>) {
        self.responses.push(response.into());
    }

    /// Replaces the response at `index`; out-of-range indices append.
    pub fn set_response(&mut self, index: usize, response: impl Into<String>) {
        match self.responses.get_mut(index) {
            Some(slot) => *slot = response.into(),
            None => self.responses.push(response.into()),
        }
    }

    pub fn remove_response(&mut self, index: usize) -> Option<String> {
        (index < self.responses.len()).then(|| self.responses.remove(index))
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// Whether the draft can be announced as it stands.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Explains why the draft cannot be announced.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(Error::InvalidPoll("question is empty".into()));
        }
        if self.responses.len() < MIN_RESPONSES {
            return Err(Error::InvalidPoll(format!(
                "at least {MIN_RESPONSES} responses required, got {}",
                self.responses.len()
            )));
        }
        if let Some(index) = self.responses.iter().position(|r| r.trim().is_empty()) {
            return Err(Error::InvalidPoll(format!("response {index} is empty")));
        }
        Ok(())
    }

    /// Clears everything entered so far.
    pub fn reset(&mut self) {
        self.question.clear();
        self.responses.clear();
    }

    /// Validates the draft and turns it into a fresh active poll.
    /// Surrounding whitespace is trimmed from the question and each response.
    pub fn into_poll(self) -> Result<Poll> {
        self.validate()?;
        Ok(Poll::new(
            self.question.trim(),
            self.responses.iter().map(|r| r.trim().to_string()),
        ))
    }
}
