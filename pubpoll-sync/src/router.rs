//! Message router - applies decoded poll messages to the session state.
//!
//! Messages arrive in any order, may be redelivered and may refer to polls
//! that are long gone. The router decides for each one whether it changes
//! the state, is harmlessly ignored, or is rejected for a concrete reason.

use crate::aggregator;
use crate::config::Role;
use crate::error::PollError;
use crate::protocol::{PollCompletion, PollMessage};
use crate::state::SessionState;
use pubpoll_types::{Poll, PollResponse, PollStatistic};
use std::fmt;
use tracing::debug;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOrigin {
    /// Delivered by the live subscription.
    Live,
    /// Read back from channel history during session recovery.
    Replay,
}

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NoActivePoll,
    PollInactive,
    StalePoll,
    UnknownOrder,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoActivePoll => "no active poll",
            Self::PollInactive => "poll inactive",
            Self::StalePoll => "stale poll",
            Self::UnknownOrder => "unknown order",
        };
        f.write_str(reason)
    }
}

impl From<RejectReason> for PollError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NoActivePoll => Self::NoActivePoll,
            RejectReason::PollInactive => Self::PollInactive,
            RejectReason::StalePoll => Self::StalePoll,
            RejectReason::UnknownOrder => Self::UnknownOrder,
        }
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The state changed.
    Applied,
    /// The message was valid but had nothing to change.
    Ignored,
    /// The message contradicts the current state.
    Rejected(RejectReason),
}

impl RouteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Checks whether `vote` can be counted against the current poll.
///
/// Shared by the host's router and the attendee's submit pre-check so both
/// sides refuse the same votes for the same reasons.
pub fn check_vote<'a>(state: &'a SessionState, vote: &PollResponse) -> Result<&'a Poll, RejectReason> {
    let poll = state.active_poll().ok_or(RejectReason::NoActivePoll)?;
    if poll.identifier() != vote.poll_identifier() {
        return Err(RejectReason::StalePoll);
    }
    if !poll.is_active() {
        return Err(RejectReason::PollInactive);
    }
    if !poll.has_order(vote.order()) {
        return Err(RejectReason::UnknownOrder);
    }
    Ok(poll)
}

/// Applies poll messages for one participant.
#[derive(Debug, Clone, Copy)]
pub struct MessageRouter {
    role: Role,
}

impl MessageRouter {
    /// Creates a router for the given role.
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Applies a single message to the state.
    pub fn apply(
        &self,
        state: &mut SessionState,
        message: &PollMessage,
        origin: ApplyOrigin,
    ) -> RouteOutcome {
        let outcome = match message {
            PollMessage::Announcement(poll) => self.apply_announcement(state, poll, origin),
            PollMessage::Completion(completion) => self.apply_completion(state, completion),
            PollMessage::Vote(vote) => self.apply_vote(state, vote),
            PollMessage::Statistics(stats) => self.apply_statistics(state, stats, origin),
        };

        debug!(
            "Routed {} for poll {} ({:?}): {:?}",
            message.kind(),
            message.poll_identifier(),
            origin,
            outcome
        );
        outcome
    }

    fn apply_announcement(
        &self,
        state: &mut SessionState,
        poll: &Poll,
        origin: ApplyOrigin,
    ) -> RouteOutcome {
        // Our own echo, or a redelivery: keep the counts.
        if state
            .active_poll()
            .is_some_and(|current| current.identifier() == poll.identifier())
        {
            return RouteOutcome::Ignored;
        }

        state.install_poll(poll.clone());
        if origin == ApplyOrigin::Live {
            state.set_restored_session(false);
        }
        RouteOutcome::Applied
    }

    fn apply_completion(&self, state: &mut SessionState, completion: &PollCompletion) -> RouteOutcome {
        let matches_open_poll = state
            .active_poll()
            .is_some_and(|poll| poll.identifier() == &completion.identifier && poll.is_active());
        if !matches_open_poll {
            return RouteOutcome::Ignored;
        }

        state.complete_poll();
        RouteOutcome::Applied
    }

    fn apply_vote(&self, state: &mut SessionState, vote: &PollResponse) -> RouteOutcome {
        if self.role != Role::Host {
            return RouteOutcome::Ignored;
        }
        if let Err(reason) = check_vote(state, vote) {
            return RouteOutcome::Rejected(reason);
        }

        match aggregator::register_vote(state.statistics_mut(), vote.order()) {
            Ok(_) => RouteOutcome::Applied,
            Err(reason) => RouteOutcome::Rejected(reason),
        }
    }

    fn apply_statistics(
        &self,
        state: &mut SessionState,
        stats: &PollStatistic,
        origin: ApplyOrigin,
    ) -> RouteOutcome {
        // The host is authoritative for live counts; its own echoes may lag.
        if self.role == Role::Host && origin == ApplyOrigin::Live {
            return RouteOutcome::Ignored;
        }

        let Some(poll) = state.active_poll() else {
            return RouteOutcome::Rejected(RejectReason::NoActivePoll);
        };
        if poll.identifier() != stats.poll_identifier() {
            return RouteOutcome::Rejected(RejectReason::StalePoll);
        }
        if !stats.responses().iter().all(|stat| poll.has_order(stat.order())) {
            return RouteOutcome::Rejected(RejectReason::UnknownOrder);
        }

        if !poll.is_active() {
            let lowers_a_count = stats.responses().iter().any(|incoming| {
                state
                    .statistics()
                    .iter()
                    .find(|current| current.order() == incoming.order())
                    .is_some_and(|current| incoming.votes_count() < current.votes_count())
            });
            if lowers_a_count {
                return RouteOutcome::Ignored;
            }
        }

        let mut responses = stats.responses().to_vec();
        responses.sort_by_key(|stat| stat.order());
        if state.statistics() == responses.as_slice() {
            return RouteOutcome::Ignored;
        }

        state.replace_statistics(responses);
        RouteOutcome::Applied
    }
}
