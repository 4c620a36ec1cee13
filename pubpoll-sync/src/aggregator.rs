//! Host-side vote counting.
//!
//! The host owns the authoritative tally. Every accepted vote bumps one
//! counter, after which the engine broadcasts a full [`PollStatistic`]
//! snapshot so attendees can replace their view wholesale.

use crate::router::RejectReason;
use pubpoll_types::{Poll, PollResponseStatistic, PollStatistic};

/// One zero-count statistic per response variant, in response order.
pub fn zeroed_statistics(poll: &Poll) -> Vec<PollResponseStatistic> {
    poll.responses()
        .iter()
        .map(PollResponseStatistic::for_response)
        .collect()
}

/// Adds one vote to the statistic with the given order and returns it.
pub fn register_vote(
    statistics: &mut [PollResponseStatistic],
    order: u32,
) -> Result<&PollResponseStatistic, RejectReason> {
    let statistic = statistics
        .iter_mut()
        .find(|stat| stat.order() == order)
        .ok_or(RejectReason::UnknownOrder)?;
    statistic.register_vote();
    Ok(statistic)
}

/// Self-contained snapshot of the tally for broadcasting.
pub fn snapshot(poll: &Poll, statistics: &[PollResponseStatistic]) -> PollStatistic {
    PollStatistic::for_poll(poll, statistics.to_vec())
}
