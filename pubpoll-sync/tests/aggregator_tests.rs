//! Tests for host-side vote aggregation.

use pretty_assertions::assert_eq;
use pubpoll_sync::aggregator;
use pubpoll_sync::RejectReason;
use pubpoll_types::{Poll, PollId};

fn colours() -> Poll {
    Poll::with_identifier(PollId::from("P1"), "Favourite colour?", ["Red", "Green", "Blue"])
}

#[test]
fn test_zeroed_statistics_follow_responses() {
    let stats = aggregator::zeroed_statistics(&colours());

    let summary: Vec<(&str, u32, u64)> = stats
        .iter()
        .map(|s| (s.response(), s.order(), s.votes_count()))
        .collect();
    assert_eq!(summary, vec![("Red", 0, 0), ("Green", 1, 0), ("Blue", 2, 0)]);
}

#[test]
fn test_register_vote_increments_by_one() {
    let mut stats = aggregator::zeroed_statistics(&colours());

    let updated = aggregator::register_vote(&mut stats, 2).unwrap();
    assert_eq!(updated.votes_count(), 1);
    assert_eq!(updated.response(), "Blue");

    aggregator::register_vote(&mut stats, 2).unwrap();
    let counts: Vec<u64> = stats.iter().map(|s| s.votes_count()).collect();
    assert_eq!(counts, vec![0, 0, 2]);
}

#[test]
fn test_register_vote_unknown_order() {
    let mut stats = aggregator::zeroed_statistics(&colours());
    assert_eq!(
        aggregator::register_vote(&mut stats, 3).unwrap_err(),
        RejectReason::UnknownOrder
    );
}

#[test]
fn test_snapshot_is_self_contained() {
    let poll = colours();
    let mut stats = aggregator::zeroed_statistics(&poll);
    aggregator::register_vote(&mut stats, 0).unwrap();

    let snapshot = aggregator::snapshot(&poll, &stats);
    assert_eq!(snapshot.poll_identifier(), poll.identifier());
    assert_eq!(snapshot.responses(), stats.as_slice());
    assert_eq!(snapshot.total_votes(), 1);
}
