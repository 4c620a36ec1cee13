//! Tests for session recovery: watermarks, history merging and replay.

use pretty_assertions::assert_eq;
use pubpoll_sync::codec;
use pubpoll_sync::protocol::{MessageKind, PollCompletion, PollMessage};
use pubpoll_sync::recovery::{self, Delivery, LIVE_WINDOW, ReplayReport, Watermarks};
use pubpoll_sync::router::{ApplyOrigin, MessageRouter, RouteOutcome};
use pubpoll_sync::{Envelope, Role, SessionState};
use pubpoll_types::{Poll, PollId, PollResponse, PollResponseStatistic, PollStatistic, Sequence};
use serde_json::{json, Value};

const POLLS: &str = "host-polls";
const VOTES: &str = "host-votes";

fn poll() -> Poll {
    Poll::with_identifier(PollId::from("P1"), "Ship it?", ["Yes", "No"])
}

fn envelope(channel: &str, sequence: u64, message: PollMessage) -> Envelope {
    Envelope {
        channel: channel.to_string(),
        sequence: Sequence::new(sequence),
        publisher: None,
        payload: Value::Object(codec::encode(&message).unwrap()),
    }
}

fn vote(order: u32) -> PollMessage {
    PollMessage::Vote(PollResponse::new(PollId::from("P1"), "x", order))
}

fn stats(yes: u64, no: u64) -> PollMessage {
    PollMessage::Statistics(PollStatistic::new(
        PollId::from("P1"),
        vec![
            PollResponseStatistic::new("Yes", 0, yes),
            PollResponseStatistic::new("No", 1, no),
        ],
    ))
}

/// Announcement, votes 0,0,1 and the host's snapshot after each vote.
fn session_history() -> (Vec<Envelope>, Vec<Envelope>) {
    let polls = vec![envelope(POLLS, 1, PollMessage::Announcement(poll()))];
    let votes = vec![
        envelope(VOTES, 2, vote(0)),
        envelope(VOTES, 3, stats(1, 0)),
        envelope(VOTES, 4, vote(0)),
        envelope(VOTES, 5, stats(2, 0)),
        envelope(VOTES, 6, vote(1)),
        envelope(VOTES, 7, stats(2, 1)),
    ];
    (polls, votes)
}

fn counts(state: &SessionState) -> Vec<u64> {
    state.statistics().iter().map(|s| s.votes_count()).collect()
}

// ── Watermarks ───────────────────────────────────────────────────

#[test]
fn test_watermarks_per_channel() {
    let mut marks = Watermarks::new();
    assert!(!marks.is_applied(POLLS, Sequence::new(1)));

    marks.advance(POLLS, Sequence::new(5));
    assert!(marks.is_applied(POLLS, Sequence::new(5)));
    assert!(marks.is_applied(POLLS, Sequence::new(3)));
    assert!(!marks.is_applied(POLLS, Sequence::new(6)));
    assert!(!marks.is_applied(VOTES, Sequence::new(1)));
}

#[test]
fn test_watermarks_never_lower() {
    let mut marks = Watermarks::new();
    marks.advance(VOTES, Sequence::new(9));
    marks.advance(VOTES, Sequence::new(4));
    assert_eq!(marks.get(VOTES), Some(Sequence::new(9)));

    marks.clear();
    assert_eq!(marks.get(VOTES), None);
}

// ── Delivery ─────────────────────────────────────────────────────

#[test]
fn test_deliver_routes_and_skips_duplicates() {
    let router = MessageRouter::new(Role::Attendee);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();
    let announcement = envelope(POLLS, 1, PollMessage::Announcement(poll()));

    let first = recovery::deliver(&router, &mut state, &mut marks, &announcement, ApplyOrigin::Live);
    assert_eq!(
        first,
        Delivery::Routed {
            kind: MessageKind::Announcement,
            outcome: RouteOutcome::Applied
        }
    );

    let again = recovery::deliver(&router, &mut state, &mut marks, &announcement, ApplyOrigin::Replay);
    assert_eq!(again, Delivery::Duplicate);
}

#[test]
fn test_deliver_malformed_payload_advances_watermark() {
    let router = MessageRouter::new(Role::Attendee);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();
    let junk = Envelope {
        channel: VOTES.to_string(),
        sequence: Sequence::new(4),
        publisher: Some("mallory".to_string()),
        payload: json!({"hello": "world"}),
    };

    let delivery = recovery::deliver(&router, &mut state, &mut marks, &junk, ApplyOrigin::Replay);
    assert!(matches!(delivery, Delivery::Malformed(_)));
    assert_eq!(marks.get(VOTES), Some(Sequence::new(4)));
    assert_eq!(state, SessionState::new());
}

#[test]
fn test_live_delivery_keeps_watermark() {
    let mut marks = Watermarks::new();
    marks.advance(VOTES, Sequence::new(3));
    marks.record_live(VOTES, Sequence::new(6));

    assert_eq!(marks.get(VOTES), Some(Sequence::new(3)));
    assert!(marks.is_applied(VOTES, Sequence::new(6)));
    assert!(!marks.is_applied(VOTES, Sequence::new(5)));
    assert_eq!(marks.live_len(VOTES), 1);

    marks.advance(VOTES, Sequence::new(7));
    assert_eq!(marks.live_len(VOTES), 0);
    assert!(marks.is_applied(VOTES, Sequence::new(6)));
}

#[test]
fn test_live_window_folds_into_watermark() {
    let mut marks = Watermarks::new();
    for sequence in 1..=(LIVE_WINDOW as u64 + 1) {
        marks.record_live(VOTES, Sequence::new(sequence));
    }

    assert_eq!(marks.live_len(VOTES), LIVE_WINDOW);
    assert_eq!(marks.get(VOTES), Some(Sequence::new(1)));
}

#[test]
fn test_out_of_order_live_votes_are_all_counted() {
    let router = MessageRouter::new(Role::Host);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();
    let (polls, _) = session_history();
    recovery::replay(&router, &mut state, &mut marks, &polls);

    let later = envelope(VOTES, 6, vote(0));
    let earlier = envelope(VOTES, 5, vote(1));
    let first = recovery::deliver(&router, &mut state, &mut marks, &later, ApplyOrigin::Live);
    let second = recovery::deliver(&router, &mut state, &mut marks, &earlier, ApplyOrigin::Live);

    let applied = Delivery::Routed {
        kind: MessageKind::Vote,
        outcome: RouteOutcome::Applied,
    };
    assert_eq!(first, applied);
    assert_eq!(second, applied);
    assert_eq!(counts(&state), vec![1, 1]);

    let again = recovery::deliver(&router, &mut state, &mut marks, &earlier, ApplyOrigin::Live);
    assert_eq!(again, Delivery::Duplicate);
}

#[test]
fn test_reconnect_replay_skips_messages_seen_live() {
    let router = MessageRouter::new(Role::Host);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();
    let announcement = envelope(POLLS, 1, PollMessage::Announcement(poll()));
    let seen = envelope(VOTES, 4, vote(0));
    let missed = envelope(VOTES, 2, vote(1));
    recovery::deliver(&router, &mut state, &mut marks, &announcement, ApplyOrigin::Live);
    recovery::deliver(&router, &mut state, &mut marks, &seen, ApplyOrigin::Live);

    let history = recovery::merge_histories(vec![vec![announcement], vec![missed, seen]]);
    let report = recovery::replay(&router, &mut state, &mut marks, &history);

    assert_eq!(counts(&state), vec![1, 1]);
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.votes_applied, 1);
}

// ── Merging ──────────────────────────────────────────────────────

#[test]
fn test_merge_histories_is_chronological() {
    let (polls, votes) = session_history();
    let completion = envelope(
        POLLS,
        8,
        PollMessage::Completion(PollCompletion::for_poll(&poll())),
    );
    let mut polls = polls;
    polls.push(completion);

    let merged = recovery::merge_histories(vec![votes, polls]);
    let sequences: Vec<u64> = merged.iter().map(|e| e.sequence.value()).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

// ── Replay ───────────────────────────────────────────────────────

#[test]
fn test_late_attendee_rebuilds_tally_from_snapshots() {
    let (polls, votes) = session_history();
    let history = recovery::merge_histories(vec![polls, votes]);
    let router = MessageRouter::new(Role::Attendee);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();

    let report = recovery::replay(&router, &mut state, &mut marks, &history);

    assert_eq!(counts(&state), vec![2, 1]);
    assert!(state.restored_session());
    assert_eq!(
        report,
        ReplayReport {
            applied: 4,
            ignored: 3,
            rejected: 0,
            malformed: 0,
            duplicates: 0,
            votes_applied: 0,
        }
    );
}

#[test]
fn test_host_replay_counts_votes_once() {
    let (polls, votes) = session_history();
    let history = recovery::merge_histories(vec![polls, votes]);
    let router = MessageRouter::new(Role::Host);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();

    let report = recovery::replay(&router, &mut state, &mut marks, &history);

    assert_eq!(counts(&state), vec![2, 1]);
    assert_eq!(report.votes_applied, 3);
}

#[test]
fn test_replaying_twice_equals_once() {
    let (polls, votes) = session_history();
    let history = recovery::merge_histories(vec![polls, votes]);
    let router = MessageRouter::new(Role::Host);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();

    recovery::replay(&router, &mut state, &mut marks, &history);
    let once = state.clone();
    let second = recovery::replay(&router, &mut state, &mut marks, &history);

    assert_eq!(state, once);
    assert_eq!(second.duplicates, history.len());
    assert_eq!(second.applied, 0);
}

#[test]
fn test_replay_without_announcement_leaves_no_session() {
    let (_, votes) = session_history();
    let router = MessageRouter::new(Role::Host);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();

    let report = recovery::replay(&router, &mut state, &mut marks, &votes);

    assert_eq!(state.active_poll(), None);
    assert!(!state.restored_session());
    assert_eq!(report.rejected, votes.len());
}

#[test]
fn test_replay_of_completed_poll() {
    let (mut polls, votes) = session_history();
    polls.push(envelope(
        POLLS,
        8,
        PollMessage::Completion(PollCompletion::for_poll(&poll())),
    ));
    let history = recovery::merge_histories(vec![polls, votes]);
    let router = MessageRouter::new(Role::Attendee);
    let mut state = SessionState::new();
    let mut marks = Watermarks::new();

    recovery::replay(&router, &mut state, &mut marks, &history);

    let restored = state.active_poll().unwrap();
    assert!(!restored.is_active());
    assert_eq!(counts(&state), vec![2, 1]);
    assert!(!state.restored_session());
}
