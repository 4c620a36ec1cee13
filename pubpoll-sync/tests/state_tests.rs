use pretty_assertions::assert_eq;
use pubpoll_sync::SessionState;
use pubpoll_types::{Poll, PollId, PollResponseStatistic};

fn poll() -> Poll {
    Poll::with_identifier(PollId::from("P1"), "Lunch?", ["Pizza", "Sushi"])
}

// ── Poll ─────────────────────────────────────────────────────────

#[test]
fn test_new_state_is_empty() {
    let state = SessionState::new();
    assert_eq!(state.active_poll(), None);
    assert!(state.statistics().is_empty());
    assert!(!state.is_connected());
    assert!(!state.is_initially_connected());
    assert!(!state.restored_session());
    assert_eq!(state.attendees_count(), 0);
    assert_eq!(state.poll_question(), None);
    assert!(state.poll_response_variants().is_empty());
}

#[test]
fn test_install_poll_derives_accessors() {
    let mut state = SessionState::new();
    state.install_poll(poll());

    assert_eq!(state.poll_question(), Some("Lunch?"));
    assert_eq!(state.poll_response_variants(), vec!["Pizza", "Sushi"]);
    assert!(state.has_open_poll());
    assert_eq!(
        state.statistics(),
        &[
            PollResponseStatistic::new("Pizza", 0, 0),
            PollResponseStatistic::new("Sushi", 1, 0),
        ]
    );
}

#[test]
fn test_complete_poll_keeps_statistics() {
    let mut state = SessionState::new();
    state.install_poll(poll());
    state.statistics_mut()[1].register_vote();

    let completed = state.complete_poll().cloned().unwrap();

    assert!(!completed.is_active());
    assert!(!state.has_open_poll());
    assert_eq!(state.statistics()[1].votes_count(), 1);
}

#[test]
fn test_complete_without_poll() {
    let mut state = SessionState::new();
    assert_eq!(state.complete_poll(), None);
}

#[test]
fn test_statistic_snapshot() {
    let mut state = SessionState::new();
    assert_eq!(state.statistic_snapshot(), None);

    state.install_poll(poll());
    state.statistics_mut()[0].register_vote();
    let snapshot = state.statistic_snapshot().unwrap();
    assert_eq!(snapshot.poll_identifier().as_str(), "P1");
    assert_eq!(snapshot.total_votes(), 1);
}

#[test]
fn test_clear_session_keeps_connection_flags() {
    let mut state = SessionState::new();
    state.set_connected(true);
    state.set_attendees_count(4);
    state.install_poll(poll());
    state.set_restored_session(true);

    state.clear_session();

    assert_eq!(state.active_poll(), None);
    assert!(state.statistics().is_empty());
    assert!(!state.restored_session());
    assert!(state.is_connected());
    assert!(state.is_initially_connected());
    assert_eq!(state.attendees_count(), 4);
}

// ── Connection ───────────────────────────────────────────────────

#[test]
fn test_initially_connected_is_sticky() {
    let mut state = SessionState::new();
    state.set_connected(false);
    assert!(!state.is_initially_connected());

    state.set_connected(true);
    state.set_connected(false);
    assert!(!state.is_connected());
    assert!(state.is_initially_connected());
}

// ── Presence ─────────────────────────────────────────────────────

#[test]
fn test_attendee_count_saturates_at_zero() {
    let mut state = SessionState::new();
    state.attendee_left();
    assert_eq!(state.attendees_count(), 0);

    state.attendee_joined();
    state.attendee_joined();
    state.attendee_left();
    assert_eq!(state.attendees_count(), 1);
}

#[test]
fn test_attendees_count_string() {
    let mut state = SessionState::new();
    assert_eq!(state.attendees_count_string(), "0 attendees");

    state.set_attendees_count(1);
    assert_eq!(state.attendees_count_string(), "1 attendee");

    state.set_attendees_count(12);
    assert_eq!(state.attendees_count_string(), "12 attendees");
}

#[test]
fn test_state_serializes() {
    let mut state = SessionState::new();
    state.set_attendees_count(2);
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["attendees_count"], 2);
    assert_eq!(json["active_poll"], serde_json::Value::Null);
}
