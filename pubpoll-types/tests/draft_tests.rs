use pretty_assertions::assert_eq;
use pubpoll_types::{PollDraft, PollResponse, MIN_RESPONSES};

#[test]
fn empty_draft_is_invalid() {
    let draft = PollDraft::new();
    assert!(!draft.is_valid());
    assert!(draft.validate().unwrap_err().to_string().contains("question is empty"));
}

#[test]
fn draft_becomes_valid_as_data_is_entered() {
    let mut draft = PollDraft::new();
    draft.set_question("Coffee or tea?");
    assert!(!draft.is_valid());

    draft.push_response("Coffee");
    assert!(!draft.is_valid());

    draft.push_response("Tea");
    assert!(draft.is_valid());
    assert_eq!(draft.responses().len(), MIN_RESPONSES);
}

#[test]
fn blank_question_is_invalid() {
    let draft = PollDraft::with_data("   ", ["A", "B"]);
    assert!(!draft.is_valid());
}

#[test]
fn blank_response_is_invalid() {
    let draft = PollDraft::with_data("Q", ["A", "  "]);
    let err = draft.validate().unwrap_err();
    assert!(err.to_string().contains("response 1 is empty"));
}

#[test]
fn too_few_responses() {
    let draft = PollDraft::with_data("Q", ["Only"]);
    let err = draft.validate().unwrap_err();
    assert!(err.to_string().contains("at least 2 responses"));
}

#[test]
fn set_and_remove_responses() {
    let mut draft = PollDraft::with_data("Q", ["A", "B"]);
    draft.set_response(1, "C");
    draft.set_response(9, "D");
    assert_eq!(draft.responses(), ["A", "C", "D"]);

    assert_eq!(draft.remove_response(0).as_deref(), Some("A"));
    assert_eq!(draft.remove_response(5), None);
    assert_eq!(draft.responses(), ["C", "D"]);
}

#[test]
fn reset_clears_everything() {
    let mut draft = PollDraft::with_data("Q", ["A", "B"]);
    draft.reset();
    assert_eq!(draft, PollDraft::new());
    assert!(!draft.is_valid());
}

#[test]
fn into_poll_trims_and_orders() {
    let poll = PollDraft::with_data("  Ready? ", [" Yes", "No "]).into_poll().unwrap();
    assert_eq!(poll.question(), "Ready?");
    let texts: Vec<&str> = poll.responses().iter().map(PollResponse::response).collect();
    assert_eq!(texts, vec!["Yes", "No"]);
    assert!(poll.is_active());
}

#[test]
fn into_poll_rejects_invalid_draft() {
    assert!(PollDraft::with_data("Q", Vec::<String>::new()).into_poll().is_err());
}
