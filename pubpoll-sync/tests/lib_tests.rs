use pubpoll_sync::{
    MemoryNetwork, PollEngine, PollError, Role, SessionConfig, DEFAULT_HISTORY_DEPTH,
};
use pubpoll_types::HostId;
use std::sync::Arc;

#[tokio::test]
async fn poll_engine_creation() {
    let network = MemoryNetwork::new();
    let config = SessionConfig::host(HostId::from("room"));
    let engine = PollEngine::new(config, Arc::new(network.transport("host")));

    assert_eq!(engine.config().role, Role::Host);
    assert_eq!(engine.config().polls_channel(), "room-polls");
    assert!(!engine.is_connected());
    assert_eq!(engine.attendees_count_string(), "0 attendees");
}

#[test]
fn history_depth_default() {
    assert_eq!(DEFAULT_HISTORY_DEPTH, 100);
}

#[test]
fn error_messages() {
    assert_eq!(PollError::NotConnected.to_string(), "not connected to the real-time network");
    assert_eq!(
        PollError::PublishFailed("timeout".into()).to_string(),
        "publish failed: timeout"
    );
    assert_eq!(
        PollError::from(pubpoll_types::Error::InvalidPoll("question is empty".into())),
        PollError::InvalidPoll("question is empty".into())
    );
}
