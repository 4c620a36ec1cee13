//! Shared types and the session runner for the PubPoll demo.
//!
//! The demo runs a host and a few attendees over an in-memory network:
//! the host announces a poll, attendees vote, a late attendee joins and
//! restores the session from history, and the host closes the poll.

use anyhow::{bail, Context, Result};
use pubpoll_sync::{MemoryNetwork, PollEngine, SessionConfig, SessionState};
use pubpoll_types::{Poll, PollResponseStatistic};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// How long to wait for the engines to agree on a state.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the demo session should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoOptions {
    pub question: String,
    pub responses: Vec<String>,
    /// Response orders voted for, spread round-robin over the attendees.
    pub votes: Vec<u32>,
    pub attendees: usize,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            question: "Ship it?".to_string(),
            responses: vec!["Yes".to_string(), "No".to_string()],
            votes: vec![0, 0, 1],
            attendees: 2,
        }
    }
}

/// Outcome of a demo session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReport {
    pub poll: Poll,
    pub host_tally: Vec<PollResponseStatistic>,
    pub late_attendee_tally: Vec<PollResponseStatistic>,
    pub late_attendee_restored: bool,
    pub attendees: String,
}

/// Loads a session configuration from a JSON file. Missing fields take
/// their defaults.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    info!("Loading session config from {:?}", path);
    let data = std::fs::read_to_string(path).context("Failed to read config file")?;
    serde_json::from_str(&data).context("Failed to parse config file")
}

/// Runs a full session and reports the tallies the participants ended with.
pub async fn run_session(base: SessionConfig, options: &DemoOptions) -> Result<DemoReport> {
    if options.attendees == 0 && !options.votes.is_empty() {
        bail!("votes need at least one attendee");
    }

    let network = MemoryNetwork::new();
    let host_config = SessionConfig {
        role: pubpoll_sync::Role::Host,
        ..base.clone()
    };
    let attendee_config = SessionConfig {
        role: pubpoll_sync::Role::Attendee,
        ..base
    };

    let host = PollEngine::new(host_config, Arc::new(network.transport("host")));
    connect(&host).await.context("host failed to connect")?;

    let mut attendees = Vec::with_capacity(options.attendees);
    for i in 0..options.attendees {
        let client = format!("attendee-{i}");
        let engine = PollEngine::new(attendee_config.clone(), Arc::new(network.transport(&client)));
        connect(&engine)
            .await
            .with_context(|| format!("{client} failed to connect"))?;
        attendees.push(engine);
    }

    let poll = host
        .announce_poll(options.question.as_str(), options.responses.iter().map(String::as_str))
        .await
        .context("Failed to announce poll")?;
    info!("Announced: {}", poll.question());

    for engine in &attendees {
        settle(engine, |state| state.active_poll().is_some_and(|p| p.identifier() == poll.identifier()))
            .await
            .context("attendee never saw the poll")?;
    }

    for (i, &order) in options.votes.iter().enumerate() {
        let response = poll
            .response_for_order(order)
            .with_context(|| format!("no response with order {order}"))?
            .clone();
        attendees[i % attendees.len()]
            .submit_response(response)
            .await
            .with_context(|| format!("vote {i} failed"))?;
    }

    let expected = options.votes.len() as u64;
    settle(&host, |state| total_votes(state) == expected)
        .await
        .context("host never counted every vote")?;
    if let Some(last) = attendees.last() {
        settle(last, |state| total_votes(state) == expected)
            .await
            .context("attendees never received the final tally")?;
    }

    let late = PollEngine::new(attendee_config, Arc::new(network.transport("late")));
    connect(&late).await.context("late attendee failed to connect")?;
    settle(&late, |state| {
        state.restored_session() && total_votes(state) == expected
    })
    .await
    .context("late attendee did not restore the session")?;

    let present = options.attendees as u64 + 1;
    settle(&host, |state| state.attendees_count() == present)
        .await
        .context("host never saw every attendee")?;

    let completed = host
        .announce_poll_completion()
        .await
        .context("Failed to complete poll")?;
    info!("Completed poll {}", completed.identifier());

    let report = DemoReport {
        poll: completed,
        host_tally: host.statistics(),
        late_attendee_tally: late.statistics(),
        late_attendee_restored: late.restored_session(),
        attendees: host.attendees_count_string(),
    };

    for engine in attendees.iter().chain([&late, &host]) {
        engine.stop().await.context("Failed to stop engine")?;
    }
    Ok(report)
}

async fn connect(engine: &PollEngine) -> Result<()> {
    engine.start().await?;
    settle(engine, SessionState::is_connected).await
}

async fn settle(engine: &PollEngine, mut done: impl FnMut(&SessionState) -> bool) -> Result<()> {
    let mut states = engine.subscribe();
    timeout(SETTLE_TIMEOUT, states.wait_for(|state| done(state)))
        .await
        .context("timed out")?
        .context("engine stopped")?;
    Ok(())
}

fn total_votes(state: &SessionState) -> u64 {
    state
        .statistics()
        .iter()
        .map(PollResponseStatistic::votes_count)
        .sum()
}
