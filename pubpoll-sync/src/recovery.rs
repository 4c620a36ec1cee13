//! Session recovery from channel history.
//!
//! A participant that joins late, or reconnects after missing messages,
//! rebuilds its view by replaying the recent history of both session
//! channels. Each channel keeps a replay watermark plus the set of
//! sequences applied live above it. Replay skips anything at or below the
//! watermark or already seen live, so it never applies a message twice.
//! Live delivery may arrive out of sequence order across publishers and
//! is only checked against those same records.

use crate::codec;
use crate::protocol::MessageKind;
use crate::router::{ApplyOrigin, MessageRouter, RouteOutcome};
use crate::state::SessionState;
use crate::transport::Envelope;
use pubpoll_types::Sequence;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Live sequences remembered per channel above the replay watermark. When
/// more arrive, the oldest is folded into the watermark.
pub const LIVE_WINDOW: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ChannelMark {
    replayed: Option<Sequence>,
    live: BTreeSet<Sequence>,
}

impl ChannelMark {
    fn contains(&self, sequence: Sequence) -> bool {
        self.replayed.is_some_and(|mark| sequence <= mark) || self.live.contains(&sequence)
    }

    fn advance(&mut self, sequence: Sequence) {
        let mark = match self.replayed {
            Some(mark) if mark >= sequence => mark,
            _ => sequence,
        };
        self.replayed = Some(mark);
        self.live = self.live.split_off(&Sequence::new(mark.value().saturating_add(1)));
    }
}

/// Applied sequences per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks {
    channels: HashMap<String, ChannelMark>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay watermark of a channel, if anything was replayed there.
    pub fn get(&self, channel: &str) -> Option<Sequence> {
        self.channels.get(channel).and_then(|mark| mark.replayed)
    }

    /// Whether the message at `sequence` on `channel` was already handled.
    pub fn is_applied(&self, channel: &str, sequence: Sequence) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|mark| mark.contains(sequence))
    }

    /// Raises the channel watermark to `sequence`. Never lowers it.
    pub fn advance(&mut self, channel: &str, sequence: Sequence) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .advance(sequence);
    }

    /// Remembers a live-applied sequence without moving the watermark, so a
    /// lower sequence arriving later is still applied.
    pub fn record_live(&mut self, channel: &str, sequence: Sequence) {
        let mark = self.channels.entry(channel.to_string()).or_default();
        if mark.contains(sequence) {
            return;
        }
        mark.live.insert(sequence);
        if mark.live.len() > LIVE_WINDOW {
            if let Some(oldest) = mark.live.pop_first() {
                mark.advance(oldest);
            }
        }
    }

    /// Number of live sequences remembered above the watermark.
    pub fn live_len(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |mark| mark.live.len())
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

/// What happened to one delivered envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Already applied on this channel; skipped.
    Duplicate,
    /// The payload could not be decoded.
    Malformed(String),
    /// Decoded and handed to the router.
    Routed { kind: MessageKind, outcome: RouteOutcome },
}

/// Decodes, routes and records one envelope.
pub fn deliver(
    router: &MessageRouter,
    state: &mut SessionState,
    watermarks: &mut Watermarks,
    envelope: &Envelope,
    origin: ApplyOrigin,
) -> Delivery {
    if watermarks.is_applied(&envelope.channel, envelope.sequence) {
        debug!(
            "Skipping duplicate {}#{} ({:?})",
            envelope.channel, envelope.sequence, origin
        );
        return Delivery::Duplicate;
    }
    match origin {
        ApplyOrigin::Replay => watermarks.advance(&envelope.channel, envelope.sequence),
        ApplyOrigin::Live => watermarks.record_live(&envelope.channel, envelope.sequence),
    }

    match codec::decode_value(&envelope.payload, None) {
        Ok(message) => Delivery::Routed {
            kind: message.kind(),
            outcome: router.apply(state, &message, origin),
        },
        Err(e) => {
            warn!(
                "Dropping malformed message {}#{}: {}",
                envelope.channel, envelope.sequence, e
            );
            Delivery::Malformed(e.to_string())
        }
    }
}

/// Merges per-channel histories into one chronological list, oldest first.
pub fn merge_histories<I>(histories: I) -> Vec<Envelope>
where
    I: IntoIterator<Item = Vec<Envelope>>,
{
    let mut merged: Vec<Envelope> = histories.into_iter().flatten().collect();
    merged.sort_by_key(|envelope| envelope.sequence);
    merged
}

/// Tally of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub ignored: usize,
    pub rejected: usize,
    pub malformed: usize,
    pub duplicates: usize,
    /// Votes among the applied messages. A host that counted votes during
    /// replay owes attendees a fresh statistics snapshot.
    pub votes_applied: usize,
}

impl ReplayReport {
    /// Counts one delivery.
    pub fn record(&mut self, delivery: &Delivery) {
        match delivery {
            Delivery::Duplicate => self.duplicates += 1,
            Delivery::Malformed(_) => self.malformed += 1,
            Delivery::Routed { kind, outcome } => match outcome {
                RouteOutcome::Applied => {
                    self.applied += 1;
                    if *kind == MessageKind::Vote {
                        self.votes_applied += 1;
                    }
                }
                RouteOutcome::Ignored => self.ignored += 1,
                RouteOutcome::Rejected(_) => self.rejected += 1,
            },
        }
    }

    /// Number of envelopes seen.
    pub fn total(&self) -> usize {
        self.applied + self.ignored + self.rejected + self.malformed + self.duplicates
    }
}

/// Replays a merged history and flags the session as restored when it
/// leaves a poll that still accepts votes.
pub fn replay(
    router: &MessageRouter,
    state: &mut SessionState,
    watermarks: &mut Watermarks,
    history: &[Envelope],
) -> ReplayReport {
    let mut report = ReplayReport::default();
    for envelope in history {
        let delivery = deliver(router, state, watermarks, envelope, ApplyOrigin::Replay);
        report.record(&delivery);
    }

    state.set_restored_session(state.has_open_poll());

    info!(
        "Replayed {} history messages: {} applied, {} ignored, {} rejected, {} malformed, {} duplicates",
        report.total(),
        report.applied,
        report.ignored,
        report.rejected,
        report.malformed,
        report.duplicates
    );
    report
}
