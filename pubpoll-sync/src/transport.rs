//! Transport layer abstraction.
//!
//! The engine talks to a real-time publish/subscribe network through
//! [`PollTransport`]. Implementations own connection handshakes, retries
//! and channel fan-out; the engine only relies on the contract below.

use crate::codec::Payload;
use crate::error::PollResult;
use async_trait::async_trait;
use pubpoll_types::Sequence;
use serde_json::Value;
use tokio::sync::mpsc;

/// Stream of events a connected transport delivers to the engine.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// A message stored on a channel, as delivered live or from history.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Channel the message was published on.
    pub channel: String,
    /// Publish sequence assigned by the network.
    pub sequence: Sequence,
    /// Identity of the publishing client, when the network reports it.
    pub publisher: Option<String>,
    /// Raw payload; may be anything a publisher sent.
    pub payload: Value,
}

/// Connectivity reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    /// The client is connected and subscriptions are live.
    Connected,
    /// The connection dropped and the transport is retrying on its own.
    Reconnecting,
    /// The connection is gone.
    Disconnected { error: Option<String> },
}

/// Presence change on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A client subscribed.
    Join { occupant: String },
    /// A client left or timed out.
    Leave { occupant: String },
    /// Absolute occupancy, for networks that report counts instead of
    /// individual joins.
    Occupancy(u64),
}

/// Anything the transport pushes to a connected client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(TransportStatus),
    Message(Envelope),
    Presence { channel: String, event: PresenceEvent },
}

/// A publish/subscribe transport the poll engine can run on.
#[async_trait]
pub trait PollTransport: Send + Sync {
    /// Connects and returns the event stream. The first status event on the
    /// stream reports the outcome of the connection attempt.
    async fn connect(&self) -> PollResult<EventStream>;

    /// Disconnects and ends the event stream.
    async fn disconnect(&self) -> PollResult<()>;

    /// Subscribes to channels. Subscribing twice is a no-op.
    async fn subscribe(&self, channels: &[String]) -> PollResult<()>;

    /// Publishes a payload and returns the sequence the network assigned.
    async fn publish(&self, channel: &str, payload: Payload) -> PollResult<Sequence>;

    /// Returns at most `max_depth` of the most recent messages on a
    /// channel, oldest first.
    async fn fetch_history(&self, channel: &str, max_depth: usize) -> PollResult<Vec<Envelope>>;

    /// Registers a device push token for the given channels.
    async fn register_push_token(&self, token: &[u8], channels: &[String]) -> PollResult<()>;
}
