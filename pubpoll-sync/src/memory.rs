//! In-process publish/subscribe network.
//!
//! [`MemoryNetwork`] is a shared hub that behaves like a small real-time
//! network: a global publish sequence, per-channel history, echo of
//! messages to their publisher, and presence events on subscribe and
//! disconnect. Each participant talks to it through its own
//! [`MemoryTransport`]. Tests and the demo use it to drive engines without
//! a network, and to inject failures.

use crate::codec::Payload;
use crate::error::{PollError, PollResult};
use crate::transport::{
    Envelope, EventStream, PollTransport, PresenceEvent, TransportEvent, TransportStatus,
};
use async_trait::async_trait;
use pubpoll_types::Sequence;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::debug;

/// A push token registered by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRegistration {
    pub client: String,
    pub token: Vec<u8>,
    pub channels: Vec<String>,
}

#[derive(Default)]
struct ClientSlot {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    online: bool,
    subscriptions: HashSet<String>,
}

impl ClientSlot {
    fn send(&self, event: TransportEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means the client stopped listening.
            let _ = tx.send(event);
        }
    }
}

#[derive(Default)]
struct NetworkInner {
    last_sequence: u64,
    history: HashMap<String, Vec<Envelope>>,
    clients: HashMap<String, ClientSlot>,
    push_registrations: Vec<PushRegistration>,
}

impl NetworkInner {
    fn publish(&mut self, channel: &str, publisher: Option<&str>, payload: Value) -> Sequence {
        self.last_sequence += 1;
        let envelope = Envelope {
            channel: channel.to_string(),
            sequence: Sequence::new(self.last_sequence),
            publisher: publisher.map(str::to_string),
            payload,
        };

        for slot in self.clients.values() {
            if slot.online && slot.subscriptions.contains(channel) {
                slot.send(TransportEvent::Message(envelope.clone()));
            }
        }

        let sequence = envelope.sequence;
        self.history.entry(channel.to_string()).or_default().push(envelope);
        sequence
    }

    /// Tells every other online subscriber of `channels` about `client`.
    fn broadcast_presence<F>(&self, client: &str, channels: &[String], make: F)
    where
        F: Fn(String) -> PresenceEvent,
    {
        for channel in channels {
            for (id, slot) in &self.clients {
                if id != client && slot.online && slot.subscriptions.contains(channel) {
                    slot.send(TransportEvent::Presence {
                        channel: channel.clone(),
                        event: make(client.to_string()),
                    });
                }
            }
        }
    }

    /// Tells `client` how many other clients are online on `channel`.
    fn send_occupancy(&self, client: &str, channel: &str) {
        let others = self
            .clients
            .iter()
            .filter(|(id, slot)| {
                id.as_str() != client && slot.online && slot.subscriptions.contains(channel)
            })
            .count();
        if let Some(slot) = self.clients.get(client) {
            slot.send(TransportEvent::Presence {
                channel: channel.to_string(),
                event: PresenceEvent::Occupancy(others as u64),
            });
        }
    }

    fn subscriptions_of(&self, client: &str) -> Vec<String> {
        self.clients
            .get(client)
            .map(|slot| slot.subscriptions.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Shared in-memory network. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport for the named client.
    pub fn transport(&self, client: impl Into<String>) -> MemoryTransport {
        let (gate, _) = watch::channel(false);
        let (connect_gate, _) = watch::channel(false);
        MemoryTransport {
            network: self.clone(),
            client: client.into(),
            gate,
            connect_gate,
            failure: Mutex::new(None),
        }
    }

    /// Full history of a channel, oldest first.
    pub async fn history(&self, channel: &str) -> Vec<Envelope> {
        self.inner
            .lock()
            .await
            .history
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Publishes a raw value from outside any client.
    pub async fn inject(&self, channel: &str, payload: Value) -> Sequence {
        self.inner.lock().await.publish(channel, None, payload)
    }

    /// Drops a client's connection as if the network failed.
    /// The client stops receiving messages until [`restore`](Self::restore).
    pub async fn interrupt(&self, client: &str, error: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        let channels = inner.subscriptions_of(client);
        inner.broadcast_presence(client, &channels, |occupant| PresenceEvent::Leave { occupant });

        if let Some(slot) = inner.clients.get_mut(client) {
            slot.online = false;
            slot.send(TransportEvent::Status(TransportStatus::Disconnected {
                error: Some(error.into()),
            }));
        }
        debug!("Interrupted client {}", client);
    }

    /// Reports the transport as retrying for a client. Delivery is paused
    /// just like [`interrupt`](Self::interrupt).
    pub async fn begin_reconnect(&self, client: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.clients.get_mut(client) {
            slot.online = false;
            slot.send(TransportEvent::Status(TransportStatus::Reconnecting));
        }
    }

    /// Brings an interrupted client back online with its subscriptions.
    pub async fn restore(&self, client: &str) {
        let mut inner = self.inner.lock().await;
        let Some(slot) = inner.clients.get_mut(client) else {
            return;
        };
        if slot.events.is_none() {
            return;
        }
        slot.online = true;
        slot.send(TransportEvent::Status(TransportStatus::Connected));

        let channels = inner.subscriptions_of(client);
        inner.broadcast_presence(client, &channels, |occupant| PresenceEvent::Join { occupant });
        for channel in &channels {
            inner.send_occupancy(client, channel);
        }
        debug!("Restored client {}", client);
    }

    /// Number of online subscribers of a channel.
    pub async fn occupancy(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .await
            .clients
            .values()
            .filter(|slot| slot.online && slot.subscriptions.contains(channel))
            .count()
    }

    /// Whether the client currently has a live connection.
    pub async fn is_online(&self, client: &str) -> bool {
        self.inner
            .lock()
            .await
            .clients
            .get(client)
            .is_some_and(|slot| slot.online)
    }

    /// Push tokens registered so far.
    pub async fn push_registrations(&self) -> Vec<PushRegistration> {
        self.inner.lock().await.push_registrations.clone()
    }
}

/// One client's view of a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    client: String,
    gate: watch::Sender<bool>,
    connect_gate: watch::Sender<bool>,
    failure: Mutex<Option<String>>,
}

impl MemoryTransport {
    /// The client identity used for presence and publisher fields.
    pub fn client_id(&self) -> &str {
        &self.client
    }

    /// The network this transport is attached to.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Makes publishes wait without acknowledging until released.
    pub fn hold_publishes(&self) {
        self.gate.send_replace(true);
    }

    /// Lets held and future publishes through.
    pub fn release_publishes(&self) {
        self.gate.send_replace(false);
    }

    /// Makes connection attempts wait until released.
    pub fn hold_connects(&self) {
        self.connect_gate.send_replace(true);
    }

    /// Lets held and future connection attempts through.
    pub fn release_connects(&self) {
        self.connect_gate.send_replace(false);
    }

    /// Makes the next publish fail with the given reason.
    pub async fn fail_next_publish(&self, reason: impl Into<String>) {
        *self.failure.lock().await = Some(reason.into());
    }
}

#[async_trait]
impl PollTransport for MemoryTransport {
    async fn connect(&self) -> PollResult<EventStream> {
        let mut gate = self.connect_gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.network.inner.lock().await;
        let slot = inner.clients.entry(self.client.clone()).or_default();
        slot.events = Some(tx);
        slot.online = true;
        slot.send(TransportEvent::Status(TransportStatus::Connected));
        debug!("Client {} connected", self.client);
        Ok(rx)
    }

    async fn disconnect(&self) -> PollResult<()> {
        let mut inner = self.network.inner.lock().await;
        let channels = inner.subscriptions_of(&self.client);
        inner.broadcast_presence(&self.client, &channels, |occupant| {
            PresenceEvent::Leave { occupant }
        });

        if let Some(slot) = inner.clients.get_mut(&self.client) {
            slot.subscriptions.clear();
            slot.online = false;
            slot.events = None;
        }
        debug!("Client {} disconnected", self.client);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> PollResult<()> {
        let mut inner = self.network.inner.lock().await;
        let slot = inner
            .clients
            .get_mut(&self.client)
            .filter(|slot| slot.online)
            .ok_or(PollError::NotConnected)?;

        let added: Vec<String> = channels
            .iter()
            .filter(|channel| slot.subscriptions.insert((*channel).clone()))
            .cloned()
            .collect();

        inner.broadcast_presence(&self.client, &added, |occupant| PresenceEvent::Join { occupant });

        // New subscribers learn who was already there.
        for channel in &added {
            inner.send_occupancy(&self.client, channel);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Payload) -> PollResult<Sequence> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;

        if let Some(reason) = self.failure.lock().await.take() {
            return Err(PollError::PublishFailed(reason));
        }

        let mut inner = self.network.inner.lock().await;
        let online = inner.clients.get(&self.client).is_some_and(|slot| slot.online);
        if !online {
            return Err(PollError::PublishFailed(format!(
                "client {} is offline",
                self.client
            )));
        }
        Ok(inner.publish(channel, Some(&self.client), Value::Object(payload)))
    }

    async fn fetch_history(&self, channel: &str, max_depth: usize) -> PollResult<Vec<Envelope>> {
        let inner = self.network.inner.lock().await;
        let history = inner.history.get(channel).map(Vec::as_slice).unwrap_or_default();
        let start = history.len().saturating_sub(max_depth);
        Ok(history[start..].to_vec())
    }

    async fn register_push_token(&self, token: &[u8], channels: &[String]) -> PollResult<()> {
        self.network
            .inner
            .lock()
            .await
            .push_registrations
            .push(PushRegistration {
                client: self.client.clone(),
                token: token.to_vec(),
                channels: channels.to_vec(),
            });
        Ok(())
    }
}
