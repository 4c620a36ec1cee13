//! Poll engine - the public facade over one polling session.
//!
//! All session state lives in a single worker task. [`PollEngine`] handles
//! talk to it through a bounded command mailbox and read it through a
//! `watch` channel, so the transport's event stream and user calls never
//! race on the state. Publishes, subscriptions and history fetches run in
//! spawned tasks that report back into the worker; the worker itself never
//! waits on the network, which is what lets `stop` cancel anything.

use crate::codec::{self, Payload};
use crate::config::SessionConfig;
use crate::connection::{ConnectionState, StatusStream, StatusUpdate};
use crate::error::{PollError, PollResult};
use crate::protocol::{MessageKind, PollCompletion, PollMessage};
use crate::recovery::{self, Delivery, Watermarks};
use crate::router::{self, ApplyOrigin, MessageRouter, RouteOutcome};
use crate::state::SessionState;
use crate::transport::{
    Envelope, EventStream, PollTransport, PresenceEvent, TransportEvent, TransportStatus,
};
use pubpoll_types::{Poll, PollDraft, PollResponse, PollResponseStatistic, Sequence};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<PollResult<T>>;

/// Requests from engine handles to the worker.
enum Command {
    Start {
        reply: Reply<StatusStream>,
    },
    Announce {
        question: String,
        responses: Vec<String>,
        reply: Reply<Poll>,
    },
    Complete {
        reply: Reply<Poll>,
    },
    Submit {
        response: PollResponse,
        reply: Reply<()>,
    },
    RegisterPushToken {
        token: Vec<u8>,
    },
    Stop {
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
}

impl Command {
    /// Commands that must see the recovered session before they run.
    fn waits_for_recovery(&self) -> bool {
        matches!(
            self,
            Self::Announce { .. } | Self::Complete { .. } | Self::Submit { .. }
        )
    }

    /// Resolves the command with `Cancelled`.
    fn cancel(self) {
        match self {
            Self::Start { reply } => {
                let _ = reply.send(Err(PollError::Cancelled));
            }
            Self::Announce { reply, .. } | Self::Complete { reply } => {
                let _ = reply.send(Err(PollError::Cancelled));
            }
            Self::Submit { reply, .. } | Self::Stop { reply } | Self::Reset { reply } => {
                let _ = reply.send(Err(PollError::Cancelled));
            }
            Self::RegisterPushToken { .. } => {}
        }
    }
}

/// Results reported back to the worker by spawned tasks.
enum Internal {
    Connected {
        generation: u64,
        result: PollResult<EventStream>,
    },
    HistoryLoaded {
        load: u64,
        result: PollResult<Vec<Envelope>>,
    },
    Published {
        op: u64,
        result: PollResult<Sequence>,
    },
}

/// An operation waiting for its publish acknowledgement.
enum PendingReply {
    Announce(Reply<Poll>, Poll),
    Complete(Reply<Poll>, Poll),
    Submit(Reply<()>),
}

impl PendingReply {
    fn resolve(self, result: PollResult<Sequence>) {
        match self {
            Self::Announce(reply, poll) | Self::Complete(reply, poll) => {
                let _ = reply.send(result.map(|_| poll));
            }
            Self::Submit(reply) => {
                let _ = reply.send(result.map(|_| ()));
            }
        }
    }
}

/// Handle to a poll engine. Cloning yields another handle to the same
/// worker; the worker shuts down once every handle is dropped.
#[derive(Clone)]
pub struct PollEngine {
    config: Arc<SessionConfig>,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionState>,
}

impl PollEngine {
    /// Creates an engine and spawns its worker on the current runtime.
    pub fn new(config: SessionConfig, transport: Arc<dyn PollTransport>) -> Self {
        let config = Arc::new(config);
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_snapshots(
            Arc::clone(&transport),
            config.votes_channel(),
            snapshot_rx,
        ));

        let worker = Worker {
            router: MessageRouter::new(config.role),
            config: Arc::clone(&config),
            transport,
            state: SessionState::default(),
            state_tx,
            watermarks: Watermarks::new(),
            connection: ConnectionState::Disconnected,
            status_tx: None,
            events: None,
            running: false,
            generation: 0,
            loading: None,
            next_load: 0,
            buffered: Vec::new(),
            deferred: VecDeque::new(),
            pending: HashMap::new(),
            next_op: 0,
            internal_tx,
            snapshot_tx,
        };
        tokio::spawn(worker.run(command_rx, internal_rx));

        info!(
            "Poll engine created for host {} as {:?}",
            config.host_id, config.role
        );
        Self {
            config,
            command_tx,
            state_rx,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Operations ───────────────────────────────────────────────

    /// Connects to the network. Connectivity changes arrive on the returned
    /// stream; calling `start` again replaces the stream.
    pub async fn start(&self) -> PollResult<StatusStream> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Announces a new poll. Response variants get orders `0..n`.
    pub async fn announce_poll<I, S>(&self, question: impl Into<String>, responses: I) -> PollResult<Poll>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let question = question.into();
        let responses = responses.into_iter().map(Into::into).collect();
        self.request(|reply| Command::Announce {
            question,
            responses,
            reply,
        })
        .await
    }

    /// Closes the current poll and returns its inactive copy.
    pub async fn announce_poll_completion(&self) -> PollResult<Poll> {
        self.request(|reply| Command::Complete { reply }).await
    }

    /// Votes for one response of the current poll.
    pub async fn submit_response(&self, response: PollResponse) -> PollResult<()> {
        self.request(|reply| Command::Submit { response, reply }).await
    }

    /// Registers a device push token for both session channels.
    pub async fn register_device_push_token(&self, token: impl Into<Vec<u8>>) -> PollResult<()> {
        self.command_tx
            .send(Command::RegisterPushToken {
                token: token.into(),
            })
            .await
            .map_err(|_| PollError::Cancelled)
    }

    /// Cancels pending operations and disconnects. The engine can be
    /// started again afterwards.
    pub async fn stop(&self) -> PollResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Cancels pending operations and forgets the current poll.
    pub async fn reset(&self) -> PollResult<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> PollResult<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| PollError::Cancelled)?;
        rx.await.map_err(|_| PollError::Cancelled)?
    }

    // ── State access ─────────────────────────────────────────────

    /// Snapshot of the current session state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Stream of state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn active_poll(&self) -> Option<Poll> {
        self.state_rx.borrow().active_poll().cloned()
    }

    pub fn statistics(&self) -> Vec<PollResponseStatistic> {
        self.state_rx.borrow().statistics().to_vec()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    pub fn is_initially_connected(&self) -> bool {
        self.state_rx.borrow().is_initially_connected()
    }

    pub fn restored_session(&self) -> bool {
        self.state_rx.borrow().restored_session()
    }

    pub fn attendees_count(&self) -> u64 {
        self.state_rx.borrow().attendees_count()
    }

    pub fn attendees_count_string(&self) -> String {
        self.state_rx.borrow().attendees_count_string()
    }

    pub fn poll_question(&self) -> Option<String> {
        self.state_rx.borrow().poll_question().map(str::to_string)
    }

    pub fn poll_response_variants(&self) -> Vec<String> {
        self.state_rx
            .borrow()
            .poll_response_variants()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// The single owner of a session's state.
struct Worker {
    config: Arc<SessionConfig>,
    transport: Arc<dyn PollTransport>,
    router: MessageRouter,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    watermarks: Watermarks,
    connection: ConnectionState,
    status_tx: Option<mpsc::UnboundedSender<StatusUpdate>>,
    events: Option<EventStream>,
    /// Set between `start` and `stop`.
    running: bool,
    /// Bumped on every start and stop; stale connect results are dropped.
    generation: u64,
    /// History load in flight, if any.
    loading: Option<u64>,
    next_load: u64,
    /// Live messages that arrived while history was loading.
    buffered: Vec<Envelope>,
    /// Commands that arrived while history was loading.
    deferred: VecDeque<Command>,
    pending: HashMap<u64, PendingReply>,
    next_op: u64,
    internal_tx: mpsc::UnboundedSender<Internal>,
    snapshot_tx: mpsc::UnboundedSender<Payload>,
}

impl Worker {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(internal) = internal_rx.recv() => self.handle_internal(internal),
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_event(event),
                    None => self.handle_stream_closed(),
                },
            }
        }

        self.cancel_all();
        if self.running {
            if let Err(e) = self.transport.disconnect().await {
                warn!("Failed to disconnect on shutdown: {}", e);
            }
        }
        debug!("Poll engine worker stopped");
    }

    // ── Commands ─────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        if self.loading.is_some() && command.waits_for_recovery() {
            debug!("Deferring command until session recovery completes");
            self.deferred.push_back(command);
            return;
        }

        match command {
            Command::Start { reply } => self.handle_start(reply),
            Command::Announce {
                question,
                responses,
                reply,
            } => match self.prepare_announcement(question, responses) {
                Ok((poll, payload)) => {
                    let channel = self.config.polls_channel();
                    self.spawn_publish(channel, payload, PendingReply::Announce(reply, poll));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Complete { reply } => match self.prepare_completion() {
                Ok((poll, payload)) => {
                    let channel = self.config.polls_channel();
                    self.spawn_publish(channel, payload, PendingReply::Complete(reply, poll));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Submit { response, reply } => match self.prepare_vote(&response) {
                Ok(payload) => {
                    let channel = self.config.votes_channel();
                    self.spawn_publish(channel, payload, PendingReply::Submit(reply));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::RegisterPushToken { token } => self.register_push_token(token),
            Command::Stop { reply } => self.handle_stop(reply),
            Command::Reset { reply } => {
                self.cancel_all();
                self.state.clear_session();
                self.publish_state();
                info!("Poll session reset");
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn handle_start(&mut self, reply: Reply<StatusStream>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        if self.running {
            if self.connection.is_connected() {
                let _ = status_tx.send(StatusUpdate::connected());
            }
            self.status_tx = Some(status_tx);
            let _ = reply.send(Ok(status_rx));
            return;
        }

        self.status_tx = Some(status_tx);
        self.running = true;
        self.generation += 1;
        self.connection = self.connection.on_start();
        info!("Connecting to host {}", self.config.host_id);

        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.connect().await;
            let _ = internal_tx.send(Internal::Connected { generation, result });
        });

        let _ = reply.send(Ok(status_rx));
    }

    fn handle_stop(&mut self, reply: Reply<()>) {
        self.cancel_all();
        self.generation += 1;
        self.loading = None;
        self.buffered.clear();
        self.events = None;

        let was_running = std::mem::replace(&mut self.running, false);
        if self.connection.is_connected() {
            self.emit_status(StatusUpdate::disconnected(None));
        }
        self.connection = ConnectionState::Disconnected;
        self.status_tx = None;
        self.state.set_connected(false);
        self.publish_state();

        if !was_running {
            let _ = reply.send(Ok(()));
            return;
        }

        info!("Stopping poll engine");
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let _ = reply.send(transport.disconnect().await);
        });
    }

    fn ensure_connected(&self) -> PollResult<()> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            Err(PollError::NotConnected)
        }
    }

    fn prepare_announcement(
        &mut self,
        question: String,
        responses: Vec<String>,
    ) -> PollResult<(Poll, Payload)> {
        self.ensure_connected()?;
        let poll = PollDraft::with_data(question, responses).into_poll()?;
        let payload = codec::encode(&PollMessage::Announcement(poll.clone()))?;

        self.state.install_poll(poll.clone());
        self.state.set_restored_session(false);
        self.publish_state();

        info!(
            "Announcing poll {} with {} responses",
            poll.identifier(),
            poll.responses().len()
        );
        Ok((poll, payload))
    }

    fn prepare_completion(&mut self) -> PollResult<(Poll, Payload)> {
        self.ensure_connected()?;
        let poll = self.state.active_poll().ok_or(PollError::NoActivePoll)?;
        if !poll.is_active() {
            return Err(PollError::PollInactive);
        }
        let payload = codec::encode(&PollMessage::Completion(PollCompletion::for_poll(poll)))?;

        let completed = self
            .state
            .complete_poll()
            .cloned()
            .ok_or(PollError::NoActivePoll)?;
        self.publish_state();

        info!("Completing poll {}", completed.identifier());
        Ok((completed, payload))
    }

    fn prepare_vote(&self, response: &PollResponse) -> PollResult<Payload> {
        self.ensure_connected()?;
        router::check_vote(&self.state, response)?;
        debug!(
            "Submitting vote for order {} of poll {}",
            response.order(),
            response.poll_identifier()
        );
        codec::encode(&PollMessage::Vote(response.clone()))
    }

    fn register_push_token(&self, token: Vec<u8>) {
        let channels = self.config.channels();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            match transport.register_push_token(&token, &channels).await {
                Ok(()) => debug!("Registered push token for {} channels", channels.len()),
                Err(e) => warn!("Failed to register push token: {}", e),
            }
        });
    }

    // ── Publishing ───────────────────────────────────────────────

    fn spawn_publish(&mut self, channel: String, payload: Payload, pending: PendingReply) {
        self.next_op += 1;
        let op = self.next_op;
        self.pending.insert(op, pending);

        let transport = Arc::clone(&self.transport);
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.publish(&channel, payload).await;
            let _ = internal_tx.send(Internal::Published { op, result });
        });
    }

    /// Broadcasts the current tally. Nobody waits on the acknowledgement.
    fn broadcast_statistics(&self) {
        let Some(snapshot) = self.state.statistic_snapshot() else {
            return;
        };
        let payload = match codec::encode(&PollMessage::Statistics(snapshot)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode statistics: {}", e);
                return;
            }
        };

        if self.snapshot_tx.send(payload).is_err() {
            warn!("Statistics publisher is gone");
        }
    }

    // ── Internal results ─────────────────────────────────────────

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Connected { generation, result } => {
                if generation != self.generation {
                    debug!("Dropping stale connection result");
                    if result.is_ok() && !self.running {
                        let transport = Arc::clone(&self.transport);
                        tokio::spawn(async move {
                            if let Err(e) = transport.disconnect().await {
                                warn!("Failed to drop stale connection: {}", e);
                            }
                        });
                    }
                    return;
                }
                match result {
                    Ok(events) => self.events = Some(events),
                    Err(e) => {
                        warn!("Failed to connect: {}", e);
                        self.running = false;
                        self.connection = ConnectionState::Disconnected;
                        self.emit_status(StatusUpdate::disconnected(Some(e.to_string())));
                    }
                }
            }
            Internal::HistoryLoaded { load, result } => {
                if self.loading != Some(load) {
                    debug!("Dropping stale history load {}", load);
                    return;
                }
                self.finish_recovery(result);
            }
            Internal::Published { op, result } => {
                let Some(pending) = self.pending.remove(&op) else {
                    return;
                };
                if let Err(e) = &result {
                    warn!("Publish failed: {}", e);
                }
                pending.resolve(result);
            }
        }
    }

    // ── Transport events ─────────────────────────────────────────

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Status(status) => self.handle_status(status),
            TransportEvent::Message(envelope) => {
                if self.loading.is_some() {
                    self.buffered.push(envelope);
                } else {
                    self.deliver_live(&envelope);
                    self.publish_state();
                }
            }
            TransportEvent::Presence { channel, event } => {
                if channel != self.config.polls_channel() {
                    return;
                }
                match event {
                    PresenceEvent::Join { occupant } => {
                        debug!("{} joined {}", occupant, channel);
                        self.state.attendee_joined();
                    }
                    PresenceEvent::Leave { occupant } => {
                        debug!("{} left {}", occupant, channel);
                        self.state.attendee_left();
                    }
                    PresenceEvent::Occupancy(count) => self.state.set_attendees_count(count),
                }
                self.publish_state();
            }
        }
    }

    fn handle_status(&mut self, status: TransportStatus) {
        let previous = self.connection;
        let next = previous.on_status(&status);
        self.connection = next;
        self.state.set_connected(next.is_connected());

        if previous != next {
            info!("Connection {} -> {}", previous, next);
        }
        if let Some(update) = previous.update_for(next, &status) {
            self.emit_status(update);
        }
        if !previous.is_connected() && next.is_connected() {
            self.begin_recovery();
        }
        self.publish_state();
    }

    fn handle_stream_closed(&mut self) {
        info!("Transport event stream closed");
        self.events = None;
        self.running = false;
        self.loading = None;
        let previous = std::mem::take(&mut self.connection);
        if previous.is_connected() {
            self.emit_status(StatusUpdate::disconnected(None));
        }
        self.state.set_connected(false);
        self.publish_state();

        // Deferred commands now fail with NotConnected.
        for command in std::mem::take(&mut self.deferred) {
            self.handle_command(command);
        }
    }

    // ── Recovery ─────────────────────────────────────────────────

    /// Subscribes to the session channels and, when enabled, loads their
    /// history. Live messages and vote-affecting commands wait until it ends.
    fn begin_recovery(&mut self) {
        self.next_load += 1;
        let load = self.next_load;
        self.loading = Some(load);

        let channels = self.config.channels();
        let depth = if self.config.replay_history {
            self.config.history_depth
        } else {
            0
        };
        let transport = Arc::clone(&self.transport);
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = load_session(transport.as_ref(), &channels, depth).await;
            let _ = internal_tx.send(Internal::HistoryLoaded { load, result });
        });
    }

    fn finish_recovery(&mut self, result: PollResult<Vec<Envelope>>) {
        self.loading = None;

        match result {
            Ok(history) if !history.is_empty() => {
                let report =
                    recovery::replay(&self.router, &mut self.state, &mut self.watermarks, &history);
                if self.config.is_host() && report.votes_applied > 0 {
                    self.broadcast_statistics();
                }
            }
            Ok(_) => debug!("No history to replay"),
            Err(e) => warn!("Session recovery failed: {}", e),
        }

        for envelope in std::mem::take(&mut self.buffered) {
            self.deliver_live(&envelope);
        }
        self.publish_state();

        while self.loading.is_none() {
            let Some(command) = self.deferred.pop_front() else {
                break;
            };
            self.handle_command(command);
        }
    }

    fn deliver_live(&mut self, envelope: &Envelope) {
        let delivery = recovery::deliver(
            &self.router,
            &mut self.state,
            &mut self.watermarks,
            envelope,
            ApplyOrigin::Live,
        );
        if let Delivery::Routed {
            kind: MessageKind::Vote,
            outcome,
        } = delivery
        {
            match outcome {
                RouteOutcome::Applied => self.broadcast_statistics(),
                RouteOutcome::Rejected(reason) => {
                    warn!("Rejected vote on {}: {}", envelope.channel, reason);
                }
                RouteOutcome::Ignored => {}
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.resolve(Err(PollError::Cancelled));
        }
        for command in self.deferred.drain(..) {
            command.cancel();
        }
    }

    fn emit_status(&mut self, update: StatusUpdate) {
        if let Some(tx) = &self.status_tx {
            if tx.send(update).is_err() {
                self.status_tx = None;
            }
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }
}

/// Next event from the transport, or never when there is no stream.
async fn next_event(events: &mut Option<EventStream>) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Publishes statistics snapshots one at a time, in order. Only the newest
/// queued snapshot is sent; older ones are superseded.
async fn publish_snapshots(
    transport: Arc<dyn PollTransport>,
    channel: String,
    mut snapshots: mpsc::UnboundedReceiver<Payload>,
) {
    while let Some(mut payload) = snapshots.recv().await {
        while let Ok(newer) = snapshots.try_recv() {
            payload = newer;
        }
        if let Err(e) = transport.publish(&channel, payload).await {
            warn!("Failed to broadcast statistics: {}", e);
        }
    }
}

/// Subscribes to `channels` and fetches up to `depth` messages of each,
/// merged oldest first.
async fn load_session(
    transport: &dyn PollTransport,
    channels: &[String],
    depth: usize,
) -> PollResult<Vec<Envelope>> {
    transport.subscribe(channels).await?;
    if depth == 0 {
        return Ok(Vec::new());
    }

    let mut histories = Vec::with_capacity(channels.len());
    for channel in channels {
        histories.push(transport.fetch_history(channel, depth).await?);
    }
    Ok(recovery::merge_histories(histories))
}
