//! Real-time poll synchronization engine for PubPoll.
//!
//! A host announces a multiple-choice poll to attendees over a
//! publish/subscribe network, collects votes and keeps a live tally that
//! every participant sees, despite out-of-order delivery, disconnects and
//! late joiners.
//!
//! # Architecture
//!
//! Each session uses two channels keyed by the host: one for poll
//! announcements and completions (presence is counted here) and one for
//! votes and statistics.
//!
//! ## Components
//!
//! - **Codec**: Converts messages to and from flat JSON payloads
//! - **Router**: Applies a decoded message to the session state
//! - **Aggregator**: Host-side vote counting and tally snapshots
//! - **Recovery**: Replays channel history with sequence watermarks
//! - **State**: The active poll, its tally and connection flags
//! - **Transport**: Abstracts over the publish/subscribe network
//! - **Engine**: Owns the state in one worker task and exposes the API
//!
//! ## Session Flow
//!
//! 1. **Connect**: Start the engine; the transport reports connectivity
//! 2. **Subscribe**: Join both session channels
//! 3. **Recover**: Replay channel history to rebuild the current poll
//! 4. **Announce**: The host publishes a poll
//! 5. **Vote**: Attendees publish votes; the host broadcasts the tally
//! 6. **Complete**: The host closes the poll and votes stop counting
//!
//! # Example
//!
//! ```
//! use pubpoll_sync::{MemoryNetwork, PollEngine, SessionConfig};
//! use pubpoll_types::HostId;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let network = MemoryNetwork::new();
//! let config = SessionConfig::host(HostId::new());
//! let engine = PollEngine::new(config, Arc::new(network.transport("host")));
//! let _status = engine.start().await;
//! # }
//! ```

pub mod aggregator;
pub mod codec;
mod config;
mod connection;
mod engine;
mod error;
pub mod memory;
pub mod protocol;
pub mod recovery;
pub mod router;
pub mod state;
pub mod transport;

pub use config::{Role, SessionConfig, DEFAULT_HISTORY_DEPTH};
pub use connection::{ConnectionState, StatusStream, StatusUpdate};
pub use engine::PollEngine;
pub use error::{PollError, PollResult};
pub use memory::{MemoryNetwork, MemoryTransport, PushRegistration};
pub use protocol::{MessageKind, PollCompletion, PollMessage};
pub use recovery::{Delivery, ReplayReport, Watermarks};
pub use router::{ApplyOrigin, MessageRouter, RejectReason, RouteOutcome};
pub use state::SessionState;
pub use transport::{
    Envelope, EventStream, PollTransport, PresenceEvent, TransportEvent, TransportStatus,
};
