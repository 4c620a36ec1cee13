//! Codec between poll messages and flat JSON key-value payloads.
//!
//! The wire format has no discriminator field, so decoding without a kind
//! hint classifies a payload by its shape, in this priority order:
//! 1. `question` with `responses[].response` and no `votesCount` → announcement
//! 2. `identifier` with `active: false` and no `responses` → completion
//! 3. `pollIdentifier`, `response` and `order` without `votesCount` → vote
//! 4. `responses[].votesCount` → statistics

use crate::error::{PollError, PollResult};
use crate::protocol::{MessageKind, PollCompletion, PollMessage};
use pubpoll_types::{Poll, PollResponse, PollStatistic};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Maximum encoded payload size (32 KiB), the usual real-time network limit.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024;

/// A flat key-value payload as carried by the transport.
pub type Payload = Map<String, Value>;

/// Encodes a message into its wire payload.
pub fn encode(message: &PollMessage) -> PollResult<Payload> {
    let value = match message {
        PollMessage::Announcement(poll) => serde_json::to_value(poll),
        PollMessage::Completion(completion) => serde_json::to_value(completion),
        PollMessage::Vote(vote) => serde_json::to_value(vote),
        PollMessage::Statistics(stats) => serde_json::to_value(stats),
    }
    .map_err(|e| malformed(format!("JSON encode error: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(malformed(format!("{} did not encode to an object", message.kind()))),
    }
}

/// Decodes a payload. With a `hint` the payload is decoded as that kind
/// directly; without one it is classified by shape first.
pub fn decode(payload: &Payload, hint: Option<MessageKind>) -> PollResult<PollMessage> {
    let kind = match hint {
        Some(kind) => kind,
        None => classify(payload)
            .ok_or_else(|| malformed("payload matches no known message shape"))?,
    };

    match kind {
        MessageKind::Announcement => {
            let poll: Poll = typed(payload, kind)?;
            if !poll.is_active() {
                return Err(malformed("announcement must be active"));
            }
            if poll.responses().is_empty() {
                return Err(malformed("announcement has no responses"));
            }
            poll.check_consistency().map_err(|e| malformed(e.to_string()))?;
            Ok(PollMessage::Announcement(poll))
        }
        MessageKind::Completion => {
            let completion: PollCompletion = typed(payload, kind)?;
            if completion.active {
                return Err(malformed("completion must be inactive"));
            }
            Ok(PollMessage::Completion(completion))
        }
        MessageKind::Vote => Ok(PollMessage::Vote(typed::<PollResponse>(payload, kind)?)),
        MessageKind::Statistics => {
            let stats: PollStatistic = typed(payload, kind)?;
            let mut seen = HashSet::new();
            if let Some(dup) = stats.responses().iter().find(|r| !seen.insert(r.order())) {
                return Err(malformed(format!("duplicate statistic order {}", dup.order())));
            }
            Ok(PollMessage::Statistics(stats))
        }
    }
}

/// Decodes a raw transport value, which must be an object.
pub fn decode_value(value: &Value, hint: Option<MessageKind>) -> PollResult<PollMessage> {
    match value {
        Value::Object(map) => decode(map, hint),
        Value::Null => Err(malformed("expected an object, got null")),
        Value::Bool(_) => Err(malformed("expected an object, got a boolean")),
        Value::Number(_) => Err(malformed("expected an object, got a number")),
        Value::String(_) => Err(malformed("expected an object, got a string")),
        Value::Array(_) => Err(malformed("expected an object, got an array")),
    }
}

/// Classifies a payload by its field shape.
pub fn classify(payload: &Payload) -> Option<MessageKind> {
    let responses = payload.get("responses").and_then(Value::as_array);
    let all_entries_have =
        |key: &str| responses.is_some_and(|items| items.iter().all(|item| item.get(key).is_some()));
    let any_entry_has =
        |key: &str| responses.is_some_and(|items| items.iter().any(|item| item.get(key).is_some()));

    if payload.contains_key("question")
        && responses.is_some()
        && all_entries_have("response")
        && !any_entry_has("votesCount")
    {
        return Some(MessageKind::Announcement);
    }

    if payload.contains_key("identifier")
        && payload.get("active") == Some(&Value::Bool(false))
        && !payload.contains_key("responses")
    {
        return Some(MessageKind::Completion);
    }

    if payload.contains_key("pollIdentifier")
        && payload.contains_key("response")
        && payload.contains_key("order")
        && !payload.contains_key("votesCount")
    {
        return Some(MessageKind::Vote);
    }

    if responses.is_some_and(|items| !items.is_empty()) && all_entries_have("votesCount") {
        return Some(MessageKind::Statistics);
    }

    None
}

/// Serializes a message to JSON bytes, enforcing [`MAX_PAYLOAD_SIZE`].
pub fn to_vec(message: &PollMessage) -> PollResult<Vec<u8>> {
    let payload = encode(message)?;
    let data =
        serde_json::to_vec(&payload).map_err(|e| malformed(format!("JSON encode error: {e}")))?;
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(malformed(format!("message too large: {} bytes", data.len())));
    }
    Ok(data)
}

/// Parses JSON bytes into a message, enforcing [`MAX_PAYLOAD_SIZE`].
pub fn from_slice(data: &[u8], hint: Option<MessageKind>) -> PollResult<PollMessage> {
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(malformed(format!("message too large: {} bytes", data.len())));
    }
    let value: Value =
        serde_json::from_slice(data).map_err(|e| malformed(format!("JSON decode error: {e}")))?;
    decode_value(&value, hint)
}

fn typed<T: DeserializeOwned>(payload: &Payload, kind: MessageKind) -> PollResult<T> {
    serde_json::from_value(Value::Object(payload.clone()))
        .map_err(|e| malformed(format!("invalid {kind}: {e}")))
}

fn malformed(reason: impl Into<String>) -> PollError {
    PollError::MalformedMessage(reason.into())
}
