//! Publish sequence values assigned by the transport.
//!
//! Every message stored on a channel carries a sequence that is strictly
//! increasing in publish order. Sequences are compared to discard
//! redelivered messages and to merge the histories of several channels
//! back into publish order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A transport publish sequence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// The lowest possible sequence; nothing is published at it.
    pub const ZERO: Self = Self(0);

    /// Creates a sequence from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Derives a sequence from the wall clock in 100ns ticks, the
    /// resolution real-time networks commonly use for publish timetokens.
    #[must_use]
    pub fn now() -> Self {
        let ticks = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_nanos() / 100) as u64)
            .unwrap_or_default();
        Self(ticks)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the following sequence.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
