//! Identities of event sources, aggregates and positions in the event log.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the stream/entity an event is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventSourceId(String);

impl EventSourceId {
    /// Creates an event source id from any string-like value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventSourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventSourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for EventSourceId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// Partition of the event log an event was written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    /// Creates a partition id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PartitionId {
    /// The unpartitioned stream, identified by the nil UUID.
    fn default() -> Self {
        Self(Uuid::nil().to_string())
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of an aggregate root type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateRootId(pub Uuid);

impl fmt::Display for AggregateRootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for AggregateRootId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Number of events applied to an aggregate root instance.
///
/// An aggregate that has applied no events is at version 0; each applied
/// event increases the version by exactly one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AggregateRootVersion(pub u64);

impl AggregateRootVersion {
    /// Version of an aggregate root that has not applied any events.
    pub const INITIAL: Self = Self(0);

    /// Returns the version after one more event is applied.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version after one more event is applied, or `None` when
    /// the version space is exhausted.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AggregateRootVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Global position of an event in the event log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventLogSequenceNumber(pub u64);

impl EventLogSequenceNumber {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventLogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
