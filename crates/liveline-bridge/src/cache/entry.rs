use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;

use crate::error::RemotePayload;
use crate::key::{CacheKey, Descriptor};

/// The state of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    /// No value has been delivered yet.
    Pending,
    /// The entry holds a current value.
    Ready(Arc<Value>),
    /// The entry is not backed by a live subscription or its channel is reconnecting.
    ///
    /// The last known value, if any, is kept. The next read fetches again.
    Stale(Option<Arc<Value>>),
    /// The backend rejected the operation.
    Failed(RemotePayload),
}

impl EntryState {
    /// Returns the value readers may display, if any.
    ///
    /// A failed entry never exposes a previous value.
    pub fn value(&self) -> Option<&Arc<Value>> {
        match self {
            Self::Ready(m) | Self::Stale(Some(m)) => Some(m),
            Self::Pending | Self::Stale(None) | Self::Failed(_) => None,
        }
    }

    /// Returns `true` if the entry holds a current value.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Returns `true` if the entry is stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    /// Returns `true` if the entry has settled on a value or an error.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Failed(_))
    }
}

/// A view of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) key: CacheKey,
    pub(crate) descriptor: Descriptor,
    pub(crate) state: EntryState,
    pub(crate) seq: u64,
    pub(crate) last_updated: SystemTime,
}

impl CacheEntry {
    pub(crate) fn pending(key: CacheKey, descriptor: Descriptor) -> Self {
        Self {
            key,
            descriptor,
            state: EntryState::Pending,
            seq: 0,
            last_updated: SystemTime::now(),
        }
    }

    /// Returns the key of the entry.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the descriptor the entry was created for.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Returns the state of the entry.
    pub fn state(&self) -> &EntryState {
        &self.state
    }

    /// Returns the sequence number of the last applied write.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns when the entry was last written.
    pub fn last_updated(&self) -> SystemTime {
        self.last_updated
    }

    /// Applies a write if it is not older than the current state.
    ///
    /// A write carrying the sequence number of the current state is only applied over a stale
    /// entry, so an already applied delivery can refresh an invalidated entry but can never
    /// replace a newer one.
    pub(crate) fn apply(&mut self, seq: u64, update: EntryUpdate) -> bool {
        let newer = seq > self.seq || (seq == self.seq && self.state.is_stale());
        if !newer {
            return false;
        }

        self.state = match update {
            EntryUpdate::Value(m) => EntryState::Ready(m),
            EntryUpdate::Error(m) => EntryState::Failed(m),
            EntryUpdate::Stale => EntryState::Stale(self.state.value().cloned()),
        };
        self.seq = seq;
        self.last_updated = SystemTime::now();

        true
    }
}

/// A write delivered to a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryUpdate {
    /// Replaces the value of the entry.
    Value(Arc<Value>),
    /// Marks the entry as failed.
    Error(RemotePayload),
    /// Marks the entry as stale, keeping the last value.
    Stale,
}
