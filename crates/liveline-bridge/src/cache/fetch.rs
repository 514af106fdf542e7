use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::RemotePayload;
use crate::key::{CacheKey, Descriptor};
use crate::BridgeResult;

/// Derives the cache key of a descriptor.
pub type KeyHashStrategy = Arc<dyn Send + Sync + Fn(&Descriptor) -> BridgeResult<CacheKey>>;

/// Fetches the value of a descriptor on a cache miss.
pub type FetchStrategy =
    Arc<dyn Send + Sync + Fn(Descriptor, CacheKey) -> BoxFuture<'static, BridgeResult<Fetched>>>;

/// A reader's interest in the source of a fetched value.
///
/// The interest is released when this value is dropped.
pub struct Interest {
    _guard: Box<dyn Send + Sync>,
}

impl Interest {
    /// Wraps a guard that releases the interest on drop.
    pub fn new<G>(guard: G) -> Self
    where
        G: 'static + Send + Sync,
    {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interest")
    }
}

/// The outcome of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The backend delivered a value.
    Value(Arc<Value>),
    /// The backend rejected the operation.
    Rejected(RemotePayload),
}

/// The result of a fetch strategy.
#[derive(Debug)]
pub struct Fetched {
    pub(crate) seq: u64,
    pub(crate) outcome: Outcome,
    pub(crate) interest: Option<Interest>,
}

impl Fetched {
    /// Creates a fetch result.
    ///
    /// `seq` orders this result against every other write to the same entry; results with a
    /// sequence number older than the entry's are discarded.
    pub fn new(seq: u64, outcome: Outcome) -> Self {
        Self {
            seq,
            outcome,
            interest: None,
        }
    }

    /// Keeps an interest alive for as long as this result is held.
    pub fn with_interest(mut self, interest: Interest) -> Self {
        self.interest = Some(interest);
        self
    }

    /// Returns the sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the outcome.
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub(crate) fn into_interest(self) -> Option<Interest> {
        self.interest
    }
}
