//! The subscription bridge.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

mod handle;
mod options;

pub(crate) use handle::{Delivery, DeliveryKind, Lease};
use handle::HandleSlot;
pub use options::{BackoffOptions, BridgeOptions, FetchMode};

use crate::adapter::FetchAdapter;
use crate::cache::{CacheInner, EntryUpdate, QueryCache};
use crate::key::{CacheKey, Descriptor};
use crate::links::{Link, LinkError};
use crate::registry::ConnectionRegistry;
use crate::types::LiveMutation;
use crate::BridgeResult;

/// The cache a bridge delivers pushes to.
pub(crate) struct CacheSink {
    pub cache_id: usize,
    pub cache: Weak<CacheInner>,
}

/// The state shared between a bridge and its subscription pumps.
pub(crate) struct Shared {
    pub link: Arc<dyn Link>,
    seq: AtomicU64,
    sink: Mutex<Option<CacheSink>>,
}

impl Shared {
    pub fn sink(&self) -> MutexGuard<'_, Option<CacheSink>> {
        self.sink.lock().expect("bridge sink poisoned")
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn cache(&self) -> Option<QueryCache> {
        self.sink()
            .as_ref()
            .and_then(|m| m.cache.upgrade())
            .map(|inner| QueryCache { inner })
    }

    /// Writes an update to the bound cache with a new sequence number.
    ///
    /// Returns the sequence number of the write.
    pub fn write(&self, key: &CacheKey, update: EntryUpdate) -> u64 {
        let seq = self.next_seq();
        if let Some(m) = self.cache() {
            m.update_entry(key, seq, update);
        }

        seq
    }

    /// Retires the entry of a subscription that was torn down.
    fn retire(&self, key: &CacheKey) {
        let seq = self.next_seq();
        if let Some(m) = self.cache() {
            m.retire_entry(key, seq);
        }
    }
}

pub(crate) struct BridgeInner {
    id: usize,
    options: BridgeOptions,
    pub(crate) shared: Arc<Shared>,
    handles: Mutex<HashMap<CacheKey, HandleSlot>>,
}

impl BridgeInner {
    fn handles(&self) -> MutexGuard<'_, HashMap<CacheKey, HandleSlot>> {
        self.handles.lock().expect("bridge handles poisoned")
    }

    pub(crate) fn release(self: &Arc<Self>, key: &CacheKey, slot_id: usize) {
        let mut handles = self.handles();
        let Some(slot) = handles.get_mut(key) else {
            return;
        };
        if slot.id != slot_id {
            return;
        }

        slot.refcount = slot.refcount.saturating_sub(1);
        if slot.refcount > 0 {
            return;
        }

        let grace = self.options.grace_period;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) if !grace.is_zero() => {
                tracing::trace!(key = %key.hash(), ?grace, "scheduling subscription teardown");

                let bridge = Arc::downgrade(self);
                let key = key.clone();
                slot.teardown = Some(rt.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(m) = bridge.upgrade() {
                        m.teardown(&key, slot_id);
                    }
                }));
            }
            _ => {
                drop(handles);
                self.teardown(key, slot_id);
            }
        }
    }

    fn teardown(&self, key: &CacheKey, slot_id: usize) {
        let slot = {
            let mut handles = self.handles();
            match handles.get(key) {
                Some(m) if m.id == slot_id && m.refcount == 0 => handles.remove(key),
                _ => None,
            }
        };

        if let Some(mut slot) = slot {
            // this may run on the teardown task itself.
            drop(slot.teardown.take());
            drop(slot);

            self.shared.retire(key);
            tracing::debug!(key = %key.hash(), "subscription closed");
        }
    }
}

/// The bridge between a reactive backend and a [`QueryCache`].
///
/// The bridge maintains one live subscription per cache key, shared by every reader of that
/// key, and delivers pushed values to the cache it is bound to. This type is a cheap handle,
/// clones share the same subscriptions.
///
/// A bridge belongs to exactly one scope: a request on the server, or an application instance
/// on the client. Use [`BoundPair`](crate::BoundPair) to create a bound cache and bridge.
#[derive(Clone)]
pub struct SubscriptionBridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl fmt::Debug for SubscriptionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionBridge")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl PartialEq for SubscriptionBridge {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
impl Eq for SubscriptionBridge {}

impl SubscriptionBridge {
    /// Creates a bridge that reaches the backend through `link`.
    pub fn new(link: Arc<dyn Link>, options: BridgeOptions) -> Self {
        static ID: AtomicUsize = AtomicUsize::new(0);

        Self {
            inner: Arc::new(BridgeInner {
                id: ID.fetch_add(1, Ordering::AcqRel),
                options,
                shared: Arc::new(Shared {
                    link,
                    seq: AtomicU64::new(0),
                    sink: Mutex::default(),
                }),
                handles: Mutex::default(),
            }),
        }
    }

    /// Returns the id of the bridge.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Returns the options of the bridge.
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Returns the link used to reach the backend.
    pub fn link(&self) -> &Arc<dyn Link> {
        &self.inner.shared.link
    }

    /// Binds this bridge to a cache.
    ///
    /// This is equivalent to [`ConnectionRegistry::bind`].
    pub fn connect(&self, cache: &QueryCache) -> BridgeResult<()> {
        ConnectionRegistry::bind(self, cache)
    }

    /// Returns `true` if this bridge is bound to a cache.
    pub fn is_bound(&self) -> bool {
        self.inner.shared.sink().is_some()
    }

    /// Returns the fetch adapter of this bridge.
    pub fn adapter(&self) -> FetchAdapter {
        FetchAdapter::new(self.clone())
    }

    /// Returns the number of open subscriptions, including those waiting to be torn down.
    pub fn live_subscriptions(&self) -> usize {
        self.inner.handles().len()
    }

    /// Returns the number of readers holding the subscription of a key.
    pub fn refcount(&self, key: &CacheKey) -> usize {
        self.inner.handles().get(key).map(|m| m.refcount).unwrap_or(0)
    }

    /// Executes a one-shot call.
    ///
    /// Disconnects are retried with backoff up to [`BridgeOptions::call_retries`] times.
    pub async fn call(&self, descriptor: &Descriptor) -> BridgeResult<Value> {
        let options = self.options();
        let mut attempt = 0;

        loop {
            match self.link().call(descriptor).await {
                Ok(m) => return Ok(m),
                Err(LinkError::Disconnected(reason)) if attempt < options.call_retries => {
                    let delay = options.backoff.delay(attempt);
                    tracing::warn!(
                        operation = descriptor.operation(),
                        attempt,
                        ?delay,
                        %reason,
                        "call failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Executes a typed mutation.
    pub async fn mutate<M>(&self, args: &M::Args) -> BridgeResult<M::Output>
    where
        M: LiveMutation,
    {
        let descriptor = M::descriptor(args)?;
        let value = self.call(&descriptor).await?;

        Ok(M::Output::deserialize(value)?)
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.inner.shared.next_seq()
    }

    /// Registers a reader of a key, opening a subscription if none is live.
    ///
    /// A pending teardown of the subscription is cancelled.
    pub(crate) fn acquire(
        &self,
        descriptor: &Descriptor,
        key: &CacheKey,
    ) -> (Lease, watch::Receiver<Delivery>) {
        let inner = &self.inner;
        let backoff = &inner.options.backoff;

        let mut handles = inner.handles();
        let slot = handles.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(
                key = %key.hash(),
                operation = descriptor.operation(),
                "opening subscription"
            );
            HandleSlot::open(&inner.shared, key, descriptor, backoff)
        });

        slot.refcount += 1;
        if let Some(m) = slot.teardown.take() {
            tracing::debug!(key = %key.hash(), "reusing subscription within grace period");
            m.abort();
        }
        slot.restart_if_failed(&inner.shared, key, backoff);

        let lease = Lease::new(Arc::downgrade(inner), key.clone(), slot.id);

        (lease, slot.latest.clone())
    }
}
