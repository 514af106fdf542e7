//! The pull-based query cache.
//!
//! The cache resolves values on demand through a fetch strategy and stores them by key. It does
//! not know where values come from: a [`SubscriptionBridge`](crate::SubscriptionBridge) installs
//! its strategies when it is bound with [`ConnectionRegistry::bind`](crate::ConnectionRegistry)
//! and writes pushed values with [`QueryCache::update_entry`].
//!
//! Every write carries a sequence number. A write older than the entry's current state is
//! dropped, so fetched results and pushed values can never overwrite a newer value.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;

mod entry;
mod fetch;
mod reader;

pub use entry::{CacheEntry, EntryState, EntryUpdate};
pub use fetch::{FetchStrategy, Fetched, Interest, KeyHashStrategy, Outcome};
pub use reader::QueryHandle;

use crate::key::{CacheKey, Descriptor, KeyCodec};
use crate::snapshot::{Snapshot, SnapshotEntry};
use crate::types::LiveQuery;
use crate::{BridgeError, BridgeResult};

/// An entry and the interest that keeps its source live.
struct EntrySlot {
    tx: watch::Sender<CacheEntry>,
    interest: Mutex<Option<Interest>>,
}

impl EntrySlot {
    fn new(entry: CacheEntry) -> Arc<Self> {
        let (tx, _) = watch::channel(entry);

        Arc::new(Self {
            tx,
            interest: Mutex::default(),
        })
    }

    fn interest(&self) -> MutexGuard<'_, Option<Interest>> {
        self.interest.lock().expect("cache entry poisoned")
    }

    /// Holds `interest` until the entry has no observers left.
    ///
    /// Without a runtime to wait on, the interest is released immediately.
    fn retain(self: &Arc<Self>, interest: Interest) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        // a watcher is already waiting for the observers of this entry.
        if self.interest().replace(interest).is_some() {
            return;
        }

        let slot = self.clone();
        runtime.spawn(async move {
            slot.tx.closed().await;
            let released = slot.interest().take();

            tracing::trace!(
                key = %slot.tx.borrow().key().hash(),
                released = released.is_some(),
                "entry is no longer observed"
            );
        });
    }
}

#[derive(Default)]
pub(crate) struct Hooks {
    key_hash: Option<KeyHashStrategy>,
    fetch: Option<FetchStrategy>,
    pub(crate) bridge: Option<usize>,
}

impl Hooks {
    pub(crate) fn install(
        &mut self,
        bridge: usize,
        key_hash: KeyHashStrategy,
        fetch: FetchStrategy,
    ) {
        self.key_hash = Some(key_hash);
        self.fetch = Some(fetch);
        self.bridge = Some(bridge);
    }
}

pub(crate) struct CacheInner {
    id: usize,
    entries: Mutex<HashMap<CacheKey, Arc<EntrySlot>>>,
    hooks: Mutex<Hooks>,
}

impl CacheInner {
    pub(crate) fn hooks(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().expect("cache hooks poisoned")
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<EntrySlot>>> {
        self.entries.lock().expect("cache entries poisoned")
    }
}

/// A pull-based query cache.
///
/// This type is a cheap handle, clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    pub(crate) inner: Arc<CacheInner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QueryCache {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
impl Eq for QueryCache {}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Creates an empty cache without strategies.
    pub fn new() -> Self {
        static ID: AtomicUsize = AtomicUsize::new(0);

        Self {
            inner: Arc::new(CacheInner {
                id: ID.fetch_add(1, Ordering::AcqRel),
                entries: Mutex::default(),
                hooks: Mutex::default(),
            }),
        }
    }

    /// Returns the id of the cache.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Returns `true` if a bridge is bound to this cache.
    pub fn is_bound(&self) -> bool {
        self.inner.hooks().bridge.is_some()
    }

    /// Sets the strategy used to derive cache keys.
    pub fn set_key_hash_strategy(&self, strategy: KeyHashStrategy) {
        self.inner.hooks().key_hash = Some(strategy);
    }

    /// Sets the strategy used to fetch values on a miss.
    pub fn set_fetch_strategy(&self, strategy: FetchStrategy) {
        self.inner.hooks().fetch = Some(strategy);
    }

    /// Returns the key of a descriptor with the installed key hash strategy.
    ///
    /// Falls back to [`KeyCodec`] if no strategy is installed.
    pub fn key_of(&self, descriptor: &Descriptor) -> BridgeResult<CacheKey> {
        let key_hash = self.inner.hooks().key_hash.clone();

        match key_hash {
            Some(m) => m(descriptor),
            None => KeyCodec::canonicalize(descriptor),
        }
    }

    fn prepare(&self, descriptor: &Descriptor) -> BridgeResult<(CacheKey, FetchStrategy)> {
        let (key_hash, fetch) = {
            let hooks = self.inner.hooks();
            (hooks.key_hash.clone(), hooks.fetch.clone())
        };

        let (key_hash, fetch) = match (key_hash, fetch) {
            (Some(key_hash), Some(fetch)) => (key_hash, fetch),
            _ => {
                return Err(BridgeError::UnboundCache {
                    cache: self.id(),
                    operation: descriptor.operation().to_owned(),
                })
            }
        };

        Ok((key_hash(descriptor)?, fetch))
    }

    fn observe_key(&self, key: &CacheKey, descriptor: &Descriptor) -> watch::Receiver<CacheEntry> {
        self.inner
            .entries()
            .entry(key.clone())
            .or_insert_with(|| {
                EntrySlot::new(CacheEntry::pending(key.clone(), descriptor.clone()))
            })
            .tx
            .subscribe()
    }

    fn slot(&self, key: &CacheKey) -> Option<Arc<EntrySlot>> {
        self.inner.entries().get(key).cloned()
    }

    /// Returns a receiver that observes every change of an entry.
    ///
    /// The entry is created in the pending state if it does not exist. Observing an entry does
    /// not fetch it, but while any receiver of an entry is alive the source of its last fetch
    /// stays live, so pushed values keep flowing into it. An entry whose source was torn down
    /// before it was observed is stale and is fetched again by the next read.
    pub fn observe(&self, descriptor: &Descriptor) -> BridgeResult<watch::Receiver<CacheEntry>> {
        let key = self.key_of(descriptor)?;

        Ok(self.observe_key(&key, descriptor))
    }

    /// Returns the cached value of a descriptor, fetching it on a miss.
    ///
    /// A ready entry resolves immediately. A pending, stale or failed entry is fetched with the
    /// installed fetch strategy; a failed entry is therefore retried by calling this method
    /// again.
    ///
    /// Dropping the returned future before it resolves releases the reader's interest.
    pub async fn read_or_fetch(&self, descriptor: &Descriptor) -> BridgeResult<Arc<Value>> {
        let (key, fetch) = self.prepare(descriptor)?;

        let ready = match self.observe_key(&key, descriptor).borrow().state() {
            EntryState::Ready(m) => Some(m.clone()),
            _ => None,
        };
        if let Some(m) = ready {
            tracing::trace!(key = %key.hash(), "cache hit");
            return Ok(m);
        }

        tracing::trace!(key = %key.hash(), operation = descriptor.operation(), "cache miss");
        let fetched = fetch(descriptor.clone(), key.clone()).await?;

        self.settle(&key, fetched)
    }

    /// Reads a typed query.
    pub async fn read<Q>(&self, args: &Q::Args) -> BridgeResult<Q::Output>
    where
        Q: LiveQuery,
    {
        let descriptor = Q::descriptor(args)?;
        let value = self.read_or_fetch(&descriptor).await?;

        Ok(Q::Output::deserialize(value.as_ref())?)
    }

    /// Subscribes to an entry.
    ///
    /// The returned handle observes the entry until it is dropped, so pushed values keep flowing
    /// into it. The entry is fetched in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn subscribe(&self, descriptor: &Descriptor) -> BridgeResult<QueryHandle> {
        let (key, fetch) = self.prepare(descriptor)?;
        let rx = self.observe_key(&key, descriptor);

        let cache = Arc::downgrade(&self.inner);
        let descriptor = descriptor.clone();
        let keeper_key = key.clone();
        let keeper = tokio::spawn(async move {
            let key = keeper_key;
            match fetch(descriptor, key.clone()).await {
                Ok(fetched) => {
                    if let Some(inner) = cache.upgrade() {
                        // failures are recorded on the entry.
                        let _ = QueryCache { inner }.settle(&key, fetched);
                    }
                }
                Err(e) => {
                    tracing::debug!(key = %key.hash(), reason = %e, "failed to subscribe entry");
                }
            }
        });

        Ok(QueryHandle::new(key, rx, keeper))
    }

    /// Applies a write to an existing entry.
    ///
    /// Returns `true` if the write was applied. Writes to missing entries and writes older than
    /// the entry's state are discarded.
    pub fn update_entry(&self, key: &CacheKey, seq: u64, update: EntryUpdate) -> bool {
        let Some(slot) = self.slot(key) else {
            tracing::trace!(key = %key.hash(), seq, "discarded write to missing entry");
            return false;
        };

        let applied = slot.tx.send_if_modified(|m| m.apply(seq, update));
        if !applied {
            tracing::trace!(key = %key.hash(), seq, "discarded out-of-date write");
        }

        applied
    }

    /// Removes an entry that nobody observes, or marks it as stale.
    ///
    /// Returns `true` if the entry was removed.
    pub(crate) fn retire_entry(&self, key: &CacheKey, seq: u64) -> bool {
        let evicted = {
            let mut entries = self.inner.entries();
            match entries.get(key) {
                None => return false,
                Some(m) if m.tx.receiver_count() == 0 => entries.remove(key),
                Some(_) => None,
            }
        };

        if evicted.is_some() {
            tracing::trace!(key = %key.hash(), "evicted unobserved entry");
            return true;
        }

        self.update_entry(key, seq, EntryUpdate::Stale);
        false
    }

    /// Marks an entry as stale so the next read fetches it again.
    ///
    /// Returns `true` if the entry exists.
    pub fn invalidate(&self, descriptor: &Descriptor) -> BridgeResult<bool> {
        let key = self.key_of(descriptor)?;
        let Some(slot) = self.slot(&key) else {
            return Ok(false);
        };

        slot.tx.send_if_modified(|m| {
            if m.state.is_stale() {
                return false;
            }
            m.state = EntryState::Stale(m.state.value().cloned());
            true
        });

        Ok(true)
    }

    /// Returns the entry of a descriptor, if any.
    pub fn peek(&self, descriptor: &Descriptor) -> BridgeResult<Option<CacheEntry>> {
        let key = self.key_of(descriptor)?;

        Ok(self.get(&key))
    }

    /// Returns the entry of a key, if any.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.slot(key).map(|m| m.tx.borrow().clone())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Serializes every ready entry into a snapshot.
    pub fn dehydrate(&self) -> Snapshot {
        let entries = self
            .inner
            .entries()
            .values()
            .filter_map(|slot| {
                let entry = slot.tx.borrow();
                match entry.state() {
                    EntryState::Ready(m) => Some(SnapshotEntry {
                        hash: entry.key().hash().to_owned(),
                        descriptor: entry.descriptor().clone(),
                        value: m.as_ref().clone(),
                    }),
                    _ => None,
                }
            })
            .collect();

        Snapshot::new(entries)
    }

    /// Seeds the cache from a snapshot.
    ///
    /// Entries that already hold data are left untouched. Returns the number of entries seeded.
    /// Fails without seeding anything if an entry's hash does not match its descriptor.
    pub fn hydrate(&self, snapshot: &Snapshot) -> BridgeResult<usize> {
        let mut seeds = Vec::with_capacity(snapshot.len());
        for entry in snapshot.entries() {
            let key = self.key_of(&entry.descriptor)?;
            if key.hash() != entry.hash {
                return Err(BridgeError::InvalidDescriptor(format!(
                    "snapshot entry for `{}` does not match its hash",
                    entry.descriptor.operation()
                )));
            }

            seeds.push((key, entry));
        }

        let mut entries = self.inner.entries();
        let mut seeded = 0;
        for (key, seed) in seeds {
            let value = Arc::new(seed.value.clone());
            match entries.get(&key) {
                Some(slot) => {
                    let applied = slot.tx.send_if_modified(|m| {
                        if m.seq != 0 || m.state.is_settled() {
                            return false;
                        }
                        m.state = EntryState::Ready(value);
                        true
                    });
                    seeded += usize::from(applied);
                }
                None => {
                    let mut entry = CacheEntry::pending(key.clone(), seed.descriptor.clone());
                    entry.state = EntryState::Ready(value);
                    entries.insert(key, EntrySlot::new(entry));
                    seeded += 1;
                }
            }
        }

        Ok(seeded)
    }

    fn settle(&self, key: &CacheKey, fetched: Fetched) -> BridgeResult<Arc<Value>> {
        let seq = fetched.seq();
        let outcome = fetched.outcome().clone();
        let interest = fetched.into_interest();

        let update = match outcome {
            Outcome::Value(ref m) => EntryUpdate::Value(m.clone()),
            Outcome::Rejected(ref m) => EntryUpdate::Error(m.clone()),
        };

        let current = self.slot(key).map(|slot| {
            slot.tx.send_if_modified(|m| m.apply(seq, update));
            if let Some(m) = interest {
                slot.retain(m);
            }

            let entry = slot.tx.borrow();
            entry.state().clone()
        });

        match (current, outcome) {
            // the entry may hold a newer write than this fetch.
            (Some(EntryState::Ready(m)), _) => Ok(m),
            (Some(EntryState::Failed(m)), _) => Err(BridgeError::RemoteOperation(m)),
            (_, Outcome::Value(m)) => Ok(m),
            (_, Outcome::Rejected(m)) => Err(BridgeError::RemoteOperation(m)),
        }
    }
}
