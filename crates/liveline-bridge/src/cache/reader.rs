use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{CacheEntry, EntryState};
use crate::key::CacheKey;
use crate::{BridgeError, BridgeResult};

/// A live reader of a cache entry, returned by [`QueryCache::subscribe`](super::QueryCache).
///
/// The handle keeps the underlying subscription alive until it is dropped.
pub struct QueryHandle {
    key: CacheKey,
    rx: watch::Receiver<CacheEntry>,
    keeper: JoinHandle<()>,
}

impl QueryHandle {
    pub(crate) fn new(
        key: CacheKey,
        rx: watch::Receiver<CacheEntry>,
        keeper: JoinHandle<()>,
    ) -> Self {
        Self { key, rx, keeper }
    }

    /// Returns the key of the entry.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the current entry.
    pub fn current(&self) -> CacheEntry {
        self.rx.borrow().clone()
    }

    /// Waits until the entry changes and returns it.
    pub async fn changed(&mut self) -> BridgeResult<CacheEntry> {
        self.rx.changed().await.map_err(|_| cache_dropped())?;

        Ok(self.rx.borrow_and_update().clone())
    }

    /// Waits until the entry settles on a value or an error.
    ///
    /// Returns immediately if the entry is already settled.
    pub async fn value(&mut self) -> BridgeResult<Arc<Value>> {
        loop {
            {
                let entry = self.rx.borrow_and_update();
                match entry.state() {
                    EntryState::Ready(m) => return Ok(m.clone()),
                    EntryState::Failed(m) => return Err(BridgeError::RemoteOperation(m.clone())),
                    EntryState::Pending | EntryState::Stale(_) => {}
                }
            }

            self.rx.changed().await.map_err(|_| cache_dropped())?;
        }
    }
}

fn cache_dropped() -> BridgeError {
    BridgeError::ChannelDisconnect("the cache holding this entry was dropped".to_string())
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.keeper.abort();
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .field("state", self.rx.borrow().state())
            .finish()
    }
}
