//! The pull-compatible accessor of a bridge.

use std::sync::Arc;

use futures::FutureExt;

use crate::bridge::{DeliveryKind, FetchMode, SubscriptionBridge};
use crate::cache::{FetchStrategy, Fetched, Interest, Outcome};
use crate::key::{CacheKey, Descriptor, KeyCodec};
use crate::{BridgeError, BridgeResult};

/// Resolves descriptors for a pull-based cache with the live subscriptions of a bridge.
///
/// The first resolve of a key opens a subscription and waits for its first value. Later
/// resolves of the same key, while the subscription is live, resolve with the latest value it
/// delivered without opening another one.
#[derive(Debug, Clone)]
pub struct FetchAdapter {
    bridge: SubscriptionBridge,
}

impl FetchAdapter {
    /// Creates an adapter for a bridge.
    pub fn new(bridge: SubscriptionBridge) -> Self {
        Self { bridge }
    }

    /// Resolves a descriptor.
    ///
    /// A rejection by the backend resolves with [`Outcome::Rejected`], so it can be recorded on
    /// the cache entry.
    pub async fn resolve(&self, descriptor: &Descriptor) -> BridgeResult<Fetched> {
        let key = KeyCodec::canonicalize(descriptor)?;

        self.resolve_key(descriptor, &key).await
    }

    /// Resolves a descriptor whose key is already known.
    pub async fn resolve_key(
        &self,
        descriptor: &Descriptor,
        key: &CacheKey,
    ) -> BridgeResult<Fetched> {
        match self.bridge.options().fetch_mode {
            FetchMode::Subscribe => self.subscribe(descriptor, key).await,
            FetchMode::Call => self.call(descriptor).await,
        }
    }

    async fn subscribe(&self, descriptor: &Descriptor, key: &CacheKey) -> BridgeResult<Fetched> {
        let (lease, mut latest) = self.bridge.acquire(descriptor, key);

        loop {
            let delivery = latest.borrow_and_update().clone();
            let outcome = match delivery.kind {
                DeliveryKind::Value(m) => Outcome::Value(m),
                DeliveryKind::Rejected(m) => Outcome::Rejected(m),
                DeliveryKind::Exhausted(m) => return Err(BridgeError::ChannelDisconnect(m)),
                DeliveryKind::Connecting | DeliveryKind::Disconnected => {
                    latest.changed().await.map_err(|_| {
                        BridgeError::ChannelDisconnect(format!(
                            "subscription of `{}` was closed",
                            descriptor.operation()
                        ))
                    })?;

                    continue;
                }
            };

            return Ok(Fetched::new(delivery.seq, outcome).with_interest(Interest::new(lease)));
        }
    }

    async fn call(&self, descriptor: &Descriptor) -> BridgeResult<Fetched> {
        // taken before the call so any write issued meanwhile is newer.
        let seq = self.bridge.next_seq();

        match self.bridge.call(descriptor).await {
            Ok(m) => Ok(Fetched::new(seq, Outcome::Value(m.into()))),
            Err(BridgeError::RemoteOperation(m)) => Ok(Fetched::new(seq, Outcome::Rejected(m))),
            Err(e) => Err(e),
        }
    }

    /// Converts the adapter into a fetch strategy of a [`QueryCache`](crate::QueryCache).
    pub fn into_strategy(self) -> FetchStrategy {
        Arc::new(move |descriptor: Descriptor, key: CacheKey| {
            let adapter = self.clone();

            async move { adapter.resolve_key(&descriptor, &key).await }.boxed()
        })
    }
}
