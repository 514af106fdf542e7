//! The bound cache and bridge of a scope.
//!
//! A scope is a request on the server or an application instance on the client. Each scope
//! creates exactly one [`BoundPair`] and hands clones of it to every reader in the scope, readers
//! never construct their own cache or bridge.

use std::sync::Arc;

use liveline_core::config::Endpoint;

use crate::bridge::{BridgeOptions, SubscriptionBridge};
use crate::cache::QueryCache;
use crate::links::{Connector, Link};
use crate::registry::ConnectionRegistry;
use crate::BridgeResult;

/// A cache and the bridge bound to it.
///
/// Clones refer to the same cache and bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPair {
    cache: QueryCache,
    bridge: SubscriptionBridge,
}

impl BoundPair {
    /// Creates a new cache and a new bridge reaching the backend through `link`, and binds them.
    pub fn connect(link: Arc<dyn Link>, options: BridgeOptions) -> Self {
        let cache = QueryCache::new();
        let bridge = SubscriptionBridge::new(link, options);

        tracing::debug!(cache = cache.id(), bridge = bridge.id(), "creating bound pair");

        Self::bind_fresh(cache, bridge)
    }

    /// Connects to `endpoint` with `connector` and creates a bound pair with the opened link.
    pub async fn connect_with<C>(
        connector: &C,
        endpoint: &Endpoint,
        options: BridgeOptions,
    ) -> BridgeResult<Self>
    where
        C: Connector + ?Sized,
    {
        let link = connector.connect(endpoint).await?;

        Ok(Self::connect(link, options))
    }

    /// Binds an existing cache and bridge.
    ///
    /// Fails with [`BridgeError::AlreadyBound`](crate::BridgeError::AlreadyBound) if either
    /// of them is bound to a different counterpart.
    pub fn from_parts(cache: QueryCache, bridge: SubscriptionBridge) -> BridgeResult<Self> {
        ConnectionRegistry::bind(&bridge, &cache)?;

        Ok(Self { cache, bridge })
    }

    fn bind_fresh(cache: QueryCache, bridge: SubscriptionBridge) -> Self {
        match ConnectionRegistry::bind(&bridge, &cache) {
            Ok(()) => Self { cache, bridge },
            // both halves were created by the caller and cannot have been bound before.
            Err(e) => unreachable!("failed to bind a new pair: {e}"),
        }
    }

    /// Returns the cache.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Returns the bridge.
    pub fn bridge(&self) -> &SubscriptionBridge {
        &self.bridge
    }
}
